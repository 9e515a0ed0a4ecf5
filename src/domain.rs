//! # Domain Types
//!
//! Core record types consumed by the analytics engine. Publications are
//! created by an external ingestion path and are read-only here; everything
//! derived from them is recomputed from scratch on every scheduler cycle.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A named region a publication originates from.
///
/// The valid region set is configuration, not code; unknown locations are
/// dropped at the store boundary instead of silently creating new groups.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Location(String);

impl Location {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The configured set of known locations.
#[derive(Debug, Clone, Default)]
pub struct LocationSet(BTreeSet<String>);

impl LocationSet {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(names.into_iter().map(Into::into).collect())
    }

    pub fn contains(&self, location: &Location) -> bool {
        self.0.contains(location.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// All known locations, ascending by name.
    pub fn iter(&self) -> impl Iterator<Item = Location> + '_ {
        self.0.iter().map(|n| Location(n.clone()))
    }
}

/// Short handle of a publication's author (e.g. a screen name).
///
/// Normalized on construction: trimmed, leading `@` stripped. Empty handles
/// do not exist; records without one simply carry `None`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    pub fn parse(raw: &str) -> Option<Self> {
        let s = raw.trim().trim_start_matches('@');
        if s.is_empty() {
            None
        } else {
            Some(Self(s.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single weighted, geo-tagged publication event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Publication {
    /// Source system identifier (e.g. "twitter").
    pub medium: String,
    /// Identifier unique within `medium`.
    pub source_publication_id: i64,
    pub location: Location,
    /// Author handle; absent records are excluded from ranking queries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<Identity>,
    /// Human-readable name paired with `identity`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub timestamp: DateTime<Utc>,
    /// Non-negative importance score.
    pub weight: f64,
}

impl Publication {
    /// Construct a publication, enforcing `weight >= 0`.
    pub fn new(
        medium: impl Into<String>,
        source_publication_id: i64,
        location: Location,
        timestamp: DateTime<Utc>,
        weight: f64,
    ) -> Result<Self, InvalidPublication> {
        if !weight.is_finite() || weight < 0.0 {
            return Err(InvalidPublication::Weight(weight));
        }
        Ok(Self {
            medium: medium.into(),
            source_publication_id,
            location,
            identity: None,
            display_name: None,
            timestamp,
            weight,
        })
    }

    pub fn with_identity(mut self, identity: Identity, display_name: impl Into<String>) -> Self {
        self.identity = Some(identity);
        self.display_name = Some(display_name.into());
        self
    }

    /// True if the publication carries a well-formed, non-negative weight.
    pub fn is_valid(&self) -> bool {
        self.weight.is_finite() && self.weight >= 0.0
    }
}

/// Why a publication was rejected at construction or at the store boundary.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InvalidPublication {
    #[error("weight must be finite and non-negative, got {0}")]
    Weight(f64),
    #[error("unknown location: {0}")]
    UnknownLocation(Location),
}

/// A daily snapshot of projected poll standings (seats per party).
///
/// Like publications, snapshots are owned by an external ingester and
/// read-only to the analytics engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollSnapshot {
    pub date: NaiveDate,
    /// Party name to projected seats.
    pub standings: BTreeMap<String, f64>,
}
