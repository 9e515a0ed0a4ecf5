//! Typed query shapes the analytics jobs issue against a publication store.
//!
//! Filters support an inclusive date range, equality on location,
//! set-membership on identity, an identity-existence check, and an exclusive
//! minute-of-day band (the time-of-day deviation mode).

use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Identity, Location, Publication};
use crate::window::TimeWindow;

/// An exclusive band on minute-of-day: `start < minute < end`.
///
/// Bands that cross midnight (`start > end`) wrap around; the source system
/// never produced such bands but nothing here rules them out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MinuteBand {
    /// Minutes since midnight, exclusive lower bound.
    pub start: u32,
    /// Minutes since midnight, exclusive upper bound.
    pub end: u32,
}

impl MinuteBand {
    pub fn new(start: u32, end: u32) -> Self {
        Self {
            start: start % MINUTES_PER_DAY,
            end: end % MINUTES_PER_DAY,
        }
    }

    /// The band covering the lagged trailing hour of `now`: from the
    /// minute-of-day one hour before the lagged instant up to the lagged
    /// instant itself.
    pub fn trailing_hour(now: DateTime<Utc>, lag: chrono::Duration) -> Self {
        let end = now - lag;
        let start = end - chrono::Duration::hours(1);
        Self::new(minute_of_day(start), minute_of_day(end))
    }

    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        let m = minute_of_day(t);
        if self.start <= self.end {
            self.start < m && m < self.end
        } else {
            // wraps midnight
            m > self.start || m < self.end
        }
    }
}

const MINUTES_PER_DAY: u32 = 24 * 60;

fn minute_of_day(t: DateTime<Utc>) -> u32 {
    t.hour() * 60 + t.minute()
}

/// Record-level filter applied before grouping.
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    pub window: Option<TimeWindow>,
    pub location: Option<Location>,
    pub identity_in: Option<BTreeSet<Identity>>,
    /// Require a present identity (ranking queries).
    pub identity_present: bool,
    pub minute_band: Option<MinuteBand>,
}

impl RecordFilter {
    pub fn in_window(window: TimeWindow) -> Self {
        Self {
            window: Some(window),
            ..Self::default()
        }
    }

    pub fn at_location(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    pub fn with_identities(mut self, identities: BTreeSet<Identity>) -> Self {
        self.identity_in = Some(identities);
        self
    }

    pub fn require_identity(mut self) -> Self {
        self.identity_present = true;
        self
    }

    pub fn within_band(mut self, band: MinuteBand) -> Self {
        self.minute_band = Some(band);
        self
    }

    pub fn matches(&self, p: &Publication) -> bool {
        if let Some(w) = &self.window {
            if !w.contains(p.timestamp) {
                return false;
            }
        }
        if let Some(loc) = &self.location {
            if &p.location != loc {
                return false;
            }
        }
        if self.identity_present && p.identity.is_none() {
            return false;
        }
        if let Some(allowed) = &self.identity_in {
            match &p.identity {
                Some(id) if allowed.contains(id) => {}
                _ => return false,
            }
        }
        if let Some(band) = &self.minute_band {
            if !band.contains(p.timestamp) {
                return false;
            }
        }
        true
    }
}

/// Grouping key for an aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupBy {
    /// One row per location.
    Location,
    /// One row per `(location, identity, display_name)`; records without an
    /// identity never contribute.
    LocationIdentity,
    /// One row per calendar day (UTC).
    Day,
}

/// Sort order applied after grouping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortBy {
    /// Descending total weight; ties broken by identity ascending, then
    /// location ascending, so results are deterministic.
    TotalWeightDesc,
}

/// A grouped aggregation request: filter, group, optional sort and limit.
#[derive(Debug, Clone)]
pub struct AggregateQuery {
    pub filter: RecordFilter,
    pub group_by: GroupBy,
    pub sort: Option<SortBy>,
    pub limit: Option<usize>,
}

impl AggregateQuery {
    pub fn new(filter: RecordFilter, group_by: GroupBy) -> Self {
        Self {
            filter,
            group_by,
            sort: None,
            limit: None,
        }
    }

    pub fn sorted(mut self, sort: SortBy) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn limited(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// One grouped result row. Which optional fields are set depends on the
/// grouping key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupedRow {
    pub location: Location,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<Identity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day: Option<NaiveDate>,
    pub total_weight: f64,
    pub average_weight: f64,
    pub count: u64,
}
