//! In-memory store backend.
//!
//! Holds the publication stream and poll snapshots in process memory and
//! answers the same grouped-aggregation queries a document database would.
//! Used for local runs (optionally seeded from a JSON fixture) and tests.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use tokio::sync::broadcast;
use tracing::warn;

use crate::domain::{Identity, InvalidPublication, LocationSet, PollSnapshot, Publication};
use crate::store::query::{AggregateQuery, GroupBy, GroupedRow, RecordFilter, SortBy};
use crate::store::{
    LifecycleSource, PollStore, PublicationStore, StoreLifecycle, StoreResult,
};

#[derive(Default)]
struct Inner {
    publications: Vec<Publication>,
    polls: Vec<PollSnapshot>,
}

pub struct MemoryStore {
    inner: RwLock<Inner>,
    locations: LocationSet,
    lifecycle_tx: broadcast::Sender<StoreLifecycle>,
}

impl MemoryStore {
    pub fn new(locations: LocationSet) -> Self {
        let (lifecycle_tx, _) = broadcast::channel(16);
        Self {
            inner: RwLock::new(Inner::default()),
            locations,
            lifecycle_tx,
        }
    }

    /// Announce readiness to lifecycle subscribers. A memory store has no
    /// real connection; this mirrors the bridge a database-backed store
    /// would provide.
    pub fn connect(&self) {
        let _ = self.lifecycle_tx.send(StoreLifecycle::Connected);
    }

    /// Insert one publication. Unknown locations and malformed weights are
    /// rejected rather than silently creating new groups; identities are
    /// re-normalized so a seeded `"@handle"` groups with `"handle"`.
    pub fn insert(&self, mut publication: Publication) -> Result<(), InvalidPublication> {
        if !publication.is_valid() {
            return Err(InvalidPublication::Weight(publication.weight));
        }
        if !self.locations.is_empty() && !self.locations.contains(&publication.location) {
            return Err(InvalidPublication::UnknownLocation(publication.location));
        }
        if let Some(id) = publication.identity.take() {
            publication.identity = Identity::parse(id.as_str());
        }
        self.write().publications.push(publication);
        Ok(())
    }

    pub fn insert_poll(&self, snapshot: PollSnapshot) {
        self.write().polls.push(snapshot);
    }

    /// Load publications (and optionally poll snapshots) from a JSON seed
    /// file. Invalid records are dropped with a warning.
    pub fn seed_from_json(&self, path: impl AsRef<Path>) -> anyhow::Result<usize> {
        use anyhow::Context;

        let raw = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("reading seed file {}", path.as_ref().display()))?;
        let seed: SeedFile = serde_json::from_str(&raw).context("parsing seed file")?;

        let mut kept = 0usize;
        for p in seed.publications {
            match self.insert(p) {
                Ok(()) => kept += 1,
                Err(e) => warn!(error = %e, "dropping seeded publication"),
            }
        }
        for snapshot in seed.polls {
            self.insert_poll(snapshot);
        }
        Ok(kept)
    }

    pub fn publication_count(&self) -> usize {
        self.read().publications.len()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Inner> {
        self.inner.read().expect("memory store lock poisoned")
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Inner> {
        self.inner.write().expect("memory store lock poisoned")
    }
}

#[derive(Deserialize)]
struct SeedFile {
    #[serde(default)]
    publications: Vec<Publication>,
    #[serde(default)]
    polls: Vec<PollSnapshot>,
}

/// Accumulator for one group.
#[derive(Default)]
struct Acc {
    total: f64,
    count: u64,
}

type GroupKey = (
    crate::domain::Location,
    Option<crate::domain::Identity>,
    Option<String>,
    Option<NaiveDate>,
);

#[async_trait]
impl PublicationStore for MemoryStore {
    async fn aggregate(&self, query: AggregateQuery) -> StoreResult<Vec<GroupedRow>> {
        let inner = self.read();

        let mut groups: BTreeMap<GroupKey, Acc> = BTreeMap::new();
        for p in inner.publications.iter().filter(|p| query.filter.matches(p)) {
            let key: GroupKey = match query.group_by {
                GroupBy::Location => (p.location.clone(), None, None, None),
                GroupBy::LocationIdentity => match &p.identity {
                    Some(id) => (
                        p.location.clone(),
                        Some(id.clone()),
                        p.display_name.clone(),
                        None,
                    ),
                    // Identity-less records never contribute to rankings.
                    None => continue,
                },
                GroupBy::Day => (
                    p.location.clone(),
                    None,
                    None,
                    Some(p.timestamp.date_naive()),
                ),
            };
            let acc = groups.entry(key).or_default();
            acc.total += p.weight;
            acc.count += 1;
        }
        drop(inner);

        let mut rows: Vec<GroupedRow> = groups
            .into_iter()
            .map(|((location, identity, display_name, day), acc)| GroupedRow {
                location,
                identity,
                display_name,
                day,
                total_weight: acc.total,
                average_weight: acc.total / acc.count as f64,
                count: acc.count,
            })
            .collect();

        match query.sort {
            Some(SortBy::TotalWeightDesc) => {
                rows.sort_by(|a, b| {
                    b.total_weight
                        .total_cmp(&a.total_weight)
                        .then_with(|| a.identity.cmp(&b.identity))
                        .then_with(|| a.location.cmp(&b.location))
                });
            }
            None => {}
        }
        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }

    async fn find_recent(
        &self,
        filter: RecordFilter,
        limit: usize,
    ) -> StoreResult<Vec<Publication>> {
        let inner = self.read();
        let mut matched: Vec<Publication> = inner
            .publications
            .iter()
            .filter(|p| filter.matches(p))
            .cloned()
            .collect();
        matched.sort_by_key(|p| std::cmp::Reverse(p.timestamp));
        matched.truncate(limit);
        Ok(matched)
    }
}

#[async_trait]
impl PollStore for MemoryStore {
    async fn latest_snapshot(&self) -> StoreResult<Option<PollSnapshot>> {
        let inner = self.read();
        Ok(inner.polls.iter().max_by_key(|s| s.date).cloned())
    }

    async fn snapshot_on(&self, date: NaiveDate) -> StoreResult<Option<PollSnapshot>> {
        let inner = self.read();
        Ok(inner.polls.iter().find(|s| s.date == date).cloned())
    }
}

impl LifecycleSource for MemoryStore {
    fn lifecycle(&self) -> broadcast::Receiver<StoreLifecycle> {
        self.lifecycle_tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Identity, Location};
    use crate::window::TimeWindow;
    use chrono::{Duration, TimeZone, Utc};

    fn store() -> MemoryStore {
        MemoryStore::new(LocationSet::new(["Amsterdam", "Berlin", "Paris"]))
    }

    fn publication(loc: &str, id: Option<&str>, ts_minutes_ago: i64, weight: f64) -> Publication {
        let ts = Utc.with_ymd_and_hms(2016, 6, 1, 12, 0, 0).unwrap()
            - Duration::minutes(ts_minutes_ago);
        let mut p =
            Publication::new("twitter", ts_minutes_ago, Location::new(loc), ts, weight).unwrap();
        if let Some(id) = id {
            p = p.with_identity(Identity::parse(id).unwrap(), id.to_uppercase());
        }
        p
    }

    #[tokio::test]
    async fn rejects_unknown_location() {
        let s = store();
        let err = s.insert(publication("Rotterdam", None, 0, 1.0)).unwrap_err();
        assert!(matches!(err, InvalidPublication::UnknownLocation(_)));
        assert_eq!(s.publication_count(), 0);
    }

    #[tokio::test]
    async fn groups_by_location_with_sum_and_average() {
        let s = store();
        s.insert(publication("Amsterdam", None, 10, 2.0)).unwrap();
        s.insert(publication("Amsterdam", None, 20, 4.0)).unwrap();
        s.insert(publication("Berlin", None, 15, 9.0)).unwrap();

        let window = TimeWindow::new(
            Utc.with_ymd_and_hms(2016, 6, 1, 11, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2016, 6, 1, 12, 0, 0).unwrap(),
        );
        let rows = s
            .aggregate(AggregateQuery::new(
                RecordFilter::in_window(window),
                GroupBy::Location,
            ))
            .await
            .unwrap();

        assert_eq!(rows.len(), 2);
        let ams = rows.iter().find(|r| r.location.as_str() == "Amsterdam").unwrap();
        assert_eq!(ams.total_weight, 6.0);
        assert_eq!(ams.average_weight, 3.0);
        assert_eq!(ams.count, 2);
    }

    #[tokio::test]
    async fn ranked_rows_tie_break_on_identity() {
        let s = store();
        s.insert(publication("Berlin", Some("zoe"), 5, 7.0)).unwrap();
        s.insert(publication("Berlin", Some("anna"), 6, 7.0)).unwrap();

        let rows = s
            .aggregate(
                AggregateQuery::new(
                    RecordFilter::default().require_identity(),
                    GroupBy::LocationIdentity,
                )
                .sorted(SortBy::TotalWeightDesc),
            )
            .await
            .unwrap();

        let ids: Vec<_> = rows
            .iter()
            .map(|r| r.identity.as_ref().unwrap().as_str())
            .collect();
        assert_eq!(ids, ["anna", "zoe"], "equal totals order by identity");
    }

    #[tokio::test]
    async fn find_recent_is_newest_first() {
        let s = store();
        s.insert(publication("Paris", None, 30, 1.0)).unwrap();
        s.insert(publication("Paris", None, 5, 2.0)).unwrap();
        s.insert(publication("Paris", None, 90, 3.0)).unwrap();

        let recent = s.find_recent(RecordFilter::default(), 2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].weight, 2.0);
        assert_eq!(recent[1].weight, 1.0);
    }
}
