//! Top influencers: ranked total weight per author, grouped by location,
//! over multiple trailing windows, optionally restricted to an allow-list
//! of identities.
//!
//! Two calling modes exist and deliberately stay separate; they differ when
//! one location dominates globally:
//! - a single call across all locations with the limit applied globally,
//!   then partitioned by location;
//! - one call per location with the limit applied to that location alone.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::analytics::AnalyticsError;
use crate::domain::{Identity, Location};
use crate::store::query::{AggregateQuery, GroupBy, GroupedRow, RecordFilter, SortBy};
use crate::store::PublicationStore;
use crate::window::{trailing_window, TimeWindow, WindowSpan};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedEntry {
    pub identity: Identity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub location: Location,
    pub total_weight: f64,
}

impl From<GroupedRow> for RankedEntry {
    fn from(row: GroupedRow) -> Self {
        Self {
            // `require_identity` on the filter guarantees presence; an
            // identity-less row would be a store bug, surfaced loudly.
            identity: row.identity.expect("ranked row without identity"),
            display_name: row.display_name,
            location: row.location,
            total_weight: row.total_weight,
        }
    }
}

/// Ranked entries per location, descending by total weight.
pub type LocationRanking = BTreeMap<Location, Vec<RankedEntry>>;

fn ranking_filter(window: TimeWindow, allow_list: Option<&BTreeSet<Identity>>) -> RecordFilter {
    let mut filter = RecordFilter::in_window(window).require_identity();
    if let Some(allow) = allow_list {
        filter = filter.with_identities(allow.clone());
    }
    filter
}

/// Global mode: one query across all locations, `limit` applied to the
/// ranking as a whole, then partitioned by location. A location with zero
/// qualifying records is simply absent from the map, not an error.
pub async fn top_ranked(
    store: &dyn PublicationStore,
    window: TimeWindow,
    allow_list: Option<&BTreeSet<Identity>>,
    limit: usize,
) -> Result<LocationRanking, AnalyticsError> {
    let rows = store
        .aggregate(
            AggregateQuery::new(ranking_filter(window, allow_list), GroupBy::LocationIdentity)
                .sorted(SortBy::TotalWeightDesc)
                .limited(limit),
        )
        .await?;

    let mut ranking = LocationRanking::new();
    for row in rows {
        ranking
            .entry(row.location.clone())
            .or_insert_with(Vec::new)
            .push(RankedEntry::from(row));
    }
    Ok(ranking)
}

/// Per-location mode: `limit` applies to this location alone. An empty
/// vector is a valid result.
pub async fn top_ranked_for_location(
    store: &dyn PublicationStore,
    window: TimeWindow,
    location: Location,
    allow_list: Option<&BTreeSet<Identity>>,
    limit: usize,
) -> Result<Vec<RankedEntry>, AnalyticsError> {
    let rows = store
        .aggregate(
            AggregateQuery::new(
                ranking_filter(window, allow_list).at_location(location),
                GroupBy::LocationIdentity,
            )
            .sorted(SortBy::TotalWeightDesc)
            .limited(limit),
        )
        .await?;
    Ok(rows.into_iter().map(RankedEntry::from).collect())
}

/// Rankings over every trailing span, joined as one result.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankingSet {
    pub hour: LocationRanking,
    pub day: LocationRanking,
    pub week: LocationRanking,
    pub month: LocationRanking,
    pub all_time: LocationRanking,
}

#[derive(Debug, Clone)]
pub struct RankingParams {
    pub lag: Duration,
    pub allow_list: Option<BTreeSet<Identity>>,
    pub limit: usize,
}

/// Compute the full ranking set. The five sibling window queries fan out
/// concurrently against the store; all must complete before the set is
/// emitted; partial sets never leave this function.
pub async fn compute_ranking_set(
    store: &dyn PublicationStore,
    now: DateTime<Utc>,
    params: &RankingParams,
) -> Result<RankingSet, AnalyticsError> {
    let allow = params.allow_list.as_ref();
    let for_span =
        |span| top_ranked(store, trailing_window(now, span, params.lag), allow, params.limit);

    let (hour, day, week, month, all_time) = tokio::join!(
        for_span(WindowSpan::Hour),
        for_span(WindowSpan::Day),
        for_span(WindowSpan::Week),
        for_span(WindowSpan::Month),
        for_span(WindowSpan::AllTime),
    );

    Ok(RankingSet {
        hour: hour?,
        day: day?,
        week: week?,
        month: month?,
        all_time: all_time?,
    })
}
