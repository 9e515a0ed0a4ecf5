//! Poll standings and their movement: the latest daily snapshot of projected
//! seats per party, and the seat change against the snapshot two weeks back.

use chrono::Duration;
use serde::Serialize;

use crate::analytics::AnalyticsError;
use crate::domain::PollSnapshot;
use crate::store::PollStore;

/// The newest snapshot. No snapshot at all → `NoData`.
pub async fn poll_standings(store: &dyn PollStore) -> Result<PollSnapshot, AnalyticsError> {
    store.latest_snapshot().await?.ok_or(AnalyticsError::NoData)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PollGrowthItem {
    pub party: String,
    pub start_seats: f64,
    pub end_seats: f64,
    pub growth: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PollGrowthReport {
    pub start_date: chrono::NaiveDate,
    pub end_date: chrono::NaiveDate,
    pub items: Vec<PollGrowthItem>,
}

/// Seat movement per party between the latest snapshot and the one
/// `lookback_days` earlier. Parties missing from either side are omitted;
/// items sort descending by growth (ties by party name). Either snapshot
/// missing → `NoData`.
pub async fn poll_growth(
    store: &dyn PollStore,
    lookback_days: i64,
) -> Result<PollGrowthReport, AnalyticsError> {
    let end = store.latest_snapshot().await?.ok_or(AnalyticsError::NoData)?;
    let start_date = end.date - Duration::days(lookback_days);
    let start = store
        .snapshot_on(start_date)
        .await?
        .ok_or(AnalyticsError::NoData)?;

    let mut items: Vec<PollGrowthItem> = start
        .standings
        .iter()
        .filter_map(|(party, start_seats)| {
            end.standings.get(party).map(|end_seats| PollGrowthItem {
                party: party.clone(),
                start_seats: *start_seats,
                end_seats: *end_seats,
                growth: end_seats - start_seats,
            })
        })
        .collect();
    items.sort_by(|a, b| {
        b.growth
            .total_cmp(&a.growth)
            .then_with(|| a.party.cmp(&b.party))
    });

    Ok(PollGrowthReport {
        start_date: start.date,
        end_date: end.date,
        items,
    })
}
