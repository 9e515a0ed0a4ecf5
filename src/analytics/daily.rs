//! Historical development: a day-by-day series of average publication
//! weights per location, for graphing. Days without records are absent, not
//! zero-filled.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;

use crate::analytics::AnalyticsError;
use crate::domain::Location;
use crate::store::query::{AggregateQuery, GroupBy, RecordFilter};
use crate::store::PublicationStore;
use crate::window::TimeWindow;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DailyAverage {
    pub date: chrono::NaiveDate,
    pub average_weight: f64,
}

/// One entry per calendar day with at least one record, ascending by date.
///
/// The grouping stage is keyed, not ordered, so the sort here is what
/// guarantees the series is usable as a graph. Zero days → `NoData`.
pub async fn daily_averages(
    store: &dyn PublicationStore,
    location: Location,
    since: DateTime<Utc>,
    until: DateTime<Utc>,
) -> Result<Vec<DailyAverage>, AnalyticsError> {
    let filter = RecordFilter::in_window(TimeWindow::new(since, until)).at_location(location);
    let rows = store
        .aggregate(AggregateQuery::new(filter, GroupBy::Day))
        .await?;
    if rows.is_empty() {
        return Err(AnalyticsError::NoData);
    }

    let mut series: Vec<DailyAverage> = rows
        .into_iter()
        .filter_map(|r| {
            r.day.map(|date| DailyAverage {
                date,
                average_weight: r.average_weight,
            })
        })
        .collect();
    series.sort_by_key(|e| e.date);
    Ok(series)
}

/// Per-location daily series, one map entry per location that has data.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyAverageReport {
    pub since: DateTime<Utc>,
    pub locations: BTreeMap<Location, Vec<DailyAverage>>,
}

/// Build the series for every configured location. A location without data
/// is omitted (logged); the job only fails when every location is empty.
pub async fn compute_daily_averages(
    store: &dyn PublicationStore,
    locations: &[Location],
    since: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<DailyAverageReport, AnalyticsError> {
    let mut out = BTreeMap::new();
    for location in locations {
        match daily_averages(store, location.clone(), since, now).await {
            Ok(series) => {
                out.insert(location.clone(), series);
            }
            Err(AnalyticsError::NoData) => {
                warn!(location = %location, "no records for daily averages");
            }
            Err(e) => return Err(e),
        }
    }
    if out.is_empty() {
        return Err(AnalyticsError::NoData);
    }
    Ok(DailyAverageReport {
        since,
        locations: out,
    })
}
