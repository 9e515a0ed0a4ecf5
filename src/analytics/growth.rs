//! Hourly growth: the cumulative publication weight of the last (lagged)
//! hour against the hour before it, as a percentage per location.
//!
//! E.g. cumulative weight 19:00–20:00 = 100, 18:00–19:00 = 80 → +25%.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::warn;

use crate::analytics::{growth_pct, AnalyticsError, WeightTotals};
use crate::domain::Location;
use crate::store::query::{AggregateQuery, GroupBy, RecordFilter};
use crate::store::PublicationStore;
use crate::window::{resolve_window, TimeWindow, WindowSpan};

/// Grouped cumulative weight within a window, keyed by location.
///
/// Empty result sets are `NoData`; the caller treats it as retryable.
pub async fn sum_weight_by_location(
    store: &dyn PublicationStore,
    window: TimeWindow,
) -> Result<BTreeMap<Location, WeightTotals>, AnalyticsError> {
    let rows = store
        .aggregate(AggregateQuery::new(
            RecordFilter::in_window(window),
            GroupBy::Location,
        ))
        .await?;
    if rows.is_empty() {
        return Err(AnalyticsError::NoData);
    }
    Ok(rows
        .into_iter()
        .map(|r| {
            (
                r.location,
                WeightTotals {
                    total_weight: r.total_weight,
                    average_weight: r.average_weight,
                    count: r.count,
                },
            )
        })
        .collect())
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LocationGrowth {
    pub older_total: f64,
    pub newer_total: f64,
    pub growth_pct: f64,
}

/// Per-location growth between two adjacent equal-span windows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GrowthReport {
    pub older: TimeWindow,
    pub newer: TimeWindow,
    pub locations: BTreeMap<Location, LocationGrowth>,
}

#[derive(Debug, Clone, Copy)]
pub struct GrowthParams {
    /// Processing lag applied before the newer window is derived.
    pub lag: Duration,
}

/// Compute growth for the lagged trailing hour versus the hour before it.
///
/// Locations with a zero or absent baseline are omitted (logged) rather than
/// reported as infinite; if no location has a defined ratio the whole job
/// fails with `UndefinedMetric`.
pub async fn compute_growth(
    store: &dyn PublicationStore,
    now: DateTime<Utc>,
    params: GrowthParams,
) -> Result<GrowthReport, AnalyticsError> {
    let newer = resolve_window(now, WindowSpan::Hour, params.lag);
    let older = newer.adjacent_before();

    let newer_sums = sum_weight_by_location(store, newer).await?;
    let older_sums = sum_weight_by_location(store, older).await?;

    let mut locations = BTreeMap::new();
    for (location, newer_totals) in &newer_sums {
        let older_total = older_sums
            .get(location)
            .map(|t| t.total_weight)
            .unwrap_or(0.0);
        match growth_pct(older_total, newer_totals.total_weight) {
            Ok(pct) => {
                locations.insert(
                    location.clone(),
                    LocationGrowth {
                        older_total,
                        newer_total: newer_totals.total_weight,
                        growth_pct: pct,
                    },
                );
            }
            Err(e) => warn!(location = %location, error = %e, "skipping location in growth"),
        }
    }

    if locations.is_empty() {
        return Err(AnalyticsError::UndefinedMetric);
    }
    Ok(GrowthReport {
        older,
        newer,
        locations,
    })
}
