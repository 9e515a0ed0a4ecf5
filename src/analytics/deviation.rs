//! Historical deviation: the average publication weight of the last (lagged)
//! hour against the long-run baseline average, as a percentage per location.
//!
//! Two windowing modes exist and both are real behavior, kept as explicit
//! configuration rather than collapsed:
//! - `AbsoluteRange` compares the trailing hour against everything since the
//!   collection epoch;
//! - `TimeOfDayBand` additionally narrows both sides to the same
//!   minute-of-day band, so the baseline is "weight at this time of day"
//!   rather than "weight overall".

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::analytics::{deviation_pct, AnalyticsError, WeightTotals};
use crate::domain::Location;
use crate::store::query::{AggregateQuery, GroupBy, MinuteBand, RecordFilter};
use crate::store::PublicationStore;
use crate::window::{collection_epoch, resolve_window, TimeWindow, WindowSpan};

/// Which baseline the deviation job compares against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum DeviationMode {
    AbsoluteRange,
    /// The mode the source system actually ran.
    #[default]
    TimeOfDayBand,
}

/// Grouped average weight within a window, optionally narrowed to a
/// minute-of-day band. Empty result sets are `NoData`.
pub async fn avg_weight_by_location(
    store: &dyn PublicationStore,
    window: TimeWindow,
    band: Option<MinuteBand>,
) -> Result<BTreeMap<Location, WeightTotals>, AnalyticsError> {
    let mut filter = RecordFilter::in_window(window);
    if let Some(band) = band {
        filter = filter.within_band(band);
    }
    let rows = store
        .aggregate(AggregateQuery::new(filter, GroupBy::Location))
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
pub struct LocationDeviation {
    pub baseline_avg: f64,
    pub recent_avg: f64,
    pub deviation_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviationReport {
    pub baseline: TimeWindow,
    pub recent: TimeWindow,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub band: Option<MinuteBand>,
    pub locations: BTreeMap<Location, LocationDeviation>,
}

#[derive(Debug, Clone, Copy)]
pub struct DeviationParams {
    pub lag: Duration,
    pub mode: DeviationMode,
}

/// Compute per-location deviation of the lagged trailing hour from the
/// baseline. Same per-location degradation as growth: undefined ratios are
/// skipped, and the job fails only if nothing is defined.
pub async fn compute_deviation(
    store: &dyn PublicationStore,
    now: DateTime<Utc>,
    params: DeviationParams,
) -> Result<DeviationReport, AnalyticsError> {
    let recent = resolve_window(now, WindowSpan::Hour, params.lag);
    let baseline = TimeWindow::new(collection_epoch(), recent.start);
    let band = match params.mode {
        DeviationMode::AbsoluteRange => None,
        DeviationMode::TimeOfDayBand => Some(MinuteBand::trailing_hour(now, params.lag)),
    };

    let recent_avgs = avg_weight_by_location(store, recent, band).await?;
    let baseline_avgs = avg_weight_by_location(store, baseline, band).await?;

    let mut locations = BTreeMap::new();
    for (location, recent_totals) in &recent_avgs {
        let baseline_avg = baseline_avgs
            .get(location)
            .map(|t| t.average_weight)
            .unwrap_or(0.0);
        match deviation_pct(baseline_avg, recent_totals.average_weight) {
            Ok(pct) => {
                locations.insert(
                    location.clone(),
                    LocationDeviation {
                        baseline_avg,
                        recent_avg: recent_totals.average_weight,
                        deviation_pct: pct,
                    },
                );
            }
            Err(e) => warn!(location = %location, error = %e, "skipping location in deviation"),
        }
    }

    if locations.is_empty() {
        return Err(AnalyticsError::UndefinedMetric);
    }
    Ok(DeviationReport {
        baseline,
        recent,
        band,
        locations,
    })
}
