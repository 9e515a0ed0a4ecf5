//! # Analytics Jobs
//!
//! The windowed-aggregation and ranking computations the scheduler runs.
//! Every job is an async function of `(store, params)` returning an explicit
//! `Result`; push semantics live at the broadcast edge, not here.

pub mod daily;
pub mod deviation;
pub mod growth;
pub mod polls;
pub mod ranking;

use serde::Serialize;

use crate::store::StoreError;

/// Failures a job can report. None of these halt the scheduler: they are
/// forwarded to the event hub under the job's error event name and the
/// cycle moves on.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AnalyticsError {
    /// A query's result set was empty where at least one row was expected.
    /// Retryable on the next cycle, never fatal.
    #[error("no matching records found")]
    NoData,
    /// A ratio's denominator was zero; the metric is undefined rather than
    /// infinite.
    #[error("metric undefined: zero baseline")]
    UndefinedMetric,
    #[error(transparent)]
    Repository(#[from] StoreError),
}

/// Summed and averaged weight for one group.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WeightTotals {
    pub total_weight: f64,
    pub average_weight: f64,
    pub count: u64,
}

/// `(newer / older * 100) - 100`. A zero (or non-finite) denominator is
/// `UndefinedMetric`, never ±∞ or NaN.
pub fn growth_pct(older: f64, newer: f64) -> Result<f64, AnalyticsError> {
    ratio_pct(older, newer)
}

/// `(recent / baseline * 100) - 100`, with the same zero-denominator
/// signaling as [`growth_pct`].
pub fn deviation_pct(baseline: f64, recent: f64) -> Result<f64, AnalyticsError> {
    ratio_pct(baseline, recent)
}

fn ratio_pct(denominator: f64, numerator: f64) -> Result<f64, AnalyticsError> {
    if denominator == 0.0 || !denominator.is_finite() {
        return Err(AnalyticsError::UndefinedMetric);
    }
    Ok(numerator / denominator * 100.0 - 100.0)
}
