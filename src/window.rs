//! # Window Calculator
//!
//! Turns a reference instant plus a named span into concrete start/end
//! timestamps. Windows are inclusive on both ends (`start <= t <= end`),
//! matching the range queries the store runs.
//!
//! A processing lag is applied to the reference instant before the span is
//! subtracted so that records not yet durable in storage are never counted.

use chrono::{DateTime, Duration, Months, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Start of data collection; the lower bound of every all-time window.
pub fn collection_epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2016, 1, 1, 0, 0, 0)
        .single()
        .expect("valid collection epoch")
}

/// Named trailing spans the analytics jobs compute over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WindowSpan {
    Hour,
    Day,
    Week,
    Month,
    AllTime,
}

impl WindowSpan {
    pub const ALL: [WindowSpan; 5] = [
        WindowSpan::Hour,
        WindowSpan::Day,
        WindowSpan::Week,
        WindowSpan::Month,
        WindowSpan::AllTime,
    ];

    /// The instant one span before `end`. Months use calendar arithmetic,
    /// not a fixed number of days.
    fn start_before(self, end: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            WindowSpan::Hour => end - Duration::hours(1),
            WindowSpan::Day => end - Duration::days(1),
            WindowSpan::Week => end - Duration::weeks(1),
            WindowSpan::Month => end
                .checked_sub_months(Months::new(1))
                .unwrap_or(end - Duration::days(30)),
            WindowSpan::AllTime => collection_epoch(),
        }
    }
}

/// An inclusive time range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Inclusive on both ends.
    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        self.start <= t && t <= self.end
    }

    /// The equal-length window immediately preceding this one. The shared
    /// boundary instant belongs to both windows (inclusive bounds).
    pub fn adjacent_before(&self) -> TimeWindow {
        let len = self.end - self.start;
        TimeWindow {
            start: self.start - len,
            end: self.start,
        }
    }
}

/// Resolve a lagged trailing window: `end = now - lag`, `start = end - span`.
///
/// Pure function of its inputs; `start < end` holds for every span as long
/// as the epoch predates `end` (all-time windows before 2016 are not a
/// supported input).
pub fn resolve_window(now: DateTime<Utc>, span: WindowSpan, lag: Duration) -> TimeWindow {
    let end = now - lag;
    TimeWindow {
        start: span.start_before(end),
        end,
    }
}

/// Resolve a ranking window: the span is subtracted from the lagged instant
/// but the window runs up to `now` itself. Rankings only bound the range
/// from below, so fresh records still count toward the totals.
pub fn trailing_window(now: DateTime<Utc>, span: WindowSpan, lag: Duration) -> TimeWindow {
    TimeWindow {
        start: span.start_before(now - lag),
        end: now,
    }
}
