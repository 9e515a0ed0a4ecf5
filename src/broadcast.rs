//! # Event Hub
//!
//! The boundary where job results become named events. Jobs return plain
//! `Result`s; the scheduler forwards them here, and the hub fans them out to
//! subscribers over a broadcast channel. The hub, not the core, owns the
//! "last computed snapshot" that late subscribers are replayed on connect.

use std::sync::RwLock;

use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::broadcast;

use crate::analytics::daily::DailyAverageReport;
use crate::analytics::deviation::DeviationReport;
use crate::analytics::growth::GrowthReport;
use crate::analytics::polls::PollGrowthReport;
use crate::analytics::ranking::RankingSet;
use crate::domain::PollSnapshot;
use crate::store::StoreLifecycle;

/// A named event as it goes out on the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum SinkEvent {
    Growth(GrowthReport),
    GrowthError(String),
    Deviation(DeviationReport),
    DeviationError(String),
    DailyAverages(DailyAverageReport),
    DailyAveragesError(String),
    TopInfluencers(RankingSet),
    TopInfluencersError(String),
    TopFilteredInfluencers(RankingSet),
    TopFilteredInfluencersError(String),
    PollStandings(PollSnapshot),
    PollStandingsError(String),
    PollGrowth(PollGrowthReport),
    PollGrowthError(String),
    Lifecycle(StoreLifecycle),
}

impl SinkEvent {
    /// Wire name of the event. Error events carry the `-error` suffix of
    /// the job they belong to.
    pub fn name(&self) -> &'static str {
        match self {
            SinkEvent::Growth(_) => "growth",
            SinkEvent::GrowthError(_) => "growth-error",
            SinkEvent::Deviation(_) => "deviation",
            SinkEvent::DeviationError(_) => "deviation-error",
            SinkEvent::DailyAverages(_) => "daily-averages",
            SinkEvent::DailyAveragesError(_) => "daily-averages-error",
            SinkEvent::TopInfluencers(_) => "top-influencers",
            SinkEvent::TopInfluencersError(_) => "top-influencers-error",
            SinkEvent::TopFilteredInfluencers(_) => "top-filtered-influencers",
            SinkEvent::TopFilteredInfluencersError(_) => "top-filtered-influencers-error",
            SinkEvent::PollStandings(_) => "poll-standings",
            SinkEvent::PollStandingsError(_) => "poll-standings-error",
            SinkEvent::PollGrowth(_) => "poll-growth",
            SinkEvent::PollGrowthError(_) => "poll-growth-error",
            SinkEvent::Lifecycle(l) => match l {
                StoreLifecycle::Connected => "connected",
                StoreLifecycle::Disconnected => "disconnected",
                StoreLifecycle::Reconnected => "reconnected",
                StoreLifecycle::ConnectionError(_) => "connection-error",
            },
        }
    }

    pub fn is_error(&self) -> bool {
        self.name().ends_with("-error")
    }

    fn payload(&self) -> Value {
        fn val<T: Serialize>(v: &T) -> Value {
            serde_json::to_value(v).unwrap_or(Value::Null)
        }
        match self {
            SinkEvent::Growth(r) => val(r),
            SinkEvent::Deviation(r) => val(r),
            SinkEvent::DailyAverages(r) => val(r),
            SinkEvent::TopInfluencers(r) | SinkEvent::TopFilteredInfluencers(r) => val(r),
            SinkEvent::PollStandings(r) => val(r),
            SinkEvent::PollGrowth(r) => val(r),
            SinkEvent::Lifecycle(l) => match l {
                StoreLifecycle::ConnectionError(reason) => json!({ "error": reason }),
                _ => Value::Null,
            },
            SinkEvent::GrowthError(e)
            | SinkEvent::DeviationError(e)
            | SinkEvent::DailyAveragesError(e)
            | SinkEvent::TopInfluencersError(e)
            | SinkEvent::TopFilteredInfluencersError(e)
            | SinkEvent::PollStandingsError(e)
            | SinkEvent::PollGrowthError(e) => json!({ "error": e }),
        }
    }

    /// The JSON frame transport adapters send: `{"event": ..., "data": ...}`.
    pub fn to_frame(&self) -> Value {
        json!({ "event": self.name(), "data": self.payload() })
    }
}

/// Where the scheduler hands off job outcomes. Publishing must never block
/// the publishing job.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: SinkEvent);
}

/// Last successfully computed result of every job, replayed to late
/// subscribers. Error events never overwrite a cached result.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Snapshot {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub growth: Option<GrowthReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deviation: Option<DeviationReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub daily_averages: Option<DailyAverageReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_influencers: Option<RankingSet>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_filtered_influencers: Option<RankingSet>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poll_standings: Option<PollSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poll_growth: Option<PollGrowthReport>,
}

impl Snapshot {
    /// The cached results as replayable events, in job order.
    pub fn replay(&self) -> Vec<SinkEvent> {
        let mut events = Vec::new();
        if let Some(r) = &self.growth {
            events.push(SinkEvent::Growth(r.clone()));
        }
        if let Some(r) = &self.deviation {
            events.push(SinkEvent::Deviation(r.clone()));
        }
        if let Some(r) = &self.daily_averages {
            events.push(SinkEvent::DailyAverages(r.clone()));
        }
        if let Some(r) = &self.top_influencers {
            events.push(SinkEvent::TopInfluencers(r.clone()));
        }
        if let Some(r) = &self.top_filtered_influencers {
            events.push(SinkEvent::TopFilteredInfluencers(r.clone()));
        }
        if let Some(r) = &self.poll_standings {
            events.push(SinkEvent::PollStandings(r.clone()));
        }
        if let Some(r) = &self.poll_growth {
            events.push(SinkEvent::PollGrowth(r.clone()));
        }
        events
    }
}

pub struct EventHub {
    tx: broadcast::Sender<SinkEvent>,
    snapshot: RwLock<Snapshot>,
}

impl EventHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            snapshot: RwLock::new(Snapshot::default()),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SinkEvent> {
        self.tx.subscribe()
    }

    pub fn snapshot(&self) -> Snapshot {
        self.snapshot.read().expect("snapshot lock poisoned").clone()
    }

    fn cache(&self, event: &SinkEvent) {
        let mut snap = self.snapshot.write().expect("snapshot lock poisoned");
        match event {
            SinkEvent::Growth(r) => snap.growth = Some(r.clone()),
            SinkEvent::Deviation(r) => snap.deviation = Some(r.clone()),
            SinkEvent::DailyAverages(r) => snap.daily_averages = Some(r.clone()),
            SinkEvent::TopInfluencers(r) => snap.top_influencers = Some(r.clone()),
            SinkEvent::TopFilteredInfluencers(r) => {
                snap.top_filtered_influencers = Some(r.clone())
            }
            SinkEvent::PollStandings(r) => snap.poll_standings = Some(r.clone()),
            SinkEvent::PollGrowth(r) => snap.poll_growth = Some(r.clone()),
            _ => {}
        }
    }
}

impl EventSink for EventHub {
    fn publish(&self, event: SinkEvent) {
        metrics::counter!("broadcast_events_total", "event" => event.name()).increment(1);
        self.cache(&event);
        // A send error only means no subscriber is currently listening.
        let _ = self.tx.send(event);
    }
}
