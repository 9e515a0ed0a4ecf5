// tests/scheduler_cycle.rs
//
// Cycle semantics: one failing job never blocks the rest, results land in
// the hub snapshot, and the stop signal actually stops the loop.

use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use tokio::sync::watch;

use pulse_broadcaster::broadcast::{EventHub, EventSink, SinkEvent};
use pulse_broadcaster::store::TimedStore;
use pulse_broadcaster::{
    AnalyticsConfig, Identity, Location, LocationSet, MemoryStore, Publication, Scheduler,
};

#[derive(Default)]
struct RecordingSink {
    events: Mutex<Vec<SinkEvent>>,
}

impl RecordingSink {
    fn names(&self) -> Vec<&'static str> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.name())
            .collect()
    }
}

impl EventSink for RecordingSink {
    fn publish(&self, event: SinkEvent) {
        self.events.lock().unwrap().push(event);
    }
}

fn test_config() -> AnalyticsConfig {
    AnalyticsConfig {
        lag_minutes: 0,
        ranking_lag_minutes: 0,
        min_cycle_interval_secs: 3600,
        ..AnalyticsConfig::default()
    }
}

fn scheduler_over(
    store: Arc<MemoryStore>,
    sink: Arc<dyn EventSink>,
    cfg: AnalyticsConfig,
) -> (Scheduler, watch::Sender<bool>) {
    let timeout = cfg.store_timeout();
    let (stop_tx, stop_rx) = watch::channel(false);
    let scheduler = Scheduler::new(
        Arc::new(TimedStore::new(store.clone(), timeout)),
        Arc::new(TimedStore::new(store, timeout)),
        sink,
        cfg,
        stop_rx,
    );
    (scheduler, stop_tx)
}

#[tokio::test]
async fn empty_store_reports_every_job_and_keeps_going() {
    let store = Arc::new(MemoryStore::new(LocationSet::new([
        "Amsterdam",
        "Berlin",
        "Paris",
    ])));
    let sink = Arc::new(RecordingSink::default());
    let (scheduler, _stop) = scheduler_over(store, sink.clone(), test_config());

    scheduler.run_cycle().await;

    assert_eq!(
        sink.names(),
        [
            "growth-error",
            "deviation-error",
            "daily-averages-error",
            // Rankings over an empty stream are a valid empty result.
            "top-influencers",
            "poll-standings-error",
            "poll-growth-error",
        ],
        "a failing job must not halt the cycle"
    );
}

#[tokio::test]
async fn filtered_ranking_runs_when_allow_list_is_configured() {
    let store = Arc::new(MemoryStore::new(LocationSet::new(["Berlin"])));
    let ts = Utc::now() - Duration::minutes(30);
    let p = Publication::new("twitter", 1, Location::new("Berlin"), ts, 3.0)
        .unwrap()
        .with_identity(Identity::parse("anna").unwrap(), "Anna");
    store.insert(p).unwrap();

    let mut cfg = test_config();
    cfg.locations = vec!["Berlin".into()];
    cfg.allow_list = Some(
        [Identity::parse("anna").unwrap()]
            .into_iter()
            .collect(),
    );

    let sink = Arc::new(RecordingSink::default());
    let (scheduler, _stop) = scheduler_over(store, sink.clone(), cfg);
    scheduler.run_cycle().await;

    let names = sink.names();
    assert!(names.contains(&"top-influencers"));
    assert!(names.contains(&"top-filtered-influencers"));
}

#[tokio::test]
async fn results_land_in_the_hub_snapshot() {
    let store = Arc::new(MemoryStore::new(LocationSet::new(["Amsterdam"])));
    let now = Utc::now();
    for (minutes, weight) in [(90i64, 10.0), (30, 20.0)] {
        let p = Publication::new(
            "twitter",
            minutes,
            Location::new("Amsterdam"),
            now - Duration::minutes(minutes),
            weight,
        )
        .unwrap();
        store.insert(p).unwrap();
    }

    let mut cfg = test_config();
    cfg.locations = vec!["Amsterdam".into()];

    let hub = Arc::new(EventHub::new(64));
    let (scheduler, _stop) = scheduler_over(store, hub.clone(), cfg);
    scheduler.run_cycle().await;

    let snapshot = hub.snapshot();
    let growth = snapshot.growth.expect("growth cached for late subscribers");
    assert_eq!(
        growth.locations[&Location::new("Amsterdam")].growth_pct,
        100.0
    );
    assert!(snapshot.top_influencers.is_some());
    // Failed jobs leave no stale cache entry behind.
    assert!(snapshot.poll_standings.is_none());
}

#[tokio::test]
async fn stop_signal_ends_the_loop() {
    let store = Arc::new(MemoryStore::new(LocationSet::new(["Amsterdam"])));
    let sink = Arc::new(RecordingSink::default());
    let (scheduler, stop) = scheduler_over(store, sink, test_config());

    let handle = tokio::spawn(scheduler.run());
    tokio::time::sleep(StdDuration::from_millis(100)).await;
    stop.send(true).expect("scheduler is still listening");

    tokio::time::timeout(StdDuration::from_secs(5), handle)
        .await
        .expect("scheduler must stop on signal")
        .expect("scheduler task must not panic");
}

#[tokio::test]
async fn late_subscribers_get_a_replay() {
    let store = Arc::new(MemoryStore::new(LocationSet::new(["Amsterdam"])));
    let now = Utc::now();
    let p = Publication::new("twitter", 1, Location::new("Amsterdam"), now, 1.5).unwrap();
    store.insert(p).unwrap();

    let mut cfg = test_config();
    cfg.locations = vec!["Amsterdam".into()];

    let hub = Arc::new(EventHub::new(64));
    let (scheduler, _stop) = scheduler_over(store, hub.clone(), cfg);
    scheduler.run_cycle().await;

    // Subscribed after the cycle: the live channel holds nothing for us,
    // but the snapshot replays what was computed.
    let replayed = hub.snapshot().replay();
    assert!(replayed
        .iter()
        .any(|e| e.name() == "top-influencers"));
    assert!(replayed.iter().all(|e| !e.is_error()));
}
