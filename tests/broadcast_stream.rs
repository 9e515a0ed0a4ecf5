// tests/broadcast_stream.rs
//
// Hub contract: live subscribers see published events; the snapshot replay
// carries only results, in job order, for late joiners.

use std::collections::BTreeMap;

use pulse_broadcaster::broadcast::{EventHub, EventSink, SinkEvent};
use pulse_broadcaster::PollSnapshot;

fn standings(day: u32) -> PollSnapshot {
    PollSnapshot {
        date: chrono::NaiveDate::from_ymd_opt(2016, 6, day).unwrap(),
        standings: BTreeMap::new(),
    }
}

#[tokio::test]
async fn live_subscribers_receive_events_in_order() {
    let hub = EventHub::new(16);
    let mut rx = hub.subscribe();

    hub.publish(SinkEvent::PollStandings(standings(1)));
    hub.publish(SinkEvent::PollGrowthError("nothing found".into()));

    assert_eq!(rx.recv().await.unwrap().name(), "poll-standings");
    let second = rx.recv().await.unwrap();
    assert_eq!(second.name(), "poll-growth-error");
    assert!(second.is_error());
}

#[tokio::test]
async fn replay_reflects_the_freshest_result_per_job() {
    let hub = EventHub::new(16);
    hub.publish(SinkEvent::PollStandings(standings(1)));
    hub.publish(SinkEvent::PollStandings(standings(2)));

    let replayed = hub.snapshot().replay();
    assert_eq!(replayed.len(), 1, "one cached entry per job");
    match &replayed[0] {
        SinkEvent::PollStandings(s) => assert_eq!(s.date.to_string(), "2016-06-02"),
        other => panic!("unexpected replay event {}", other.name()),
    }
}

#[tokio::test]
async fn publishing_without_subscribers_is_fine() {
    let hub = EventHub::new(16);
    hub.publish(SinkEvent::GrowthError("no matching records found".into()));
    assert!(hub.snapshot().replay().is_empty());
}
