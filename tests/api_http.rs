// tests/api_http.rs
//
// HTTP surface smoke tests via `tower::ServiceExt::oneshot`.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::Request,
};
use chrono::{Duration, Utc};
use http::StatusCode;
use tower::ServiceExt; // for `oneshot`

use pulse_broadcaster::api::{create_router, AppState};
use pulse_broadcaster::broadcast::{EventHub, EventSink, SinkEvent};
use pulse_broadcaster::{
    Identity, Location, LocationSet, MemoryStore, PollSnapshot, Publication,
};

fn app() -> (Arc<EventHub>, Arc<MemoryStore>, axum::Router) {
    let hub = Arc::new(EventHub::new(16));
    let store = Arc::new(MemoryStore::new(LocationSet::new([
        "Amsterdam",
        "Berlin",
        "Paris",
    ])));
    let state = AppState {
        hub: hub.clone(),
        store: store.clone(),
        location_limit: 10,
        ranking_lag: Duration::zero(),
    };
    (hub, store, create_router(state))
}

#[tokio::test]
async fn health_answers_ok() {
    let (_hub, _store, router) = app();
    let resp = router
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = to_bytes(resp.into_body(), 1024).await.unwrap();
    assert_eq!(&bytes[..], b"ok");
}

#[tokio::test]
async fn snapshot_returns_last_computed_results() {
    let (hub, _store, router) = app();

    let empty = router
        .clone()
        .oneshot(Request::get("/snapshot").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let bytes = to_bytes(empty.into_body(), 64 * 1024).await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body, serde_json::json!({}), "nothing computed yet");

    hub.publish(SinkEvent::PollStandings(PollSnapshot {
        date: chrono::NaiveDate::from_ymd_opt(2016, 6, 15).unwrap(),
        standings: BTreeMap::from([("VVD".to_string(), 31.0)]),
    }));

    let resp = router
        .oneshot(Request::get("/snapshot").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = to_bytes(resp.into_body(), 64 * 1024).await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["poll_standings"]["date"], "2016-06-15");
    assert_eq!(body["poll_standings"]["standings"]["VVD"], 31.0);
}

#[tokio::test]
async fn per_location_ranking_is_computed_on_demand() {
    let (_hub, store, router) = app();
    for (id, weight) in [("anna", 5.0), ("zoe", 9.0)] {
        let p = Publication::new(
            "twitter",
            1,
            Location::new("Berlin"),
            Utc::now() - Duration::minutes(30),
            weight,
        )
        .unwrap()
        .with_identity(Identity::parse(id).unwrap(), id.to_string());
        store.insert(p).unwrap();
    }

    let resp = router
        .oneshot(
            Request::get("/top-influencers/Berlin")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = to_bytes(resp.into_body(), 64 * 1024).await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body[0]["identity"], "zoe");
    assert_eq!(body[1]["identity"], "anna");
    assert_eq!(body.as_array().unwrap().len(), 2);
}
