//! HTTP surface: health, the last-computed snapshot for late HTTP consumers,
//! an on-demand per-location ranking, and the WebSocket stream transports
//! subscribe to. WebSocket subscribers get the cached snapshot replayed
//! first, then live events as the scheduler publishes them, matching the
//! contract the socket fan-out of the source system gave late joiners.

use std::sync::Arc;

use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use chrono::Utc;
use tokio::sync::broadcast::error::RecvError;
use tower_http::cors::CorsLayer;
use tracing::debug;

use crate::analytics::ranking::top_ranked_for_location;
use crate::analytics::AnalyticsError;
use crate::broadcast::{EventHub, SinkEvent, Snapshot};
use crate::domain::Location;
use crate::store::PublicationStore;
use crate::window::{trailing_window, WindowSpan};

#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<EventHub>,
    pub store: Arc<dyn PublicationStore>,
    /// Limit for the on-demand per-location ranking.
    pub location_limit: usize,
    pub ranking_lag: chrono::Duration,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/snapshot", get(snapshot))
        .route("/top-influencers/{location}", get(location_ranking))
        .route("/ws", get(ws_upgrade))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

async fn snapshot(State(state): State<AppState>) -> Json<Snapshot> {
    Json(state.hub.snapshot())
}

/// Per-location day ranking, computed on request. This is the calling mode
/// where the limit applies to one location alone, so a small location
/// still surfaces when others dominate globally.
async fn location_ranking(
    State(state): State<AppState>,
    Path(location): Path<String>,
) -> Result<impl IntoResponse, StatusCode> {
    let window = trailing_window(Utc::now(), WindowSpan::Day, state.ranking_lag);
    let entries = top_ranked_for_location(
        state.store.as_ref(),
        window,
        Location::new(location),
        None,
        state.location_limit,
    )
    .await
    .map_err(|e| match e {
        AnalyticsError::Repository(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    })?;
    Ok(Json(entries))
}

async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| client_loop(socket, state.hub))
}

/// Replay the snapshot, then forward live events until either side closes.
/// A slow client that lags the broadcast channel just skips ahead; the
/// scheduler is never back-pressured by a subscriber.
async fn client_loop(mut socket: WebSocket, hub: Arc<EventHub>) {
    let mut rx = hub.subscribe();

    for event in hub.snapshot().replay() {
        if send_event(&mut socket, &event).await.is_err() {
            return;
        }
    }

    loop {
        tokio::select! {
            received = rx.recv() => match received {
                Ok(event) => {
                    if send_event(&mut socket, &event).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped, "subscriber lagged; continuing from live position");
                }
                Err(RecvError::Closed) => break,
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | None => break,
                // Inbound payloads are ignored; this is a one-way feed.
                Some(Ok(_)) => {}
                Some(Err(_)) => break,
            },
        }
    }
}

async fn send_event(socket: &mut WebSocket, event: &SinkEvent) -> Result<(), axum::Error> {
    let frame = event.to_frame().to_string();
    socket.send(Message::Text(frame.into())).await
}
