//! Broadcaster — Binary Entrypoint
//! Boots the analytics scheduler, the event hub, and the HTTP/WebSocket
//! surface, wiring store lifecycle events through to subscribers.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use pulse_broadcaster::announce::{run_announcer, WebhookAnnouncer};
use pulse_broadcaster::api::{self, AppState};
use pulse_broadcaster::broadcast::{EventHub, EventSink, SinkEvent};
use pulse_broadcaster::config::AnalyticsConfig;
use pulse_broadcaster::metrics::Metrics;
use pulse_broadcaster::store::{LifecycleSource, MemoryStore, TimedStore};
use pulse_broadcaster::{Scheduler, StoreLifecycle};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("pulse_broadcaster=info,warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = AnalyticsConfig::load()?;
    let metrics = Metrics::init();

    let store = Arc::new(MemoryStore::new(cfg.location_set()));
    if let Ok(path) = std::env::var("PUBLICATIONS_SEED_PATH") {
        let kept = store.seed_from_json(&path)?;
        info!(kept, path = %path, "seeded publications");
    }

    let hub = Arc::new(EventHub::new(256));

    // Bridge store lifecycle into the event stream. The first cycle waits
    // for the connected signal, like the source system did.
    let mut lifecycle = store.lifecycle();
    let lifecycle_hub = hub.clone();
    let (ready_tx, mut ready_rx) = watch::channel(false);
    tokio::spawn(async move {
        loop {
            match lifecycle.recv().await {
                Ok(state) => {
                    if state == StoreLifecycle::Connected {
                        let _ = ready_tx.send(true);
                    }
                    lifecycle_hub.publish(SinkEvent::Lifecycle(state));
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let announcer_rx = hub.subscribe();
    tokio::spawn(run_announcer(announcer_rx, WebhookAnnouncer::from_env()));

    let timeout = cfg.store_timeout();
    let state = AppState {
        hub: hub.clone(),
        store: Arc::new(TimedStore::new(store.clone(), timeout)),
        location_limit: cfg.location_ranking_limit,
        ranking_lag: cfg.ranking_lag(),
    };
    let router = api::create_router(state).merge(metrics.router());
    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(4000);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, "http server started");
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            warn!(error = %e, "http server exited");
        }
    });

    // Explicit stop signal; ctrl-c ends the scheduler loop cleanly.
    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested");
            let _ = stop_tx.send(true);
        }
    });

    store.connect();
    if ready_rx.changed().await.is_err() {
        anyhow::bail!("store lifecycle bridge dropped before connecting");
    }
    info!("store connected");

    let publications = Arc::new(TimedStore::new(store.clone(), timeout));
    let polls = Arc::new(TimedStore::new(store, timeout));
    let sink: Arc<dyn EventSink> = hub;
    Scheduler::new(publications, polls, sink, cfg, stop_rx)
        .run()
        .await;

    Ok(())
}
