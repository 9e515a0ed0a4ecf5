use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("analytics_jobs_total", "Analytics job executions.");
        describe_counter!(
            "analytics_job_failures_total",
            "Analytics jobs that reported an error event."
        );
        describe_histogram!(
            "analytics_cycle_duration_ms",
            "Wall time of one full scheduler cycle in milliseconds."
        );
        describe_gauge!(
            "analytics_last_cycle_ts",
            "Unix ts when the last cycle finished."
        );
        describe_counter!(
            "broadcast_events_total",
            "Events published through the hub, by wire name."
        );
    });
}

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the Prometheus recorder and register series descriptions.
    pub fn init() -> Self {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .expect("prometheus: install recorder");
        ensure_metrics_described();
        Self { handle }
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}
