//! # Scheduler
//!
//! Drives the recomputation loop: one cycle runs the fixed job list in
//! order, each job's outcome is handed to the event sink, and the next cycle
//! starts after a configurable minimum interval. A failing job never halts
//! the cycle: the error goes out under the job's error event name and the
//! loop moves on.
//!
//! The source system re-triggered the next cycle immediately, hammering the
//! shared store; the minimum interval here is deliberate. Likewise the stop
//! signal: process termination used to be the only way out.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use metrics::{counter, gauge, histogram};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::analytics::daily::compute_daily_averages;
use crate::analytics::deviation::{compute_deviation, DeviationParams};
use crate::analytics::growth::{compute_growth, GrowthParams};
use crate::analytics::polls::{poll_growth, poll_standings};
use crate::analytics::ranking::{compute_ranking_set, RankingParams};
use crate::analytics::AnalyticsError;
use crate::broadcast::{EventSink, SinkEvent};
use crate::config::AnalyticsConfig;
use crate::domain::Location;
use crate::store::{PollStore, PublicationStore};
use crate::window::collection_epoch;

pub struct Scheduler {
    publications: Arc<dyn PublicationStore>,
    polls: Arc<dyn PollStore>,
    sink: Arc<dyn EventSink>,
    cfg: AnalyticsConfig,
    locations: Vec<Location>,
    shutdown: watch::Receiver<bool>,
}

impl Scheduler {
    pub fn new(
        publications: Arc<dyn PublicationStore>,
        polls: Arc<dyn PollStore>,
        sink: Arc<dyn EventSink>,
        cfg: AnalyticsConfig,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let locations = cfg.location_set().iter().collect();
        Self {
            publications,
            polls,
            sink,
            cfg,
            locations,
            shutdown,
        }
    }

    /// Run cycles until the stop signal fires. Within a cycle, jobs run
    /// strictly sequentially; the sink is never awaited.
    pub async fn run(mut self) {
        loop {
            if *self.shutdown.borrow() {
                break;
            }

            let started = Instant::now();
            self.run_cycle().await;
            let elapsed = started.elapsed();
            histogram!("analytics_cycle_duration_ms").record(elapsed.as_millis() as f64);
            gauge!("analytics_last_cycle_ts").set(Utc::now().timestamp() as f64);
            info!(elapsed_ms = elapsed.as_millis() as u64, "cycle finished");

            if let Some(pause) = self.cfg.min_cycle_interval().checked_sub(elapsed) {
                tokio::select! {
                    _ = tokio::time::sleep(pause) => {}
                    _ = self.shutdown.changed() => {}
                }
            }
        }
        info!("scheduler stopped");
    }

    /// One full pass over the job list.
    pub async fn run_cycle(&self) {
        let now = Utc::now();
        let growth_params = GrowthParams {
            lag: self.cfg.lag(),
        };
        let deviation_params = DeviationParams {
            lag: self.cfg.lag(),
            mode: self.cfg.deviation_mode,
        };
        let ranking_params = RankingParams {
            lag: self.cfg.ranking_lag(),
            allow_list: None,
            limit: self.cfg.global_ranking_limit,
        };

        self.emit(
            "growth",
            compute_growth(self.publications.as_ref(), now, growth_params).await,
            SinkEvent::Growth,
            SinkEvent::GrowthError,
        );
        self.emit(
            "deviation",
            compute_deviation(self.publications.as_ref(), now, deviation_params).await,
            SinkEvent::Deviation,
            SinkEvent::DeviationError,
        );
        self.emit(
            "daily-averages",
            compute_daily_averages(
                self.publications.as_ref(),
                &self.locations,
                collection_epoch(),
                now,
            )
            .await,
            SinkEvent::DailyAverages,
            SinkEvent::DailyAveragesError,
        );
        self.emit(
            "top-influencers",
            compute_ranking_set(self.publications.as_ref(), now, &ranking_params).await,
            SinkEvent::TopInfluencers,
            SinkEvent::TopInfluencersError,
        );
        if let Some(allow_list) = &self.cfg.allow_list {
            let filtered_params = RankingParams {
                allow_list: Some(allow_list.clone()),
                ..ranking_params
            };
            self.emit(
                "top-filtered-influencers",
                compute_ranking_set(self.publications.as_ref(), now, &filtered_params).await,
                SinkEvent::TopFilteredInfluencers,
                SinkEvent::TopFilteredInfluencersError,
            );
        }
        self.emit(
            "poll-standings",
            poll_standings(self.polls.as_ref()).await,
            SinkEvent::PollStandings,
            SinkEvent::PollStandingsError,
        );
        self.emit(
            "poll-growth",
            poll_growth(self.polls.as_ref(), self.cfg.poll_lookback_days).await,
            SinkEvent::PollGrowth,
            SinkEvent::PollGrowthError,
        );
    }

    /// Forward one job outcome to the sink, counting it either way.
    fn emit<T>(
        &self,
        job: &'static str,
        outcome: Result<T, AnalyticsError>,
        ok: impl FnOnce(T) -> SinkEvent,
        err: impl FnOnce(String) -> SinkEvent,
    ) {
        counter!("analytics_jobs_total", "job" => job).increment(1);
        match outcome {
            Ok(result) => self.sink.publish(ok(result)),
            Err(e) => {
                counter!("analytics_job_failures_total", "job" => job).increment(1);
                warn!(job, error = %e, "job failed");
                self.sink.publish(err(e.to_string()));
            }
        }
    }
}
