//! # Leader Announcer
//!
//! Watches the day rankings coming out of the hub and posts a short message
//! whenever a location's top influencer changes. Change detection only: the
//! same leader twice in a row stays silent.

use std::collections::HashMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::analytics::ranking::RankingSet;
use crate::broadcast::SinkEvent;
use crate::domain::{Identity, Location};

/// Which ranking stream a leader belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RankingScope {
    All,
    Filtered,
}

/// Something that can deliver an announcement. The webhook implementation
/// is the production path; tests record instead.
#[async_trait]
pub trait Announcer: Send + Sync {
    async fn post(&self, message: &str) -> Result<()>;
}

pub struct WebhookAnnouncer {
    webhook_url: Option<String>,
    client: Client,
}

impl WebhookAnnouncer {
    pub fn from_env() -> Self {
        Self {
            webhook_url: std::env::var("ANNOUNCE_WEBHOOK_URL").ok(),
            client: Client::new(),
        }
    }

    pub fn new(url: String) -> Self {
        Self {
            webhook_url: Some(url),
            client: Client::new(),
        }
    }
}

#[async_trait]
impl Announcer for WebhookAnnouncer {
    async fn post(&self, message: &str) -> Result<()> {
        let Some(url) = &self.webhook_url else {
            debug!("announcer disabled (no ANNOUNCE_WEBHOOK_URL)");
            return Ok(());
        };

        let body = serde_json::json!({ "text": message });
        self.client
            .post(url)
            .json(&body)
            .send()
            .await
            .context("announce post")?
            .error_for_status()
            .context("announce non-2xx")?;
        Ok(())
    }
}

/// Remembers the last announced leader per `(scope, location)`.
#[derive(Debug, Default)]
pub struct LeaderTracker {
    last: HashMap<(RankingScope, Location), Identity>,
}

impl LeaderTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inspect a day ranking and return the announcements it warrants,
    /// recording the new leaders as already-announced.
    pub fn observe(&mut self, scope: RankingScope, set: &RankingSet) -> Vec<String> {
        let mut messages = Vec::new();
        for (location, entries) in &set.day {
            let Some(leader) = entries.first() else {
                continue;
            };
            let key = (scope, location.clone());
            if self.last.get(&key) == Some(&leader.identity) {
                continue;
            }
            self.last.insert(key, leader.identity.clone());
            messages.push(message_for(scope, location, &leader.identity));
        }
        messages
    }
}

fn message_for(scope: RankingScope, location: &Location, identity: &Identity) -> String {
    match scope {
        RankingScope::All => format!(
            "The most influential publisher of the last 24 hours in {location} is @{identity}"
        ),
        RankingScope::Filtered => format!(
            "The most influential listed publisher of the last 24 hours in {location} is @{identity}"
        ),
    }
}

/// Consume hub events and announce leader changes until the hub closes.
/// Delivery failures are logged, never retried.
pub async fn run_announcer(
    mut events: broadcast::Receiver<SinkEvent>,
    announcer: impl Announcer,
) {
    let mut tracker = LeaderTracker::new();
    loop {
        let event = match events.recv().await {
            Ok(ev) => ev,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                debug!(skipped, "announcer lagged behind the hub");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };

        let messages = match &event {
            SinkEvent::TopInfluencers(set) => tracker.observe(RankingScope::All, set),
            SinkEvent::TopFilteredInfluencers(set) => tracker.observe(RankingScope::Filtered, set),
            _ => continue,
        };
        for message in messages {
            info!(%message, "announcing new leader");
            if let Err(e) = announcer.post(&message).await {
                warn!(error = %e, "announcement failed");
            }
        }
    }
}
