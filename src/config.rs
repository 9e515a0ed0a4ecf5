//! # Configuration
//!
//! Analytics settings load from TOML (env-pointed path with a conventional
//! fallback), with serde defaults so a partial file works. The influencer
//! allow-list lives in its own file and supports TOML or JSON, since both
//! formats exist in the wild.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use tracing::warn;

use crate::analytics::deviation::DeviationMode;
use crate::domain::{Identity, LocationSet};

pub const ENV_CONFIG_PATH: &str = "ANALYTICS_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "config/analytics.toml";

const ENV_ALLOW_LIST_PATH: &str = "INFLUENCER_ALLOWLIST_PATH";

#[derive(Debug, Clone, Deserialize)]
pub struct AnalyticsConfig {
    /// The known region set. Records outside it are dropped, not grouped.
    #[serde(default = "default_locations")]
    pub locations: Vec<String>,
    /// Processing lag for growth/deviation windows, minutes.
    #[serde(default = "default_lag_minutes")]
    pub lag_minutes: i64,
    /// Processing lag for ranking windows, minutes. The source system gave
    /// rankings a larger lag than the hourly metrics.
    #[serde(default = "default_ranking_lag_minutes")]
    pub ranking_lag_minutes: i64,
    #[serde(default = "default_min_cycle_interval_secs")]
    pub min_cycle_interval_secs: u64,
    /// Per-store-call timeout, seconds.
    #[serde(default = "default_store_timeout_secs")]
    pub store_timeout_secs: u64,
    /// Limit for the single global ranking call.
    #[serde(default = "default_global_ranking_limit")]
    pub global_ranking_limit: usize,
    /// Limit for per-location ranking calls.
    #[serde(default = "default_location_ranking_limit")]
    pub location_ranking_limit: usize,
    #[serde(default)]
    pub deviation_mode: DeviationMode,
    #[serde(default = "default_poll_lookback_days")]
    pub poll_lookback_days: i64,
    /// Path to the allow-list file; resolved into `allow_list` on load.
    #[serde(default)]
    pub allow_list_path: Option<PathBuf>,
    #[serde(skip)]
    pub allow_list: Option<BTreeSet<Identity>>,
}

fn default_locations() -> Vec<String> {
    ["Amsterdam", "Berlin", "Paris"]
        .map(String::from)
        .to_vec()
}
fn default_lag_minutes() -> i64 {
    60
}
fn default_ranking_lag_minutes() -> i64 {
    120
}
fn default_min_cycle_interval_secs() -> u64 {
    30
}
fn default_store_timeout_secs() -> u64 {
    30
}
fn default_global_ranking_limit() -> usize {
    100
}
fn default_location_ranking_limit() -> usize {
    10
}
fn default_poll_lookback_days() -> i64 {
    14
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            locations: default_locations(),
            lag_minutes: default_lag_minutes(),
            ranking_lag_minutes: default_ranking_lag_minutes(),
            min_cycle_interval_secs: default_min_cycle_interval_secs(),
            store_timeout_secs: default_store_timeout_secs(),
            global_ranking_limit: default_global_ranking_limit(),
            location_ranking_limit: default_location_ranking_limit(),
            deviation_mode: DeviationMode::default(),
            poll_lookback_days: default_poll_lookback_days(),
            allow_list_path: None,
            allow_list: None,
        }
    }
}

impl AnalyticsConfig {
    /// Load using env var + fallbacks:
    /// 1) $ANALYTICS_CONFIG_PATH
    /// 2) config/analytics.toml
    /// 3) built-in defaults
    /// Then resolve the allow-list ($INFLUENCER_ALLOWLIST_PATH wins over the
    /// configured path; a missing list just disables the filtered ranking).
    pub fn load() -> Result<Self> {
        let mut cfg = if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            Self::from_toml(Path::new(&p))?
        } else {
            let default = PathBuf::from(DEFAULT_CONFIG_PATH);
            if default.exists() {
                Self::from_toml(&default)?
            } else {
                Self::default()
            }
        };

        let allow_path = std::env::var(ENV_ALLOW_LIST_PATH)
            .map(PathBuf::from)
            .ok()
            .or_else(|| cfg.allow_list_path.clone());
        if let Some(path) = allow_path {
            match load_allow_list(&path) {
                Ok(list) if list.is_empty() => {
                    warn!(path = %path.display(), "allow-list file is empty; filtered ranking disabled")
                }
                Ok(list) => cfg.allow_list = Some(list),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "allow-list not loaded; filtered ranking disabled")
                }
            }
        }
        Ok(cfg)
    }

    pub fn from_toml(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn location_set(&self) -> LocationSet {
        LocationSet::new(self.locations.iter().cloned())
    }

    pub fn lag(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.lag_minutes)
    }

    pub fn ranking_lag(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.ranking_lag_minutes)
    }

    pub fn min_cycle_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.min_cycle_interval_secs)
    }

    pub fn store_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.store_timeout_secs)
    }
}

/// Load an identity allow-list from TOML (`identities = [...]`) or a JSON
/// array. Invalid handles are dropped.
pub fn load_allow_list(path: &Path) -> Result<BTreeSet<Identity>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading allow-list from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();

    let raw: Vec<String> = match ext.as_str() {
        "json" => parse_json(&content)?,
        "toml" => parse_toml(&content)?,
        _ => parse_toml(&content).or_else(|_| parse_json(&content))?,
    };
    Ok(raw.iter().filter_map(|s| Identity::parse(s)).collect())
}

fn parse_toml(s: &str) -> Result<Vec<String>> {
    #[derive(Deserialize)]
    struct AllowListFile {
        identities: Vec<String>,
    }
    let file: AllowListFile = toml::from_str(s).context("allow-list TOML")?;
    Ok(file.identities)
}

fn parse_json(s: &str) -> Result<Vec<String>> {
    let v: serde_json::Value = serde_json::from_str(s).context("allow-list JSON")?;
    match v {
        serde_json::Value::Array(items) => Ok(items
            .into_iter()
            .filter_map(|i| i.as_str().map(String::from))
            .collect()),
        _ => Err(anyhow!("allow-list JSON must be an array of strings")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_fills_defaults() {
        let cfg: AnalyticsConfig =
            toml::from_str("locations = [\"Amsterdam\"]\nlag_minutes = 90").unwrap();
        assert_eq!(cfg.locations, ["Amsterdam"]);
        assert_eq!(cfg.lag_minutes, 90);
        assert_eq!(cfg.min_cycle_interval_secs, 30);
        assert_eq!(cfg.global_ranking_limit, 100);
        assert_eq!(cfg.deviation_mode, DeviationMode::TimeOfDayBand);
    }

    #[test]
    fn allow_list_parses_both_formats() {
        let toml_ids = parse_toml("identities = [\"@markrutte\", \"ncilla\"]").unwrap();
        assert_eq!(toml_ids.len(), 2);

        let json_ids = parse_json("[\"markrutte\", \"ncilla\"]").unwrap();
        assert_eq!(json_ids.len(), 2);

        assert!(parse_json("{\"identities\": []}").is_err());
    }
}
