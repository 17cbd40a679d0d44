//! Configuration values handed to components at construction.
//!
//! Everything here is plain data; loading from disk or the environment is left to binaries.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::TtlPolicy;
use crate::stations::StationMeta;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZrakConfig {
    /// Freshness windows and reclamation.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Comparison fan-out limits.
    #[serde(default)]
    pub compare: CompareConfig,

    /// Upstream feed settings.
    #[serde(default)]
    pub upstream: UpstreamConfig,

    /// City-to-station table.
    #[serde(default = "default_cities")]
    pub cities: Vec<StationMeta>,
}

impl Default for ZrakConfig {
    fn default() -> Self {
        Self {
            cache: CacheConfig::default(),
            compare: CompareConfig::default(),
            upstream: UpstreamConfig::default(),
            cities: default_cities(),
        }
    }
}

/// Cache freshness settings (seconds).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// TTL for live readings.
    #[serde(default = "default_live_ttl")]
    pub live_ttl_secs: u64,

    /// TTL for forecasts.
    #[serde(default = "default_forecast_ttl")]
    pub forecast_ttl_secs: u64,

    /// Interval between background reclamation passes.
    #[serde(default = "default_reclaim_interval")]
    pub reclaim_interval_secs: u64,
}

impl CacheConfig {
    /// TTLs per data class.
    #[must_use]
    pub fn ttl_policy(&self) -> TtlPolicy {
        TtlPolicy {
            live: Duration::from_secs(self.live_ttl_secs),
            forecast: Duration::from_secs(self.forecast_ttl_secs),
        }
    }

    /// Reclamation interval as a [`Duration`].
    #[must_use]
    pub fn reclaim_interval(&self) -> Duration {
        Duration::from_secs(self.reclaim_interval_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            live_ttl_secs: default_live_ttl(),
            forecast_ttl_secs: default_forecast_ttl(),
            reclaim_interval_secs: default_reclaim_interval(),
        }
    }
}

/// Comparison settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompareConfig {
    /// Maximum number of per-city fetches in flight at once.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

impl Default for CompareConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
        }
    }
}

/// Upstream feed settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Base URL of the feed API.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// API token; usually injected from the environment.
    #[serde(default)]
    pub token: String,

    /// Per-request timeout.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl UpstreamConfig {
    /// Request timeout as a [`Duration`].
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            token: String::new(),
            timeout_secs: default_timeout(),
        }
    }
}

fn default_live_ttl() -> u64 {
    30 * 60
}

fn default_forecast_ttl() -> u64 {
    6 * 60 * 60
}

fn default_reclaim_interval() -> u64 {
    5 * 60
}

fn default_max_concurrency() -> usize {
    8
}

fn default_base_url() -> String {
    "https://api.waqi.info".to_owned()
}

fn default_timeout() -> u64 {
    10
}

fn default_cities() -> Vec<StationMeta> {
    [
        ("sarajevo", "Sarajevo"),
        ("tuzla", "Tuzla"),
        ("zenica", "Zenica"),
        ("mostar", "Mostar"),
        ("banja-luka", "Banja Luka"),
    ]
    .into_iter()
    .map(|(station, name)| StationMeta::new(name, station))
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_use_short_live_and_long_forecast_ttl() {
        let config = ZrakConfig::default();
        let policy = config.cache.ttl_policy();
        assert_eq!(policy.live, Duration::from_secs(1800));
        assert_eq!(policy.forecast, Duration::from_secs(21_600));
        assert!(policy.live < policy.forecast);
    }

    #[test]
    fn default_city_table_is_populated() {
        let config: ZrakConfig = serde_json::from_str("{}").expect("empty object parses");
        assert!(!config.cities.is_empty());
        assert_eq!(config.compare.max_concurrency, 8);
    }
}
