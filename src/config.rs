// src/config.rs
//! Service configuration: one TOML file, per-section defaults. A missing
//! file or section falls back to the built-in defaults; an explicit
//! `SIGNALS_CONFIG_PATH` that points nowhere is an error, because a deploy
//! that names a config file expects it to be read.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};

use crate::scoring::ScoringConfig;
use crate::signals::aggregator::HubConfig;
use crate::signals::breaker::BreakerConfig;

const ENV_PATH: &str = "SIGNALS_CONFIG_PATH";
const DEFAULT_PATH: &str = "config/signals.toml";

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub server: ServerConfig,
    pub aggregator: AggregatorConfig,
    pub breaker: BreakerConfig,
    pub scoring: ScoringConfig,
    pub sources: SourcesConfig,
}

impl EngineConfig {
    /// Aggregator-facing view: second-granularity TTLs become the
    /// millisecond values the hub works in.
    pub fn hub_config(&self) -> HubConfig {
        HubConfig {
            breaker: self.breaker.clone(),
            fresh_ttl_ms: self.aggregator.fresh_ttl_secs.saturating_mul(1000),
            serve_stale_ms: self.aggregator.serve_stale_secs.saturating_mul(1000),
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    /// Snapshot age beyond which a cache fallback is labeled stale.
    pub fresh_ttl_secs: u64,
    /// Snapshot age beyond which the cache is not served at all.
    pub serve_stale_secs: u64,
    /// Background refresh cadence.
    pub refresh_interval_secs: u64,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            fresh_ttl_secs: 60,
            serve_stale_secs: 86_400,
            refresh_interval_secs: 30,
        }
    }
}

/// Upstream endpoints for the production adapter set. The odds feed points
/// at the platform backend; fear/greed and funding default to their public
/// upstreams.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    pub prediction_odds_url: String,
    pub prediction_odds_timeout_ms: u64,
    pub fear_greed_url: String,
    pub fear_greed_timeout_ms: u64,
    pub funding_url: String,
    pub funding_timeout_ms: u64,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            prediction_odds_url: "http://127.0.0.1:3000/api/markets/odds".to_string(),
            prediction_odds_timeout_ms: 2_000,
            fear_greed_url: "https://api.alternative.me/fng/?limit=1".to_string(),
            fear_greed_timeout_ms: 2_000,
            funding_url: "https://fapi.binance.com/fapi/v1/premiumIndex".to_string(),
            funding_timeout_ms: 2_000,
        }
    }
}

/// Load config from an explicit path.
pub fn load_config_from(path: &Path) -> Result<EngineConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading config from {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("parsing config from {}", path.display()))
}

/// Load config using env var + fallbacks:
/// 1) $SIGNALS_CONFIG_PATH
/// 2) config/signals.toml
/// 3) built-in defaults (logged, not an error)
pub fn load_config_default() -> Result<EngineConfig> {
    if let Ok(p) = std::env::var(ENV_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return load_config_from(&pb);
        }
        return Err(anyhow!("SIGNALS_CONFIG_PATH points to non-existent path"));
    }
    let default_p = PathBuf::from(DEFAULT_PATH);
    if default_p.exists() {
        return load_config_from(&default_p);
    }
    tracing::warn!(target: "config", "no config file found, using built-in defaults");
    Ok(EngineConfig::default())
}
