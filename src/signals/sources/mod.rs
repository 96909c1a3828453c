//! Concrete signal source adapters. Each supports an HTTP mode for live
//! operation and a fixture mode (embedded JSON) for tests and offline runs,
//! and parses defensively: malformed entries are skipped, not fatal.

pub mod fear_greed;
pub mod funding;
pub mod prediction_odds;

pub use fear_greed::FearGreedSource;
pub use funding::FundingRatesSource;
pub use prediction_odds::PredictionOddsSource;

use std::sync::Arc;

use crate::config::SourcesConfig;
use crate::signals::types::SignalSource;

/// Wire up the production adapter set from config, in registration order:
/// odds, fear/greed, funding. Merge order follows this order.
pub fn build_sources(cfg: &SourcesConfig) -> Vec<Arc<dyn SignalSource>> {
    vec![
        Arc::new(PredictionOddsSource::from_url(
            cfg.prediction_odds_url.clone(),
            cfg.prediction_odds_timeout_ms,
        )),
        Arc::new(FearGreedSource::from_url(
            cfg.fear_greed_url.clone(),
            cfg.fear_greed_timeout_ms,
        )),
        Arc::new(FundingRatesSource::from_url(
            cfg.funding_url.clone(),
            cfg.funding_timeout_ms,
        )),
    ]
}
