use anyhow::{Context, Result};
use async_trait::async_trait;
use metrics::{counter, histogram};
use serde::Deserialize;

use crate::signals::types::{SignalItem, SignalKind, SignalSource};

pub const SOURCE_NAME: &str = "prediction-odds";

/// Upstream market row. Defensive: every field optional, bad rows skipped.
#[derive(Debug, Deserialize)]
struct Market {
    slug: Option<String>,
    question: Option<String>,
    probability: Option<f64>,
    #[serde(rename = "updatedAt")]
    updated_at: Option<u64>,
}

/// Prediction-market implied probabilities, one item per market.
pub struct PredictionOddsSource {
    mode: Mode,
    timeout_ms: u64,
}

enum Mode {
    Fixture(String),
    Http { url: String, client: reqwest::Client },
}

impl PredictionOddsSource {
    pub fn from_fixture(s: &str) -> Self {
        Self {
            mode: Mode::Fixture(s.to_string()),
            timeout_ms: crate::signals::types::DEFAULT_FETCH_TIMEOUT_MS,
        }
    }

    pub fn from_url(url: String, timeout_ms: u64) -> Self {
        Self {
            mode: Mode::Http {
                url,
                client: reqwest::Client::new(),
            },
            timeout_ms,
        }
    }

    fn parse_items_from_str(s: &str) -> Result<Vec<SignalItem>> {
        let t0 = std::time::Instant::now();
        let markets: Vec<Market> = serde_json::from_str(s).context("parsing odds json")?;

        let mut out = Vec::with_capacity(markets.len());
        for m in markets {
            let (Some(slug), Some(p)) = (m.slug, m.probability) else {
                continue;
            };
            if !p.is_finite() {
                continue;
            }
            out.push(SignalItem {
                source: SOURCE_NAME.to_string(),
                kind: SignalKind::Odds,
                key: slug,
                label: m.question.unwrap_or_default(),
                value: p.clamp(0.0, 1.0),
                observed_at: m.updated_at.unwrap_or(0),
            });
        }

        let ms = t0.elapsed().as_secs_f64() * 1_000.0;
        histogram!("signal_parse_ms", "source" => SOURCE_NAME).record(ms);
        counter!("signal_items_parsed_total", "source" => SOURCE_NAME)
            .increment(out.len() as u64);
        Ok(out)
    }
}

#[async_trait]
impl SignalSource for PredictionOddsSource {
    async fn fetch(&self) -> Result<Vec<SignalItem>> {
        match &self.mode {
            Mode::Fixture(s) => Self::parse_items_from_str(s),
            Mode::Http { url, client } => {
                let body = client
                    .get(url)
                    .send()
                    .await
                    .context("odds http get()")?
                    .error_for_status()
                    .context("odds non-2xx")?
                    .text()
                    .await
                    .context("odds http .text()")?;
                Self::parse_items_from_str(&body)
            }
        }
    }

    fn name(&self) -> &'static str {
        SOURCE_NAME
    }

    fn timeout_ms(&self) -> u64 {
        self.timeout_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = include_str!("../../../tests/fixtures/prediction_odds.json");

    #[tokio::test]
    async fn fixture_parses_valid_markets_and_skips_broken_rows() {
        let src = PredictionOddsSource::from_fixture(FIXTURE);
        let items = src.fetch().await.expect("fixture parses");
        assert_eq!(items.len(), 3, "one row lacks a slug, one a probability");
        assert_eq!(items[0].key, "fed-cut-march");
        assert_eq!(items[0].kind, SignalKind::Odds);
        assert!((items[0].value - 0.62).abs() < 1e-12);
        assert!(items.iter().all(|it| it.source == SOURCE_NAME));
    }

    #[test]
    fn out_of_range_probability_is_clamped() {
        let raw = r#"[{"slug":"x","question":"q","probability":1.7,"updatedAt":1}]"#;
        let items = PredictionOddsSource::parse_items_from_str(raw).expect("parses");
        assert_eq!(items[0].value, 1.0);
    }

    #[test]
    fn garbage_body_is_an_error_not_a_panic() {
        assert!(PredictionOddsSource::parse_items_from_str("<html>").is_err());
    }
}
