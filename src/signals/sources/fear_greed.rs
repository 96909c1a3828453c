use anyhow::{Context, Result};
use async_trait::async_trait;
use metrics::{counter, histogram};
use serde::Deserialize;

use crate::signals::types::{SignalItem, SignalKind, SignalSource};

pub const SOURCE_NAME: &str = "fear-greed";

// The upstream serves numbers as strings ("value": "54"); parse accordingly.
#[derive(Debug, Deserialize)]
struct Feed {
    data: Vec<Entry>,
}

#[derive(Debug, Deserialize)]
struct Entry {
    value: Option<String>,
    value_classification: Option<String>,
    timestamp: Option<String>,
}

/// Market-wide fear/greed index, one item per fetch (latest reading).
pub struct FearGreedSource {
    mode: Mode,
    timeout_ms: u64,
}

enum Mode {
    Fixture(String),
    Http { url: String, client: reqwest::Client },
}

impl FearGreedSource {
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
        let feed: Feed = serde_json::from_str(s).context("parsing fear/greed json")?;

        let mut out = Vec::new();
        if let Some(entry) = feed.data.first() {
            let raw = entry.value.as_deref().unwrap_or_default();
            if let Ok(index) = raw.trim().parse::<f64>() {
                out.push(SignalItem {
                    source: SOURCE_NAME.to_string(),
                    kind: SignalKind::Sentiment,
                    key: "fear-greed-index".to_string(),
                    label: entry
                        .value_classification
                        .clone()
                        .unwrap_or_else(|| "Unknown".to_string()),
                    value: (index / 100.0).clamp(0.0, 1.0),
                    observed_at: entry
                        .timestamp
                        .as_deref()
                        .and_then(|t| t.trim().parse::<u64>().ok())
                        .unwrap_or(0),
                });
            }
        }

        let ms = t0.elapsed().as_secs_f64() * 1_000.0;
        histogram!("signal_parse_ms", "source" => SOURCE_NAME).record(ms);
        counter!("signal_items_parsed_total", "source" => SOURCE_NAME)
            .increment(out.len() as u64);
        Ok(out)
    }
}

#[async_trait]
impl SignalSource for FearGreedSource {
    async fn fetch(&self) -> Result<Vec<SignalItem>> {
        match &self.mode {
            Mode::Fixture(s) => Self::parse_items_from_str(s),
            Mode::Http { url, client } => {
                let body = client
                    .get(url)
                    .send()
                    .await
                    .context("fear/greed http get()")?
                    .error_for_status()
                    .context("fear/greed non-2xx")?
                    .text()
                    .await
                    .context("fear/greed http .text()")?;
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

    const FIXTURE: &str = include_str!("../../../tests/fixtures/fear_greed.json");

    #[tokio::test]
    async fn fixture_yields_one_normalized_reading() {
        let src = FearGreedSource::from_fixture(FIXTURE);
        let items = src.fetch().await.expect("fixture parses");
        assert_eq!(items.len(), 1);
        let it = &items[0];
        assert_eq!(it.key, "fear-greed-index");
        assert_eq!(it.label, "Neutral");
        assert!((it.value - 0.54).abs() < 1e-12, "54/100 normalized");
        assert_eq!(it.observed_at, 1_700_000_000);
    }

    #[test]
    fn unparseable_value_yields_no_items() {
        let raw = r#"{"data":[{"value":"n/a","value_classification":"?","timestamp":"1"}]}"#;
        let items = FearGreedSource::parse_items_from_str(raw).expect("feed shape ok");
        assert!(items.is_empty());
    }

    #[test]
    fn empty_feed_is_fine() {
        let items = FearGreedSource::parse_items_from_str(r#"{"data":[]}"#).expect("parses");
        assert!(items.is_empty());
    }
}
