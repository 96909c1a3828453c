use anyhow::{Context, Result};
use async_trait::async_trait;
use metrics::{counter, histogram};
use serde::Deserialize;

use crate::signals::types::{SignalItem, SignalKind, SignalSource};

pub const SOURCE_NAME: &str = "funding-rates";

// Exchange-style premium index row; rates arrive as decimal strings.
#[derive(Debug, Deserialize)]
struct PremiumIndex {
    symbol: Option<String>,
    #[serde(rename = "lastFundingRate")]
    last_funding_rate: Option<String>,
    time: Option<u64>, // unix ms
}

/// Perpetual funding rates, one item per symbol. Values are signed rates
/// (e.g. 0.0001 = 1bp per interval), not normalized to [0,1].
pub struct FundingRatesSource {
    mode: Mode,
    timeout_ms: u64,
}

enum Mode {
    Fixture(String),
    Http { url: String, client: reqwest::Client },
}

impl FundingRatesSource {
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
        let rows: Vec<PremiumIndex> = serde_json::from_str(s).context("parsing funding json")?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let Some(symbol) = row.symbol else { continue };
            let Some(rate) = row
                .last_funding_rate
                .as_deref()
                .and_then(|r| r.trim().parse::<f64>().ok())
            else {
                continue;
            };
            if !rate.is_finite() {
                continue;
            }
            out.push(SignalItem {
                source: SOURCE_NAME.to_string(),
                kind: SignalKind::Funding,
                key: symbol.to_ascii_lowercase(),
                label: format!("{symbol} funding"),
                value: rate,
                observed_at: row.time.map(|ms| ms / 1_000).unwrap_or(0),
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
impl SignalSource for FundingRatesSource {
    async fn fetch(&self) -> Result<Vec<SignalItem>> {
        match &self.mode {
            Mode::Fixture(s) => Self::parse_items_from_str(s),
            Mode::Http { url, client } => {
                let body = client
                    .get(url)
                    .send()
                    .await
                    .context("funding http get()")?
                    .error_for_status()
                    .context("funding non-2xx")?
                    .text()
                    .await
                    .context("funding http .text()")?;
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
