// src/signals/types.rs
use anyhow::Result;

/// Default hard timeout for one adapter call, overridable per source.
pub const DEFAULT_FETCH_TIMEOUT_MS: u64 = 2_000;

/// Signal category carried by an item, one per adapter family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalKind {
    Odds,
    Sentiment,
    Funding,
}

/// One merged signal datum. `(source, key)` identifies it within a pass.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SignalItem {
    pub source: String, // e.g., "prediction-odds", "fear-greed"
    pub kind: SignalKind,
    pub key: String,   // market slug, symbol, index name
    pub label: String, // human-readable description
    pub value: f64,    // normalized signal value (probability, index/100, rate)
    pub observed_at: u64, // unix seconds
}

/// Outcome of one adapter invocation. Expected failures are values here,
/// never errors thrown across the aggregator boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Success(Vec<SignalItem>),
    Failure(String),
    TimedOut,
}

impl FetchOutcome {
    pub fn ok(&self) -> bool {
        matches!(self, FetchOutcome::Success(_))
    }

    pub fn timed_out(&self) -> bool {
        matches!(self, FetchOutcome::TimedOut)
    }
}

/// One adapter invocation with attribution and timing. Ephemeral; created per
/// call and discarded after the merge.
#[derive(Debug, Clone)]
pub struct SourceResult {
    pub source_name: String,
    pub outcome: FetchOutcome,
    pub elapsed_ms: u64,
}

impl SourceResult {
    pub fn items(&self) -> &[SignalItem] {
        match &self.outcome {
            FetchOutcome::Success(items) => items,
            _ => &[],
        }
    }
}

/// Unified snapshot served to consumers, fresh or from the stale cache.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub items: Vec<SignalItem>,
    pub sources_ok: Vec<String>,
    pub sources_skipped: Vec<String>,
    /// Unix ms of the aggregation pass that produced `items`.
    pub fetched_at: u64,
    pub age_ms: u64,
    pub is_stale: bool,
    pub served_from_cache: bool,
}

impl Snapshot {
    /// Valid-but-empty snapshot for the nothing-available case.
    pub fn empty(now_ms: u64, skipped: Vec<String>) -> Self {
        Self {
            items: Vec::new(),
            sources_ok: Vec::new(),
            sources_skipped: skipped,
            fetched_at: now_ms,
            age_ms: 0,
            is_stale: false,
            served_from_cache: false,
        }
    }
}

#[async_trait::async_trait]
pub trait SignalSource: Send + Sync {
    async fn fetch(&self) -> Result<Vec<SignalItem>>;
    fn name(&self) -> &'static str;
    fn timeout_ms(&self) -> u64 {
        DEFAULT_FETCH_TIMEOUT_MS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_projections_match_variants() {
        let ok = FetchOutcome::Success(vec![]);
        assert!(ok.ok());
        assert!(!ok.timed_out());

        let fail = FetchOutcome::Failure("http 500".into());
        assert!(!fail.ok());
        assert!(!fail.timed_out());

        let to = FetchOutcome::TimedOut;
        assert!(!to.ok());
        assert!(to.timed_out());
    }

    #[test]
    fn snapshot_serializes_camel_case() {
        let snap = Snapshot::empty(1_000, vec!["fear-greed".into()]);
        let json = serde_json::to_value(&snap).expect("serialize");
        assert!(json.get("fetchedAt").is_some(), "expected camelCase keys");
        assert!(json.get("sourcesSkipped").is_some());
        assert!(json.get("isStale").is_some());
        assert_eq!(json["servedFromCache"], serde_json::json!(false));
    }

    #[test]
    fn item_round_trips_with_wire_names() {
        let item = SignalItem {
            source: "prediction-odds".into(),
            kind: SignalKind::Odds,
            key: "fed-cut-march".into(),
            label: "Fed cuts rates in March".into(),
            value: 0.62,
            observed_at: 1_700_000_000,
        };
        let json = serde_json::to_string(&item).expect("serialize");
        assert!(json.contains("\"observedAt\""));
        let back: SignalItem = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, item);
    }
}
