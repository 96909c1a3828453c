// src/scoring/mod.rs
pub mod calibration;
pub mod composite;
pub mod sentinel;

pub use calibration::{evaluate_calibration, CalibrationResult, CalibrationStatus, MaturedPrediction};
pub use composite::{
    compute_score, score_creator_day, ComponentViolation, CreatorDayInputs, DailyAccuracy,
    ScoreComponents, ScoreWeights,
};
pub use sentinel::{validate_in_batches, validate_records, SentinelReport, Violation, ViolationKind};

use once_cell::sync::OnceCell;

static METRICS_DESCRIBED: OnceCell<()> = OnceCell::new();

/// Register metric descriptions once per process.
pub(crate) fn ensure_metrics_described() {
    METRICS_DESCRIBED.get_or_init(|| {
        metrics::describe_counter!(
            "scoring_rejections_total",
            "Creator-day scoring requests rejected for out-of-range inputs"
        );
        metrics::describe_counter!(
            "sentinel_records_checked_total",
            "Creator-day records swept by the data-quality sentinel"
        );
        metrics::describe_counter!(
            "sentinel_violations_total",
            "Data-quality violations flagged by the sentinel"
        );
    });
}

/// Scoring tunables, loaded from `[scoring]` in the service config and
/// reloadable at runtime via the admin endpoint.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub weights: ScoreWeights,
    /// Notional (in quote units) that maps to a volume score of 1.0.
    pub volume_norm: f64,
    /// Half-life of the recency decay, in days.
    pub half_life_days: f64,
    /// Below this matured-sample count a score is labeled provisional.
    pub min_matured_n: i64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            weights: ScoreWeights::default(),
            volume_norm: 1_000_000.0,
            half_life_days: 14.0,
            min_matured_n: 10,
        }
    }
}

/// One creator-day scoring record, the shape persisted by the database
/// collaborator and validated by the sentinel. Immutable once written; the
/// next epoch supersedes it.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatorDaily {
    pub creator_id: String,
    pub day: String, // YYYY-MM-DD
    pub score: f64,
    pub accuracy: f64,
    pub consistency: f64,
    pub volume_score: f64,
    pub recency_score: f64,
    pub matured_n: i64,
    pub brier_mean: f64,
    pub notional_30d: f64,
    pub ret_std_30d: f64,
    /// Too few matured samples to trust; shown to consumers, never hidden.
    pub provisional: bool,
}
