//! # Composite Scoring
//!
//! `ScoreComponents` jsou čtyři normalizované signály v [0,1]:
//! - `accuracy`      : kvalita predikcí (1 − brierMean)
//! - `consistency`   : stabilita výnosů (1 / (1 + retStd30d))
//! - `volume_score`  : log-normalizovaný objem
//! - `recency_score` : exponenciálně vážená čerstvost
//!
//! Composite = w_acc*accuracy + w_con*consistency + w_vol*volume + w_rec*recency
//! (normalizace váhami a clamp do [0,1] je součástí výpočtu).
//!
//! Inputs out of `[0,1]` beyond [`TOLERANCE`] are rejected with the field
//! name, never silently clamped; drift within the tolerance is clamped.

use super::{CreatorDaily, ScoringConfig};

/// Floating drift allowance on component ranges. Beyond it, a violation.
pub const TOLERANCE: f64 = 1e-6;

/// Normalized inputs in [0,1]. Keep it small and clear.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreComponents {
    pub accuracy: f64,
    pub consistency: f64,
    pub volume_score: f64,
    pub recency_score: f64,
}

/// Component weights; the reference weighting sums to 1.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    pub accuracy: f64,
    pub consistency: f64,
    pub volume: f64,
    pub recency: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            accuracy: 0.4,
            consistency: 0.3,
            volume: 0.2,
            recency: 0.1,
        }
    }
}

/// A component (or raw pipeline input) outside its valid range. Carries the
/// wire-facing field name for operator triage.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentViolation {
    pub field: &'static str,
    pub observed: f64,
}

impl std::fmt::Display for ComponentViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "component {} out of range: {}", self.field, self.observed)
    }
}

impl std::error::Error for ComponentViolation {}

/// Range-check one component: reject beyond tolerance, clamp the drift.
fn checked(field: &'static str, x: f64) -> Result<f64, ComponentViolation> {
    if !x.is_finite() || x < -TOLERANCE || x > 1.0 + TOLERANCE {
        return Err(ComponentViolation { field, observed: x });
    }
    Ok(x.clamp(0.0, 1.0))
}

/// Weighted composite score in [0,1].
pub fn compute_score(
    c: &ScoreComponents,
    w: &ScoreWeights,
) -> Result<f64, ComponentViolation> {
    let accuracy = checked("accuracy", c.accuracy)?;
    let consistency = checked("consistency", c.consistency)?;
    let volume = checked("volumeScore", c.volume_score)?;
    let recency = checked("recencyScore", c.recency_score)?;

    let raw =
        accuracy * w.accuracy + consistency * w.consistency + volume * w.volume + recency * w.recency;

    // Light normalization: divide by sum of weights if > 0, then clamp.
    let denom = (w.accuracy + w.consistency + w.volume + w.recency).max(1e-6);
    Ok((raw / denom).clamp(0.0, 1.0))
}

/// `accuracy = 1 − brierMean`, clamped to [0,1].
pub fn accuracy_from_brier(brier_mean: f64) -> f64 {
    (1.0 - brier_mean).clamp(0.0, 1.0)
}

/// `consistency = 1 / (1 + returnStdDev30d)`; volatility below zero is
/// treated as zero (corrupt inputs are the sentinel's job to flag).
pub fn consistency_from_volatility(ret_std_30d: f64) -> f64 {
    1.0 / (1.0 + ret_std_30d.max(0.0))
}

/// `volumeScore = log(1+notional) / log(1+volume_norm)`, clamped to [0,1].
pub fn volume_score(notional_30d: f64, volume_norm: f64) -> f64 {
    let denom = (1.0 + volume_norm.max(1.0)).ln();
    ((1.0 + notional_30d.max(0.0)).ln() / denom).clamp(0.0, 1.0)
}

/// One trailing-window accuracy observation for the recency decay.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyAccuracy {
    pub days_ago: f64,
    pub accuracy: f64,
}

/// Exponentially decayed accuracy over a trailing window with
/// `weight = exp(−k · daysAgo)`, `k = ln(2) / half_life_days`. Weights are
/// normalized by their sum so the result stays in [0,1]; an empty window
/// scores 0.
pub fn recency_score(daily: &[DailyAccuracy], half_life_days: f64) -> f64 {
    let k = std::f64::consts::LN_2 / half_life_days.max(f64::EPSILON);
    let mut weighted = 0.0;
    let mut weight_sum = 0.0;
    for d in daily {
        if !d.accuracy.is_finite() || !d.days_ago.is_finite() {
            continue;
        }
        let w = (-k * d.days_ago.max(0.0)).exp();
        weighted += w * d.accuracy.clamp(0.0, 1.0);
        weight_sum += w;
    }
    if weight_sum <= 0.0 {
        return 0.0;
    }
    (weighted / weight_sum).clamp(0.0, 1.0)
}

/// Raw inputs for one creator-day, as handed over by the persistence
/// collaborator.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatorDayInputs {
    pub creator_id: String,
    pub day: String,
    pub brier_mean: f64,
    pub ret_std_30d: f64,
    pub notional_30d: f64,
    pub matured_n: i64,
    #[serde(default)]
    pub recent_daily_accuracy: Vec<DailyAccuracy>,
}

/// Full pipeline for one creator-day: derive sub-scores, compose, label
/// provisional scores. Raw inputs outside their domains are rejected with
/// the offending field, not patched up.
pub fn score_creator_day(
    inp: &CreatorDayInputs,
    cfg: &ScoringConfig,
) -> Result<CreatorDaily, ComponentViolation> {
    if !inp.brier_mean.is_finite() || inp.brier_mean < -TOLERANCE || inp.brier_mean > 1.0 + TOLERANCE
    {
        return Err(ComponentViolation {
            field: "brierMean",
            observed: inp.brier_mean,
        });
    }
    if !inp.notional_30d.is_finite() || inp.notional_30d < -TOLERANCE {
        return Err(ComponentViolation {
            field: "notional30d",
            observed: inp.notional_30d,
        });
    }
    if !inp.ret_std_30d.is_finite() || inp.ret_std_30d < -TOLERANCE {
        return Err(ComponentViolation {
            field: "retStd30d",
            observed: inp.ret_std_30d,
        });
    }
    if inp.matured_n < 0 {
        return Err(ComponentViolation {
            field: "maturedN",
            observed: inp.matured_n as f64,
        });
    }

    let components = ScoreComponents {
        accuracy: accuracy_from_brier(inp.brier_mean),
        consistency: consistency_from_volatility(inp.ret_std_30d),
        volume_score: volume_score(inp.notional_30d, cfg.volume_norm),
        recency_score: recency_score(&inp.recent_daily_accuracy, cfg.half_life_days),
    };
    let score = compute_score(&components, &cfg.weights)?;

    Ok(CreatorDaily {
        creator_id: inp.creator_id.clone(),
        day: inp.day.clone(),
        score,
        accuracy: components.accuracy,
        consistency: components.consistency,
        volume_score: components.volume_score,
        recency_score: components.recency_score,
        matured_n: inp.matured_n,
        brier_mean: inp.brier_mean,
        notional_30d: inp.notional_30d,
        ret_std_30d: inp.ret_std_30d,
        provisional: inp.matured_n < cfg.min_matured_n,
    })
}
