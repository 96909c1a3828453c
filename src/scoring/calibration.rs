//! Calibration evaluation over matured predictions: a decile reliability
//! table plus a Brier score with a coarse quality label.
//!
//! The evaluator is total: corrupt rows are skipped (and counted), thin
//! samples are labeled instead of extrapolated, and nothing here returns
//! an error.

/// Brier at or below this is well calibrated.
pub const BRIER_GOOD_MAX: f64 = 0.20;
/// Brier at or below this (and above [`BRIER_GOOD_MAX`]) is acceptable.
pub const BRIER_FAIR_MAX: f64 = 0.25;
/// Below this many matured predictions no quality label is assigned.
pub const MIN_SAMPLES: usize = 10;

const BIN_COUNT: usize = 10;
const TOLERANCE: f64 = 1e-6;

/// One matured prediction: the stated probability and what happened.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MaturedPrediction {
    #[serde(rename = "predictedP")]
    pub predicted_p: f64,
    #[serde(rename = "actualOutcome")]
    pub outcome: u8,
}

/// One non-empty decile of the reliability table.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalibrationBin {
    /// Mean stated probability of the predictions in this decile.
    pub predicted_probability: f64,
    /// Fraction of those predictions that resolved true.
    pub hit_rate: f64,
    pub n: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationStatus {
    Good,
    Fair,
    Poor,
    InsufficientData,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalibrationResult {
    /// Non-empty deciles in ascending probability order.
    pub bins: Vec<CalibrationBin>,
    /// Mean squared error of the valid predictions; `None` when there are
    /// none at all.
    pub brier_score: Option<f64>,
    pub status: CalibrationStatus,
    pub sample_count: usize,
    pub skipped_invalid: usize,
}

/// Decile index for a probability in [0,1]; 1.0 belongs to the top decile.
fn bin_index(p: f64) -> usize {
    ((p * BIN_COUNT as f64) as usize).min(BIN_COUNT - 1)
}

/// Build the reliability table and the Brier score for a batch of matured
/// predictions. Rows with a non-finite or out-of-range probability, or an
/// outcome other than 0/1, are excluded and reported in `skipped_invalid`.
pub fn evaluate_calibration(predictions: &[MaturedPrediction]) -> CalibrationResult {
    let mut skipped = 0usize;
    let mut squared_error_sum = 0.0;
    let mut valid = 0usize;

    // Per-decile accumulators: (sum of p, hits, count).
    let mut acc = [(0.0f64, 0usize, 0usize); BIN_COUNT];

    for pred in predictions {
        let p = pred.predicted_p;
        if !p.is_finite() || p < -TOLERANCE || p > 1.0 + TOLERANCE || pred.outcome > 1 {
            skipped += 1;
            continue;
        }
        let p = p.clamp(0.0, 1.0);
        let outcome = f64::from(pred.outcome);

        squared_error_sum += (p - outcome) * (p - outcome);
        valid += 1;

        let slot = &mut acc[bin_index(p)];
        slot.0 += p;
        slot.1 += pred.outcome as usize;
        slot.2 += 1;
    }

    if valid == 0 {
        return CalibrationResult {
            bins: Vec::new(),
            brier_score: None,
            status: CalibrationStatus::InsufficientData,
            sample_count: 0,
            skipped_invalid: skipped,
        };
    }

    let bins = acc
        .iter()
        .filter(|(_, _, n)| *n > 0)
        .map(|(p_sum, hits, n)| CalibrationBin {
            predicted_probability: p_sum / *n as f64,
            hit_rate: *hits as f64 / *n as f64,
            n: *n,
        })
        .collect();

    let brier = squared_error_sum / valid as f64;
    let status = if valid < MIN_SAMPLES {
        CalibrationStatus::InsufficientData
    } else if brier <= BRIER_GOOD_MAX {
        CalibrationStatus::Good
    } else if brier <= BRIER_FAIR_MAX {
        CalibrationStatus::Fair
    } else {
        CalibrationStatus::Poor
    };

    CalibrationResult {
        bins,
        brier_score: Some(brier),
        status,
        sample_count: valid,
        skipped_invalid: skipped,
    }
}
