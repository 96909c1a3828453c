//! Data-quality sentinel over persisted creator-day records.
//!
//! Upstream jobs occasionally persist corrupt rows (components outside
//! [0,1], negative volume, an `accuracy` that no longer matches its
//! `brierMean`). The sentinel sweeps a batch of records and accumulates a
//! structured report for operator triage. It never panics and never cuts
//! the sweep short: one bad record must not hide the rest.

use metrics::counter;
use tokio::time::{sleep, Duration};

use super::CreatorDaily;

/// Floating drift allowance shared with the composite scorer.
const TOLERANCE: f64 = 1e-6;

/// Pause between batches so the sweep stays friendly to whatever shares
/// the box with it.
pub const BATCH_PACING_MS: u64 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    /// A normalized field outside `[0,1]` (or not a number at all).
    Range,
    /// A derived field disagrees with the field it is derived from.
    CalcMismatch,
    /// A count or notional below zero.
    NegativeValue,
}

/// One flagged field on one record, with enough context to find the row.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Violation {
    pub creator_id: String,
    pub day: String,
    pub field: &'static str,
    pub kind: ViolationKind,
    pub observed: f64,
    /// Recomputed value for mismatches; absent for range/negative checks.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected: Option<f64>,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.expected {
            Some(exp) => write!(
                f,
                "{}/{}: {} observed {} expected {}",
                self.creator_id, self.day, self.field, self.observed, exp
            ),
            None => write!(
                f,
                "{}/{}: {} observed {}",
                self.creator_id, self.day, self.field, self.observed
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SentinelReport {
    pub records_checked: usize,
    pub violations: Vec<Violation>,
}

impl SentinelReport {
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }

    fn merge(&mut self, other: SentinelReport) {
        self.records_checked += other.records_checked;
        self.violations.extend(other.violations);
    }
}

/// Validate a batch of records synchronously. Flags are accumulated, never
/// thrown; a clean batch yields an empty violation list.
pub fn validate_records(records: &[CreatorDaily]) -> SentinelReport {
    let mut violations = Vec::new();
    for rec in records {
        check_record(rec, &mut violations);
    }
    SentinelReport {
        records_checked: records.len(),
        violations,
    }
}

fn check_record(rec: &CreatorDaily, out: &mut Vec<Violation>) {
    let unit_fields: [(&'static str, f64); 6] = [
        ("score", rec.score),
        ("accuracy", rec.accuracy),
        ("consistency", rec.consistency),
        ("volumeScore", rec.volume_score),
        ("recencyScore", rec.recency_score),
        ("brierMean", rec.brier_mean),
    ];
    for (field, value) in unit_fields {
        if !in_unit_range(value) {
            out.push(violation(rec, field, ViolationKind::Range, value, None));
        }
    }

    if !rec.notional_30d.is_finite() {
        out.push(violation(
            rec,
            "notional30d",
            ViolationKind::Range,
            rec.notional_30d,
            None,
        ));
    } else if rec.notional_30d < -TOLERANCE {
        out.push(violation(
            rec,
            "notional30d",
            ViolationKind::NegativeValue,
            rec.notional_30d,
            None,
        ));
    }
    if !rec.ret_std_30d.is_finite() || rec.ret_std_30d < -TOLERANCE {
        out.push(violation(
            rec,
            "retStd30d",
            ViolationKind::NegativeValue,
            rec.ret_std_30d,
            None,
        ));
    }
    if rec.matured_n < 0 {
        out.push(violation(
            rec,
            "maturedN",
            ViolationKind::NegativeValue,
            rec.matured_n as f64,
            None,
        ));
    }

    // Derivation check only once both inputs individually passed; a field
    // already flagged for range would otherwise produce a second, noisier
    // flag for the same corruption.
    if in_unit_range(rec.accuracy) && in_unit_range(rec.brier_mean) {
        let expected = (1.0 - rec.brier_mean).clamp(0.0, 1.0);
        if (rec.accuracy - expected).abs() > TOLERANCE {
            out.push(violation(
                rec,
                "accuracy",
                ViolationKind::CalcMismatch,
                rec.accuracy,
                Some(expected),
            ));
        }
    }
}

fn in_unit_range(x: f64) -> bool {
    x.is_finite() && x >= -TOLERANCE && x <= 1.0 + TOLERANCE
}

fn violation(
    rec: &CreatorDaily,
    field: &'static str,
    kind: ViolationKind,
    observed: f64,
    expected: Option<f64>,
) -> Violation {
    Violation {
        creator_id: rec.creator_id.clone(),
        day: rec.day.clone(),
        field,
        kind,
        observed,
        expected,
    }
}

/// Periodic sweep entrypoint: validate in batches with a short pause
/// between them. The report is the merge of all batch reports.
pub async fn validate_in_batches(records: &[CreatorDaily], batch_size: usize) -> SentinelReport {
    super::ensure_metrics_described();
    let batch_size = batch_size.max(1);
    let mut report = SentinelReport {
        records_checked: 0,
        violations: Vec::new(),
    };

    let mut chunks = records.chunks(batch_size).peekable();
    while let Some(chunk) = chunks.next() {
        report.merge(validate_records(chunk));
        if chunks.peek().is_some() {
            sleep(Duration::from_millis(BATCH_PACING_MS)).await;
        }
    }

    counter!("sentinel_records_checked_total").increment(report.records_checked as u64);
    counter!("sentinel_violations_total").increment(report.violations.len() as u64);
    if report.is_clean() {
        tracing::debug!(target: "sentinel", records = report.records_checked, "sweep clean");
    } else {
        tracing::warn!(
            target: "sentinel",
            records = report.records_checked,
            violations = report.violations.len(),
            "data-quality violations found"
        );
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clean_record() -> CreatorDaily {
        CreatorDaily {
            creator_id: "cr_1".into(),
            day: "2026-08-01".into(),
            score: 0.72,
            accuracy: 0.8,
            consistency: 0.5,
            volume_score: 0.3,
            recency_score: 0.6,
            matured_n: 40,
            brier_mean: 0.2,
            notional_30d: 125_000.0,
            ret_std_30d: 1.0,
            provisional: false,
        }
    }

    #[test]
    fn clean_record_produces_zero_violations() {
        let report = validate_records(&[clean_record()]);
        assert!(report.is_clean(), "unexpected: {:?}", report.violations);
        assert_eq!(report.records_checked, 1);
    }

    #[test]
    fn out_of_range_accuracy_is_flagged_by_field() {
        let mut rec = clean_record();
        rec.accuracy = 1.5;
        let report = validate_records(&[rec]);
        assert_eq!(report.violations.len(), 1);
        let v = &report.violations[0];
        assert_eq!(v.field, "accuracy");
        assert_eq!(v.kind, ViolationKind::Range);
        assert_eq!(v.observed, 1.5);
        assert_eq!(v.expected, None);
    }

    #[test]
    fn accuracy_brier_disagreement_is_a_calc_mismatch() {
        let mut rec = clean_record();
        rec.accuracy = 0.9; // brierMean 0.2 says it should be 0.8
        let report = validate_records(&[rec]);
        assert_eq!(report.violations.len(), 1);
        let v = &report.violations[0];
        assert_eq!(v.field, "accuracy");
        assert_eq!(v.kind, ViolationKind::CalcMismatch);
        assert_eq!(v.expected, Some(0.8));
    }

    #[test]
    fn drift_within_tolerance_is_not_a_mismatch() {
        let mut rec = clean_record();
        rec.accuracy = 0.8 + 5e-7;
        assert!(validate_records(&[rec]).is_clean());
    }

    #[test]
    fn negative_counts_and_notionals_are_flagged() {
        let mut rec = clean_record();
        rec.notional_30d = -10.0;
        rec.matured_n = -1;
        let report = validate_records(&[rec]);
        let fields: Vec<_> = report.violations.iter().map(|v| v.field).collect();
        assert_eq!(fields, vec!["notional30d", "maturedN"]);
        assert!(report
            .violations
            .iter()
            .all(|v| v.kind == ViolationKind::NegativeValue));
    }

    #[test]
    fn one_bad_record_does_not_hide_the_rest() {
        let mut bad = clean_record();
        bad.creator_id = "cr_bad".into();
        bad.score = f64::NAN;
        let report = validate_records(&[clean_record(), bad, clean_record()]);
        assert_eq!(report.records_checked, 3);
        assert_eq!(report.violations.len(), 1);
        assert_eq!(report.violations[0].creator_id, "cr_bad");
    }

    #[tokio::test]
    async fn batched_sweep_merges_reports() {
        let mut bad = clean_record();
        bad.accuracy = -0.4;
        let records = vec![clean_record(), bad, clean_record(), clean_record(), clean_record()];
        let report = validate_in_batches(&records, 2).await;
        assert_eq!(report.records_checked, 5);
        assert_eq!(report.violations.len(), 1);
        assert_eq!(report.violations[0].field, "accuracy");
    }
}
