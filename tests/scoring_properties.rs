// tests/scoring_properties.rs
//
// Property-style sweeps with a seeded RNG (deterministic across runs):
// - compute_score stays in [0,1] for every valid component mix, including
//   degenerate weight vectors
// - compute_score is monotonically non-decreasing in each component
// - the creator-day pipeline emits records the data-quality sentinel
//   considers clean
// - telemetry p95 equals a naive percentile over the retained window

use rand::{rngs::StdRng, Rng, SeedableRng};

use market_signal_engine::clock::ManualClock;
use market_signal_engine::scoring::{
    compute_score, score_creator_day, validate_records, CreatorDayInputs, DailyAccuracy,
    ScoreComponents, ScoreWeights, ScoringConfig,
};
use market_signal_engine::signals::{FetchOutcome, TelemetryRecorder};

fn random_components(rng: &mut StdRng) -> ScoreComponents {
    ScoreComponents {
        accuracy: rng.random_range(0.0..=1.0),
        consistency: rng.random_range(0.0..=1.0),
        volume_score: rng.random_range(0.0..=1.0),
        recency_score: rng.random_range(0.0..=1.0),
    }
}

#[test]
fn composite_stays_in_unit_interval_for_valid_inputs() {
    let mut rng = StdRng::seed_from_u64(42);
    for _ in 0..500 {
        let c = random_components(&mut rng);
        let w = ScoreWeights {
            accuracy: rng.random_range(0.0..=1.0),
            consistency: rng.random_range(0.0..=1.0),
            volume: rng.random_range(0.0..=1.0),
            recency: rng.random_range(0.0..=1.0),
        };
        let score = compute_score(&c, &w).expect("valid components");
        assert!(
            (0.0..=1.0).contains(&score),
            "score {score} out of range for {c:?} with {w:?}"
        );
    }
}

#[test]
fn composite_is_monotone_in_every_component() {
    let mut rng = StdRng::seed_from_u64(7);
    let w = ScoreWeights::default();
    for _ in 0..200 {
        let base = random_components(&mut rng);
        let before = compute_score(&base, &w).expect("valid components");

        for idx in 0..4 {
            let mut bumped = base;
            let (slot, headroom) = match idx {
                0 => (&mut bumped.accuracy, 1.0 - base.accuracy),
                1 => (&mut bumped.consistency, 1.0 - base.consistency),
                2 => (&mut bumped.volume_score, 1.0 - base.volume_score),
                _ => (&mut bumped.recency_score, 1.0 - base.recency_score),
            };
            *slot += rng.random_range(0.0..=headroom);
            let after = compute_score(&bumped, &w).expect("valid components");
            assert!(
                after + 1e-12 >= before,
                "raising component {idx} lowered the score: {before} -> {after}"
            );
        }
    }
}

#[test]
fn creator_day_records_always_pass_the_sentinel() {
    let mut rng = StdRng::seed_from_u64(1234);
    let cfg = ScoringConfig::default();

    for i in 0..300 {
        let window_len = rng.random_range(0..40);
        let recent: Vec<DailyAccuracy> = (0..window_len)
            .map(|_| DailyAccuracy {
                days_ago: rng.random_range(0.0..=30.0),
                accuracy: rng.random_range(0.0..=1.0),
            })
            .collect();
        let inputs = CreatorDayInputs {
            creator_id: format!("cr_{i}"),
            day: "2026-08-01".to_string(),
            brier_mean: rng.random_range(0.0..=1.0),
            ret_std_30d: rng.random_range(0.0..=5.0),
            notional_30d: rng.random_range(0.0..=5_000_000.0),
            matured_n: rng.random_range(0..200),
            recent_daily_accuracy: recent,
        };

        let record = score_creator_day(&inputs, &cfg).expect("valid inputs");
        for (field, value) in [
            ("score", record.score),
            ("accuracy", record.accuracy),
            ("consistency", record.consistency),
            ("volumeScore", record.volume_score),
            ("recencyScore", record.recency_score),
        ] {
            assert!(
                (0.0..=1.0).contains(&value),
                "{field} = {value} out of range"
            );
        }
        assert_eq!(record.provisional, inputs.matured_n < cfg.min_matured_n);

        let report = validate_records(&[record]);
        assert!(
            report.is_clean(),
            "scorer output flagged by the sentinel: {:?}",
            report.violations
        );
    }
}

#[test]
fn telemetry_p95_matches_a_naive_percentile() {
    let mut rng = StdRng::seed_from_u64(99);

    for n in [1usize, 5, 37, 100, 150, 250] {
        let clock = ManualClock::starting_at(1_700_000_000_000);
        let recorder = TelemetryRecorder::new(clock);

        let mut pushed: Vec<u64> = Vec::with_capacity(n);
        for _ in 0..n {
            let ms = rng.random_range(1..=400);
            recorder.record("prediction-odds", &FetchOutcome::Success(vec![]), ms);
            pushed.push(ms);
        }

        // Only the most recent 100 samples are retained.
        let start = pushed.len().saturating_sub(100);
        let mut window: Vec<u64> = pushed[start..].to_vec();
        window.sort_unstable();
        let expected = window[((window.len() - 1) as f64 * 0.95).floor() as usize];

        let metrics = recorder.metrics("prediction-odds").expect("recorded");
        assert_eq!(metrics.p95_ms, expected, "n = {n}");
        assert_eq!(metrics.sample_count, n.min(100));
    }
}
