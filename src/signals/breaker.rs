//! # Circuit Breaker
//! Per-source state machine gating adapter calls: closed → open after a run
//! of failures, open → half-open after the backoff elapses, half-open →
//! closed (trial success) or back to open with doubled backoff (trial
//! failure).
//!
//! Transitions are deterministic: they depend only on the injected clock and
//! recorded outcomes, no jitter. Pozn.: prahy a backoff jsou konfigurace,
//! ne magické konstanty.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use crate::clock::Clock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for BreakerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BreakerState::Closed => "closed",
            BreakerState::Open => "open",
            BreakerState::HalfOpen => "half-open",
        };
        f.write_str(s)
    }
}

/// Tunables, loaded from `[breaker]` in the service config.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// Consecutive failures in closed state before tripping.
    pub failure_threshold: u32,
    /// Initial cool-down after the first trip.
    pub base_backoff_ms: u64,
    /// Ceiling for the doubled backoff.
    pub max_backoff_ms: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 10,
            base_backoff_ms: 500,
            max_backoff_ms: 300_000,
        }
    }
}

/// Read-only view of one source's breaker, as served by ops endpoints.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakerStatus {
    pub state: BreakerState,
    pub failure_count: u32,
    pub backoff_ms: u64,
    /// Unix ms of the most recent trip, if the breaker ever opened.
    pub opened_at: Option<u64>,
}

/// Emitted when `record_success`/`record_failure` changes state; consumed by
/// logging, metrics and the webhook notifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerTransition {
    pub from: BreakerState,
    pub to: BreakerState,
    pub backoff_ms: u64,
}

#[derive(Debug)]
struct Entry {
    state: BreakerState,
    failure_count: u32,
    backoff_ms: u64,
    opened_at_ms: u64,
    ever_opened: bool,
}

impl Entry {
    fn fresh(cfg: &BreakerConfig) -> Self {
        Self {
            state: BreakerState::Closed,
            failure_count: 0,
            backoff_ms: cfg.base_backoff_ms,
            opened_at_ms: 0,
            ever_opened: false,
        }
    }

    fn status(&self) -> BreakerStatus {
        BreakerStatus {
            state: self.state,
            failure_count: self.failure_count,
            backoff_ms: self.backoff_ms,
            opened_at: self.ever_opened.then_some(self.opened_at_ms),
        }
    }
}

/// One breaker per registered source, all behind a single lock so a
/// record-decide-transition step is one critical section.
pub struct CircuitBreaker {
    entries: Mutex<HashMap<String, Entry>>,
    cfg: BreakerConfig,
    clock: Arc<dyn Clock>,
}

impl CircuitBreaker {
    pub fn new(cfg: BreakerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            cfg,
            clock,
        }
    }

    /// Pre-create the entry so state maps always list every known source.
    pub fn register(&self, source: &str) {
        let mut entries = self.entries.lock().expect("breaker mutex poisoned");
        entries
            .entry(source.to_string())
            .or_insert_with(|| Entry::fresh(&self.cfg));
    }

    /// Whether an adapter call may be attempted right now. The call that
    /// observes an elapsed backoff flips open → half-open and is itself the
    /// single permitted trial; later calls see half-open and are refused
    /// until an outcome is recorded.
    pub fn should_attempt(&self, source: &str) -> bool {
        let now = self.clock.now_ms();
        let mut entries = self.entries.lock().expect("breaker mutex poisoned");
        let entry = entries
            .entry(source.to_string())
            .or_insert_with(|| Entry::fresh(&self.cfg));

        match entry.state {
            BreakerState::Closed => true,
            BreakerState::HalfOpen => false,
            BreakerState::Open => {
                if now.saturating_sub(entry.opened_at_ms) >= entry.backoff_ms {
                    entry.state = BreakerState::HalfOpen;
                    tracing::info!(
                        target: "breaker",
                        source,
                        backoff_ms = entry.backoff_ms,
                        "backoff elapsed, half-open trial allowed"
                    );
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Record a successful call. Returns the transition if one occurred.
    pub fn record_success(&self, source: &str) -> Option<BreakerTransition> {
        let mut entries = self.entries.lock().expect("breaker mutex poisoned");
        let entry = entries
            .entry(source.to_string())
            .or_insert_with(|| Entry::fresh(&self.cfg));

        match entry.state {
            BreakerState::Closed => {
                entry.failure_count = 0;
                None
            }
            BreakerState::HalfOpen => {
                entry.state = BreakerState::Closed;
                entry.failure_count = 0;
                entry.backoff_ms = self.cfg.base_backoff_ms;
                tracing::info!(target: "breaker", source, "trial succeeded, breaker closed");
                Some(BreakerTransition {
                    from: BreakerState::HalfOpen,
                    to: BreakerState::Closed,
                    backoff_ms: entry.backoff_ms,
                })
            }
            // A call that was already in flight when the breaker tripped may
            // still land here; only half-open may close.
            BreakerState::Open => None,
        }
    }

    /// Record a failed or timed-out call. Returns the transition if one
    /// occurred.
    pub fn record_failure(&self, source: &str) -> Option<BreakerTransition> {
        let now = self.clock.now_ms();
        let mut entries = self.entries.lock().expect("breaker mutex poisoned");
        let entry = entries
            .entry(source.to_string())
            .or_insert_with(|| Entry::fresh(&self.cfg));

        match entry.state {
            BreakerState::Closed => {
                entry.failure_count += 1;
                if entry.failure_count >= self.cfg.failure_threshold {
                    entry.state = BreakerState::Open;
                    entry.opened_at_ms = now;
                    entry.ever_opened = true;
                    entry.backoff_ms = self.cfg.base_backoff_ms;
                    tracing::warn!(
                        target: "breaker",
                        source,
                        failures = entry.failure_count,
                        backoff_ms = entry.backoff_ms,
                        "breaker opened"
                    );
                    Some(BreakerTransition {
                        from: BreakerState::Closed,
                        to: BreakerState::Open,
                        backoff_ms: entry.backoff_ms,
                    })
                } else {
                    None
                }
            }
            BreakerState::HalfOpen => {
                entry.state = BreakerState::Open;
                entry.opened_at_ms = now;
                entry.backoff_ms = entry
                    .backoff_ms
                    .saturating_mul(2)
                    .min(self.cfg.max_backoff_ms);
                tracing::warn!(
                    target: "breaker",
                    source,
                    backoff_ms = entry.backoff_ms,
                    "trial failed, breaker reopened"
                );
                Some(BreakerTransition {
                    from: BreakerState::HalfOpen,
                    to: BreakerState::Open,
                    backoff_ms: entry.backoff_ms,
                })
            }
            BreakerState::Open => {
                // Late completion of a pre-trip call; the breaker is already
                // cooling down.
                None
            }
        }
    }

    pub fn status(&self, source: &str) -> Option<BreakerStatus> {
        let entries = self.entries.lock().expect("breaker mutex poisoned");
        entries.get(source).map(Entry::status)
    }

    /// All registered sources, stable key order.
    pub fn states(&self) -> BTreeMap<String, BreakerStatus> {
        let entries = self.entries.lock().expect("breaker mutex poisoned");
        entries
            .iter()
            .map(|(name, entry)| (name.clone(), entry.status()))
            .collect()
    }

    /// Put one source back to a fresh closed state. Ops/test escape hatch.
    /// Returns false when the source was never registered.
    pub fn reset(&self, source: &str) -> bool {
        let mut entries = self.entries.lock().expect("breaker mutex poisoned");
        match entries.get_mut(source) {
            Some(entry) => {
                *entry = Entry::fresh(&self.cfg);
                tracing::info!(target: "breaker", source, "breaker reset to closed");
                true
            }
            None => false,
        }
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("cfg", &self.cfg)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn breaker_with(
        threshold: u32,
        base_ms: u64,
        cap_ms: u64,
    ) -> (CircuitBreaker, Arc<ManualClock>) {
        let clock = ManualClock::starting_at(10_000);
        let cfg = BreakerConfig {
            failure_threshold: threshold,
            base_backoff_ms: base_ms,
            max_backoff_ms: cap_ms,
        };
        (CircuitBreaker::new(cfg, clock.clone()), clock)
    }

    fn trip(b: &CircuitBreaker, source: &str, n: u32) {
        for _ in 0..n {
            b.record_failure(source);
        }
    }

    #[test]
    fn opens_after_consecutive_failures() {
        let (b, _) = breaker_with(3, 100, 400);
        b.register("odds");

        b.record_failure("odds");
        b.record_failure("odds");
        assert!(b.should_attempt("odds"), "below threshold stays closed");

        let t = b.record_failure("odds").expect("third failure trips");
        assert_eq!(t.to, BreakerState::Open);
        assert!(!b.should_attempt("odds"));
        let st = b.status("odds").expect("registered");
        assert_eq!(st.state, BreakerState::Open);
        assert_eq!(st.opened_at, Some(10_000));
    }

    #[test]
    fn success_resets_the_consecutive_count() {
        let (b, _) = breaker_with(3, 100, 400);
        b.record_failure("odds");
        b.record_failure("odds");
        assert!(b.record_success("odds").is_none(), "closed stays closed");
        // Two more failures are again below the threshold.
        b.record_failure("odds");
        b.record_failure("odds");
        assert!(b.should_attempt("odds"));
    }

    #[test]
    fn exactly_one_trial_after_backoff() {
        let (b, clock) = breaker_with(2, 100, 400);
        trip(&b, "odds", 2);

        clock.advance_ms(99);
        assert!(!b.should_attempt("odds"), "backoff not yet elapsed");

        clock.advance_ms(1);
        assert!(b.should_attempt("odds"), "first call after backoff is the trial");
        assert!(!b.should_attempt("odds"), "no second trial while half-open");
        assert_eq!(
            b.status("odds").expect("registered").state,
            BreakerState::HalfOpen
        );
    }

    #[test]
    fn trial_success_closes_and_resets_backoff() {
        let (b, clock) = breaker_with(2, 100, 400);
        trip(&b, "odds", 2);
        clock.advance_ms(100);
        assert!(b.should_attempt("odds"));

        let t = b.record_success("odds").expect("transition");
        assert_eq!(t.from, BreakerState::HalfOpen);
        assert_eq!(t.to, BreakerState::Closed);

        let st = b.status("odds").expect("registered");
        assert_eq!(st.state, BreakerState::Closed);
        assert_eq!(st.failure_count, 0);
        assert_eq!(st.backoff_ms, 100, "backoff back to base");
    }

    #[test]
    fn trial_failure_doubles_backoff_up_to_cap() {
        let (b, clock) = breaker_with(2, 100, 400);
        trip(&b, "odds", 2);

        let mut expected = 100u64;
        for round in 0..4 {
            clock.advance_ms(expected);
            assert!(b.should_attempt("odds"), "trial in round {round}");
            let t = b.record_failure("odds").expect("reopen");
            expected = (expected * 2).min(400);
            assert_eq!(t.backoff_ms, expected, "round {round}");
        }
        // 100 → 200 → 400 → 400: the cap held.
        assert_eq!(b.status("odds").expect("registered").backoff_ms, 400);
    }

    #[test]
    fn open_absorbs_stray_outcomes() {
        let (b, _) = breaker_with(1, 100, 400);
        trip(&b, "odds", 1);
        assert!(b.record_success("odds").is_none());
        assert!(b.record_failure("odds").is_none());
        assert_eq!(
            b.status("odds").expect("registered").state,
            BreakerState::Open
        );
    }

    #[test]
    fn reset_returns_to_fresh_closed() {
        let (b, clock) = breaker_with(2, 100, 400);
        trip(&b, "odds", 2);
        clock.advance_ms(100);
        b.should_attempt("odds");
        b.record_failure("odds"); // backoff now 200

        assert!(b.reset("odds"));
        let st = b.status("odds").expect("registered");
        assert_eq!(st.state, BreakerState::Closed);
        assert_eq!(st.backoff_ms, 100);
        assert_eq!(st.opened_at, None);
        assert!(b.should_attempt("odds"));

        assert!(!b.reset("never-registered"));
    }

    #[test]
    fn register_lists_source_before_any_call() {
        let (b, _) = breaker_with(2, 100, 400);
        b.register("funding");
        let states = b.states();
        assert_eq!(states.len(), 1);
        assert_eq!(states["funding"].state, BreakerState::Closed);
    }

    #[test]
    fn wire_state_names_are_kebab_case() {
        let json = serde_json::to_string(&BreakerState::HalfOpen).expect("serialize");
        assert_eq!(json, "\"half-open\"");
    }
}
