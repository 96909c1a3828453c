//! # Source Telemetry
//! Per-source rolling call statistics: success/timeout rates, p95 latency,
//! last-success timestamp.
//!
//! Pure in-memory accumulators consumed by health reporting and by breaker
//! decisions. Counters live for the process lifetime and reset only via an
//! explicit [`TelemetryRecorder::clear`].

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::time::Instant;

use crate::clock::Clock;
use crate::signals::types::FetchOutcome;

/// Response-time samples kept per source; oldest evicted first.
pub const RESPONSE_TIME_CAP: usize = 100;

/// Fixed-capacity circular buffer of latency samples.
#[derive(Debug)]
struct LatencyRing {
    buf: [u64; RESPONSE_TIME_CAP],
    next: usize,
    len: usize,
}

impl LatencyRing {
    const fn new() -> Self {
        Self {
            buf: [0; RESPONSE_TIME_CAP],
            next: 0,
            len: 0,
        }
    }

    fn push(&mut self, ms: u64) {
        self.buf[self.next] = ms;
        self.next = (self.next + 1) % RESPONSE_TIME_CAP;
        if self.len < RESPONSE_TIME_CAP {
            self.len += 1;
        }
    }

    /// Nearest-rank p95 (lower variant): the value at sorted index
    /// `floor(0.95 × (n − 1))`, so 10 samples yield the 9th value.
    fn p95(&self) -> u64 {
        if self.len == 0 {
            return 0;
        }
        let mut sorted: Vec<u64> = self.buf[..self.len.min(RESPONSE_TIME_CAP)].to_vec();
        sorted.sort_unstable();
        let idx = ((sorted.len() - 1) as f64 * 0.95).floor() as usize;
        sorted[idx]
    }
}

/// Internal accumulator, one per source.
#[derive(Debug)]
struct SourceStats {
    total_calls: u64,
    success_calls: u64,
    timeout_calls: u64,
    latencies: LatencyRing,
    last_ok_ms: Option<u64>,
}

impl SourceStats {
    const fn new() -> Self {
        Self {
            total_calls: 0,
            success_calls: 0,
            timeout_calls: 0,
            latencies: LatencyRing::new(),
            last_ok_ms: None,
        }
    }

    fn snapshot(&self) -> SourceMetrics {
        let total = self.total_calls;
        let rate = |part: u64| {
            if total > 0 {
                part as f64 / total as f64
            } else {
                0.0
            }
        };
        SourceMetrics {
            total_calls: total,
            success_calls: self.success_calls,
            timeout_calls: self.timeout_calls,
            success_rate: rate(self.success_calls),
            timeout_rate: rate(self.timeout_calls),
            p95_ms: self.latencies.p95(),
            sample_count: self.latencies.len,
            last_ok_timestamp: self.last_ok_ms,
        }
    }
}

/// Read-only per-source metrics snapshot.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceMetrics {
    pub total_calls: u64,
    pub success_calls: u64,
    pub timeout_calls: u64,
    pub success_rate: f64,
    pub timeout_rate: f64,
    pub p95_ms: u64,
    pub sample_count: usize,
    /// Unix ms of the most recent successful call, if any.
    pub last_ok_timestamp: Option<u64>,
}

/// Opaque token returned by `start`; pairs a source with its start instant.
#[derive(Debug)]
pub struct CallToken {
    source: String,
    started: Instant,
}

impl CallToken {
    pub fn source(&self) -> &str {
        &self.source
    }
}

/// Thread-safe recorder keyed by source name. Increments and the rate/p95
/// recompute happen under one lock since they are not atomic on their own.
pub struct TelemetryRecorder {
    inner: Mutex<HashMap<String, SourceStats>>,
    clock: std::sync::Arc<dyn Clock>,
}

impl TelemetryRecorder {
    pub fn new(clock: std::sync::Arc<dyn Clock>) -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Begin timing one adapter call.
    pub fn start(&self, source: &str) -> CallToken {
        CallToken {
            source: source.to_string(),
            started: Instant::now(),
        }
    }

    /// Finish a timed call; elapsed comes from the token's start instant.
    /// Returns the measured elapsed ms for reuse by the caller.
    pub fn end(&self, token: CallToken, outcome: &FetchOutcome) -> u64 {
        let elapsed_ms = token.started.elapsed().as_millis() as u64;
        self.record(&token.source, outcome, elapsed_ms);
        elapsed_ms
    }

    /// Record one call outcome with an explicit elapsed time.
    pub fn record(&self, source: &str, outcome: &FetchOutcome, elapsed_ms: u64) {
        let mut inner = self.inner.lock().expect("telemetry mutex poisoned");
        let stats = inner
            .entry(source.to_string())
            .or_insert_with(SourceStats::new);

        stats.total_calls += 1;
        if outcome.ok() {
            stats.success_calls += 1;
            stats.last_ok_ms = Some(self.clock.now_ms());
        }
        if outcome.timed_out() {
            stats.timeout_calls += 1;
        }
        stats.latencies.push(elapsed_ms);
    }

    pub fn metrics(&self, source: &str) -> Option<SourceMetrics> {
        let inner = self.inner.lock().expect("telemetry mutex poisoned");
        inner.get(source).map(SourceStats::snapshot)
    }

    /// Snapshot of all sources, keyed by name (stable order for JSON).
    pub fn all_metrics(&self) -> BTreeMap<String, SourceMetrics> {
        let inner = self.inner.lock().expect("telemetry mutex poisoned");
        inner
            .iter()
            .map(|(name, stats)| (name.clone(), stats.snapshot()))
            .collect()
    }

    /// Drop every accumulator. Ops/test hook; normal operation never resets.
    pub fn clear(&self) {
        let mut inner = self.inner.lock().expect("telemetry mutex poisoned");
        inner.clear();
    }
}

impl std::fmt::Debug for TelemetryRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryRecorder").finish_non_exhaustive()
    }
}
