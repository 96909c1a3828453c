//! # Clock
//! Injectable time source for breaker backoff and cache staleness.
//!
//! Components that compare elapsed wall-clock time take an `Arc<dyn Clock>`
//! instead of calling the system clock directly, so tests advance a
//! [`ManualClock`] rather than sleeping.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;

/// Monotonic-enough millisecond clock. Implementations must be cheap to call.
pub trait Clock: Send + Sync {
    /// Current time in milliseconds since the UNIX epoch.
    fn now_ms(&self) -> u64;
}

/// Production clock backed by `chrono::Utc`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        Utc::now().timestamp_millis().max(0) as u64
    }
}

/// Hand-advanced clock for tests and offline evaluation.
///
/// Starts at a fixed epoch offset so ages and timestamps are nonzero and
/// reproducible.
#[derive(Debug)]
pub struct ManualClock {
    now_ms: AtomicU64,
}

impl ManualClock {
    pub fn starting_at(ms: u64) -> Arc<Self> {
        Arc::new(Self {
            now_ms: AtomicU64::new(ms),
        })
    }

    /// Move time forward. Never goes backwards.
    pub fn advance_ms(&self, delta: u64) {
        self.now_ms.fetch_add(delta, Ordering::SeqCst);
    }

    pub fn set_ms(&self, ms: u64) {
        self.now_ms.store(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}
