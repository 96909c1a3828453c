// src/signals/mod.rs
pub mod aggregator;
pub mod breaker;
pub mod cache;
pub mod sources;
pub mod telemetry;
pub mod types;

pub use aggregator::{HubConfig, SignalHub};
pub use breaker::{BreakerConfig, BreakerState, BreakerStatus, CircuitBreaker};
pub use cache::SnapshotCache;
pub use telemetry::{SourceMetrics, TelemetryRecorder};
pub use types::{FetchOutcome, SignalItem, SignalKind, SignalSource, Snapshot, SourceResult};

use metrics::{describe_counter, describe_gauge, describe_histogram};
use once_cell::sync::OnceCell;

/// One-time metrics registration (so series show up on /metrics).
pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "signal_fetch_total",
            "Adapter calls by source and outcome (ok/error/timeout)."
        );
        describe_counter!(
            "signal_items_parsed_total",
            "Items parsed out of source payloads."
        );
        describe_counter!(
            "signal_source_skipped_total",
            "Calls short-circuited by an open breaker."
        );
        describe_counter!(
            "signal_cache_fallback_total",
            "Aggregations served from the stale cache."
        );
        describe_counter!(
            "signal_source_join_errors_total",
            "Source tasks that panicked or were cancelled."
        );
        describe_counter!(
            "signal_refresh_runs_total",
            "Background refresh ticks."
        );
        describe_histogram!("signal_parse_ms", "Source payload parse time in milliseconds.");
        describe_histogram!("signal_fetch_ms", "Adapter call time in milliseconds.");
        describe_gauge!(
            "signal_breaker_state",
            "Breaker state per source: 0 closed, 1 half-open, 2 open."
        );
        describe_gauge!("signal_snapshot_items", "Items in the last fresh snapshot.");
        describe_gauge!(
            "signal_pipeline_last_run_ts",
            "Unix ts when aggregation last produced a fresh snapshot."
        );
    });
}
