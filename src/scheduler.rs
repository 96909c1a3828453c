// src/scheduler.rs
use std::sync::Arc;

use metrics::{counter, gauge};
use tokio::task::JoinHandle;

use crate::signals::SignalHub;

/// Spawn the background refresh loop: re-aggregate on a fixed cadence so the
/// cache stays warm and open breakers keep probing even without request
/// traffic. The first tick fires immediately.
pub fn spawn_refresh_scheduler(hub: Arc<SignalHub>, interval_secs: u64) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker =
            tokio::time::interval(std::time::Duration::from_secs(interval_secs.max(1)));
        loop {
            ticker.tick().await;
            let now = chrono::Utc::now().timestamp().max(0) as u64;

            let snapshot = hub.aggregate().await;

            counter!("signal_refresh_runs_total").increment(1);
            gauge!("signal_pipeline_last_run_ts").set(now as f64);

            tracing::info!(
                target: "signals",
                items = snapshot.items.len(),
                sources_ok = snapshot.sources_ok.len(),
                skipped = snapshot.sources_skipped.len(),
                from_cache = snapshot.served_from_cache,
                "refresh tick"
            );
        }
    })
}
