//! # Signal Aggregator
//! One pass: ask each source's breaker, fan out the permitted fetches
//! concurrently with per-source timeouts, record telemetry, feed outcomes
//! back to the breakers, merge items in source-registration order, and fall
//! back to the cached snapshot when the merge comes up empty.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use metrics::{counter, gauge, histogram};
use tokio::task::JoinSet;

use crate::clock::Clock;
use crate::notify::{BreakerEvent, NotifierMux};
use crate::signals::breaker::{BreakerConfig, BreakerState, BreakerTransition, CircuitBreaker};
use crate::signals::cache::SnapshotCache;
use crate::signals::ensure_metrics_described;
use crate::signals::telemetry::TelemetryRecorder;
use crate::signals::types::{FetchOutcome, SignalItem, SignalSource, Snapshot, SourceResult};

/// Aggregation tunables, loaded from `[aggregator]` + `[breaker]` config.
#[derive(Debug, Clone, PartialEq)]
pub struct HubConfig {
    pub breaker: BreakerConfig,
    /// Snapshots younger than this are served from cache without the stale tag.
    pub fresh_ttl_ms: u64,
    /// Snapshots older than this are not served at all.
    pub serve_stale_ms: u64,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            breaker: BreakerConfig::default(),
            fresh_ttl_ms: 60_000,
            serve_stale_ms: 86_400_000,
        }
    }
}

/// The registry object: sources plus the telemetry/breaker/cache trio,
/// constructed once at startup and passed around by handle.
pub struct SignalHub {
    sources: Vec<Arc<dyn SignalSource>>,
    telemetry: Arc<TelemetryRecorder>,
    breaker: Arc<CircuitBreaker>,
    cache: Arc<SnapshotCache>,
    clock: Arc<dyn Clock>,
    cfg: HubConfig,
    notifier: Option<Arc<NotifierMux>>,
}

impl SignalHub {
    pub fn new(sources: Vec<Arc<dyn SignalSource>>, cfg: HubConfig, clock: Arc<dyn Clock>) -> Self {
        let breaker = Arc::new(CircuitBreaker::new(cfg.breaker.clone(), clock.clone()));
        for src in &sources {
            breaker.register(src.name());
        }
        Self {
            sources,
            telemetry: Arc::new(TelemetryRecorder::new(clock.clone())),
            breaker,
            cache: Arc::new(SnapshotCache::new(clock.clone())),
            clock,
            cfg,
            notifier: None,
        }
    }

    /// Attach a webhook notifier for breaker transitions.
    pub fn with_notifier(mut self, mux: Arc<NotifierMux>) -> Self {
        self.notifier = Some(mux);
        self
    }

    pub fn telemetry(&self) -> &TelemetryRecorder {
        &self.telemetry
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn cache(&self) -> &SnapshotCache {
        &self.cache
    }

    pub fn source_names(&self) -> Vec<&'static str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    /// Produce one merged snapshot. Never fails; worst case is an empty one.
    pub async fn aggregate(&self) -> Snapshot {
        ensure_metrics_described();

        // 1) Gate by breaker state.
        let mut skipped: Vec<String> = Vec::new();
        let mut attempted: Vec<(usize, Arc<dyn SignalSource>)> = Vec::new();
        for (idx, src) in self.sources.iter().enumerate() {
            if self.breaker.should_attempt(src.name()) {
                attempted.push((idx, src.clone()));
            } else {
                skipped.push(src.name().to_string());
                counter!("signal_source_skipped_total", "source" => src.name()).increment(1);
            }
        }

        // 2) Fan out concurrently; each call bounded by its own timeout.
        //    Dropping the timed-out future aborts the in-flight request.
        let mut join = JoinSet::new();
        for (idx, src) in attempted {
            let telemetry = self.telemetry.clone();
            join.spawn(async move {
                let token = telemetry.start(src.name());
                let fetched =
                    tokio::time::timeout(Duration::from_millis(src.timeout_ms()), src.fetch())
                        .await;
                let outcome = match fetched {
                    Ok(Ok(items)) => FetchOutcome::Success(items),
                    Ok(Err(e)) => FetchOutcome::Failure(format!("{e:#}")),
                    Err(_) => FetchOutcome::TimedOut,
                };
                let elapsed_ms = telemetry.end(token, &outcome);
                (
                    idx,
                    SourceResult {
                        source_name: src.name().to_string(),
                        outcome,
                        elapsed_ms,
                    },
                )
            });
        }

        let mut results: Vec<(usize, SourceResult)> = Vec::new();
        while let Some(joined) = join.join_next().await {
            match joined {
                Ok(pair) => results.push(pair),
                Err(e) => {
                    tracing::warn!(target: "signals", error = ?e, "source task join error");
                    counter!("signal_source_join_errors_total").increment(1);
                }
            }
        }
        results.sort_by_key(|(idx, _)| *idx);

        // 3) Feed the breakers in registration order, one critical section
        //    per outcome, and count per-source metrics.
        for (_, res) in &results {
            let name = res.source_name.as_str();
            histogram!("signal_fetch_ms", "source" => name.to_string())
                .record(res.elapsed_ms as f64);
            let (label, transition) = match &res.outcome {
                FetchOutcome::Success(_) => ("ok", self.breaker.record_success(name)),
                FetchOutcome::Failure(reason) => {
                    tracing::warn!(target: "signals", source = name, reason, "source failed");
                    ("error", self.breaker.record_failure(name))
                }
                FetchOutcome::TimedOut => {
                    tracing::warn!(
                        target: "signals",
                        source = name,
                        elapsed_ms = res.elapsed_ms,
                        "source timed out"
                    );
                    ("timeout", self.breaker.record_failure(name))
                }
            };
            counter!("signal_fetch_total", "source" => name.to_string(), "outcome" => label)
                .increment(1);
            if let Some(t) = transition {
                self.notify_transition(name, t);
            }
        }
        self.publish_breaker_gauges();

        // 4) Ordered merge with (source, key) dedup.
        let results: Vec<SourceResult> = results.into_iter().map(|(_, r)| r).collect();
        let (merged, sources_ok) = merge_results(&results);

        // 5) Empty merge: cached fallback, else explicitly empty.
        let now = self.clock.now_ms();
        if merged.is_empty() {
            if let Some(view) = self.cache.stale_but_serveable() {
                if view.age_ms <= self.cfg.serve_stale_ms {
                    let is_stale = view.age_ms > self.cfg.fresh_ttl_ms;
                    counter!("signal_cache_fallback_total").increment(1);
                    tracing::info!(
                        target: "signals",
                        age_ms = view.age_ms,
                        is_stale,
                        "all sources unavailable, serving cached snapshot"
                    );
                    return Snapshot {
                        items: view.items,
                        sources_ok: view.sources_ok,
                        sources_skipped: skipped,
                        fetched_at: view.cached_at_ms,
                        age_ms: view.age_ms,
                        is_stale,
                        served_from_cache: true,
                    };
                }
                tracing::warn!(
                    target: "signals",
                    age_ms = view.age_ms,
                    limit_ms = self.cfg.serve_stale_ms,
                    "cached snapshot beyond serve-stale window, not serving"
                );
            }
            return Snapshot::empty(now, skipped);
        }

        // 6) Fresh merge overwrites the cache.
        self.cache.set(merged.clone(), sources_ok.clone());
        gauge!("signal_snapshot_items").set(merged.len() as f64);
        gauge!("signal_pipeline_last_run_ts").set((now / 1_000) as f64);

        Snapshot {
            items: merged,
            sources_ok,
            sources_skipped: skipped,
            fetched_at: now,
            age_ms: 0,
            is_stale: false,
            served_from_cache: false,
        }
    }

    fn notify_transition(&self, source: &str, t: BreakerTransition) {
        if let Some(mux) = &self.notifier {
            let mux = mux.clone();
            let ev = BreakerEvent {
                source: source.to_string(),
                from: t.from,
                to: t.to,
                backoff_ms: t.backoff_ms,
                at: chrono::Utc::now(),
            };
            tokio::spawn(async move {
                mux.notify(&ev).await;
            });
        }
    }

    fn publish_breaker_gauges(&self) {
        for (source, status) in self.breaker.states() {
            gauge!("signal_breaker_state", "source" => source).set(state_gauge(status.state));
        }
    }
}

impl std::fmt::Debug for SignalHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalHub")
            .field("sources", &self.source_names())
            .field("cfg", &self.cfg)
            .finish_non_exhaustive()
    }
}

/// 0 = closed, 1 = half-open, 2 = open (severity order for dashboards).
fn state_gauge(state: BreakerState) -> f64 {
    match state {
        BreakerState::Closed => 0.0,
        BreakerState::HalfOpen => 1.0,
        BreakerState::Open => 2.0,
    }
}

/// Merge successful results in the given order; duplicates by `(source, key)`
/// keep their first occurrence.
fn merge_results(results: &[SourceResult]) -> (Vec<SignalItem>, Vec<String>) {
    let mut seen: HashSet<(String, String)> = HashSet::new();
    let mut merged: Vec<SignalItem> = Vec::new();
    let mut sources_ok: Vec<String> = Vec::new();

    for res in results {
        if !res.outcome.ok() {
            continue;
        }
        sources_ok.push(res.source_name.clone());
        for item in res.items() {
            if seen.insert((item.source.clone(), item.key.clone())) {
                merged.push(item.clone());
            }
        }
    }
    (merged, sources_ok)
}
