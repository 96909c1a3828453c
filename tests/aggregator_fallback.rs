// tests/aggregator_fallback.rs
//
// Aggregation degradation paths, end to end over the hub:
// - breakers trip on persistently unhealthy sources and later passes skip them
// - empty merges fall back to the cached snapshot, labeled stale past the TTL
// - a cache beyond the serve-stale window is dropped, not served
// - with nothing cached the hub returns an explicitly empty snapshot

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use market_signal_engine::clock::ManualClock;
use market_signal_engine::signals::{
    BreakerConfig, BreakerState, HubConfig, SignalHub, SignalItem, SignalKind, SignalSource,
};

fn mk_item(source: &str, key: &str, value: f64) -> SignalItem {
    SignalItem {
        source: source.to_string(),
        kind: SignalKind::Odds,
        key: key.to_string(),
        label: key.to_string(),
        value,
        observed_at: 1_700_000_000,
    }
}

fn hub_config(threshold: u32) -> HubConfig {
    HubConfig {
        breaker: BreakerConfig {
            failure_threshold: threshold,
            base_backoff_ms: 500,
            max_backoff_ms: 300_000,
        },
        fresh_ttl_ms: 60_000,
        serve_stale_ms: 86_400_000,
    }
}

struct HealthySource;

#[async_trait]
impl SignalSource for HealthySource {
    async fn fetch(&self) -> Result<Vec<SignalItem>> {
        Ok(vec![
            mk_item("prediction-odds", "fed-cut-march", 0.62),
            mk_item("prediction-odds", "btc-100k-eoy", 0.41),
        ])
    }
    fn name(&self) -> &'static str {
        "prediction-odds"
    }
    fn timeout_ms(&self) -> u64 {
        1_000
    }
}

/// Sleeps past its own timeout on every call.
struct SlowSource;

#[async_trait]
impl SignalSource for SlowSource {
    async fn fetch(&self) -> Result<Vec<SignalItem>> {
        tokio::time::sleep(std::time::Duration::from_millis(350)).await;
        Ok(vec![mk_item("fear-greed", "fear-greed-index", 0.54)])
    }
    fn name(&self) -> &'static str {
        "fear-greed"
    }
    fn timeout_ms(&self) -> u64 {
        200
    }
}

/// Upstream that answers instantly with a server error.
struct BrokenSource;

#[async_trait]
impl SignalSource for BrokenSource {
    async fn fetch(&self) -> Result<Vec<SignalItem>> {
        Err(anyhow!("HTTP status server error (500) for funding feed"))
    }
    fn name(&self) -> &'static str {
        "funding-rates"
    }
    fn timeout_ms(&self) -> u64 {
        1_000
    }
}

/// Succeeds on the first call, then fails forever.
struct FlakySource {
    calls: AtomicUsize,
}

impl FlakySource {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl SignalSource for FlakySource {
    async fn fetch(&self) -> Result<Vec<SignalItem>> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            Ok(vec![mk_item("prediction-odds", "fed-cut-march", 0.62)])
        } else {
            Err(anyhow!("connection refused"))
        }
    }
    fn name(&self) -> &'static str {
        "prediction-odds"
    }
    fn timeout_ms(&self) -> u64 {
        1_000
    }
}

#[tokio::test]
async fn unhealthy_sources_trip_and_later_passes_skip_them() {
    let clock = ManualClock::starting_at(1_700_000_000_000);
    let sources: Vec<Arc<dyn SignalSource>> = vec![
        Arc::new(HealthySource),
        Arc::new(SlowSource),
        Arc::new(BrokenSource),
    ];
    let hub = SignalHub::new(sources, hub_config(3), clock.clone());

    // Three passes of timeout + error trip both unhealthy breakers. The
    // clock never advances, so no backoff elapses in between.
    for _ in 0..3 {
        let snap = hub.aggregate().await;
        assert_eq!(snap.sources_ok, vec!["prediction-odds".to_string()]);
    }
    assert_eq!(
        hub.breaker().status("fear-greed").expect("registered").state,
        BreakerState::Open
    );
    assert_eq!(
        hub.breaker().status("funding-rates").expect("registered").state,
        BreakerState::Open
    );

    let before_slow = hub.telemetry().metrics("fear-greed").expect("recorded");
    assert_eq!(before_slow.total_calls, 3);
    assert_eq!(before_slow.timeout_calls, 3);

    // Fourth pass only invokes the healthy source.
    let snap = hub.aggregate().await;
    assert!(snap.items.iter().all(|i| i.source == "prediction-odds"));
    assert_eq!(snap.items.len(), 2);
    assert_eq!(snap.sources_ok, vec!["prediction-odds".to_string()]);
    assert_eq!(
        snap.sources_skipped,
        vec!["fear-greed".to_string(), "funding-rates".to_string()]
    );
    assert!(!snap.served_from_cache);

    assert_eq!(
        hub.telemetry().metrics("fear-greed").expect("recorded").total_calls,
        3,
        "open breaker means no new call"
    );
    assert_eq!(
        hub.telemetry().metrics("prediction-odds").expect("recorded").total_calls,
        4
    );
}

#[tokio::test]
async fn empty_merge_serves_cached_snapshot_with_stale_label() {
    let clock = ManualClock::starting_at(1_700_000_000_000);
    let sources: Vec<Arc<dyn SignalSource>> = vec![Arc::new(FlakySource::new())];
    let hub = SignalHub::new(sources, hub_config(1), clock.clone());

    let fresh = hub.aggregate().await;
    assert_eq!(fresh.items.len(), 1);
    assert!(!fresh.is_stale);
    assert!(!fresh.served_from_cache);

    // Past the fresh TTL: the fallback is served, but labeled stale.
    clock.advance_ms(120_000);
    let fallback = hub.aggregate().await;
    assert_eq!(fallback.items, fresh.items);
    assert!(fallback.served_from_cache);
    assert!(fallback.is_stale);
    assert_eq!(fallback.age_ms, 120_000);
    assert_eq!(fallback.fetched_at, fresh.fetched_at);

    // The breaker tripped on that failure; the next pass skips the source
    // entirely and still serves the cache.
    let skipped = hub.aggregate().await;
    assert!(skipped.served_from_cache);
    assert_eq!(
        skipped.sources_skipped,
        vec!["prediction-odds".to_string()]
    );
}

#[tokio::test]
async fn cache_within_fresh_ttl_is_served_without_stale_label() {
    let clock = ManualClock::starting_at(1_700_000_000_000);
    let sources: Vec<Arc<dyn SignalSource>> = vec![Arc::new(FlakySource::new())];
    let hub = SignalHub::new(sources, hub_config(1), clock.clone());

    let fresh = hub.aggregate().await;
    clock.advance_ms(10_000);
    let fallback = hub.aggregate().await;
    assert_eq!(fallback.items, fresh.items);
    assert!(fallback.served_from_cache);
    assert!(!fallback.is_stale, "ten seconds old is still fresh");
}

#[tokio::test]
async fn cache_beyond_serve_stale_window_is_dropped() {
    let clock = ManualClock::starting_at(1_700_000_000_000);
    let sources: Vec<Arc<dyn SignalSource>> = vec![Arc::new(FlakySource::new())];
    let hub = SignalHub::new(sources, hub_config(1), clock.clone());

    hub.aggregate().await;
    clock.advance_ms(86_400_001);
    let dropped = hub.aggregate().await;
    assert!(dropped.items.is_empty(), "a day-old snapshot is not served");
    assert!(!dropped.served_from_cache);
    assert!(!dropped.is_stale);
}

#[tokio::test]
async fn all_failing_with_no_cache_returns_empty_snapshot() {
    let clock = ManualClock::starting_at(1_700_000_000_000);
    let sources: Vec<Arc<dyn SignalSource>> = vec![Arc::new(BrokenSource)];
    let hub = SignalHub::new(sources, hub_config(10), clock.clone());

    let snap = hub.aggregate().await;
    assert!(snap.items.is_empty());
    assert!(snap.sources_ok.is_empty());
    assert!(!snap.served_from_cache);
    assert!(!snap.is_stale);
    assert_eq!(snap.age_ms, 0);
}

#[tokio::test]
async fn clearing_the_cache_removes_the_fallback() {
    let clock = ManualClock::starting_at(1_700_000_000_000);
    let sources: Vec<Arc<dyn SignalSource>> = vec![Arc::new(FlakySource::new())];
    let hub = SignalHub::new(sources, hub_config(1), clock.clone());

    hub.aggregate().await;
    hub.cache().clear();
    clock.advance_ms(10_000);
    let snap = hub.aggregate().await;
    assert!(snap.items.is_empty());
    assert!(!snap.served_from_cache);
}
