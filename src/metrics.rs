use axum::{routing::get, Router};
use metrics::gauge;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

static HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Initialize the Prometheus recorder and expose a static gauge for the
    /// snapshot freshness TTL. The first call installs the recorder; later
    /// calls reuse the installed handle, so repeated init in tests is
    /// harmless.
    pub fn init(fresh_ttl_ms: u64) -> Self {
        let handle = HANDLE
            .get_or_init(|| {
                // Use default buckets to avoid API differences across crate versions.
                PrometheusBuilder::new()
                    .install_recorder()
                    .expect("prometheus: install recorder")
            })
            .clone();

        crate::signals::ensure_metrics_described();
        crate::scoring::ensure_metrics_described();

        // Static gauge with the configured freshness TTL
        gauge!("signal_cache_fresh_ttl_ms").set(fresh_ttl_ms as f64);

        Self { handle }
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}
