//! Market Signal Engine — Binary Entrypoint
//! Boots the Axum HTTP server, wiring the signal hub, scoring state, the
//! background refresh loop and middleware.
//!
//! See `README.md` for quickstart.

use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use market_signal_engine::api::{self, AppState};
use market_signal_engine::clock::SystemClock;
use market_signal_engine::config;
use market_signal_engine::metrics::Metrics;
use market_signal_engine::notify::NotifierMux;
use market_signal_engine::scheduler::spawn_refresh_scheduler;
use market_signal_engine::signals::{sources, SignalHub};

/// Compact tracing to stderr, filtered by RUST_LOG (default `info`).
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op in prod environments.
    // This enables SIGNALS_CONFIG_PATH and the webhook vars before anything
    // reads them.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = config::load_config_default()?;
    let hub_cfg = cfg.hub_config();

    let metrics = Metrics::init(hub_cfg.fresh_ttl_ms);

    // --- Wire the signal hub ---
    let adapters = sources::build_sources(&cfg.sources);
    let mut hub = SignalHub::new(adapters, hub_cfg, Arc::new(SystemClock));
    if let Some(mux) = NotifierMux::from_env() {
        hub = hub.with_notifier(mux);
    }
    let hub = Arc::new(hub);

    // Background refresh keeps the cache warm between requests.
    let _refresh = spawn_refresh_scheduler(hub.clone(), cfg.aggregator.refresh_interval_secs);

    let state = AppState::new(hub, cfg.scoring.clone());
    let router = api::create_router(state).merge(metrics.router());

    let listener = tokio::net::TcpListener::bind(&cfg.server.bind)
        .await
        .with_context(|| format!("binding {}", cfg.server.bind))?;
    tracing::info!(target: "signals", addr = %cfg.server.bind, "listening");
    axum::serve(listener, router).await?;
    Ok(())
}
