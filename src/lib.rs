// src/lib.rs
// Public library surface for integration tests (and potential reuse).

pub mod api;
pub mod clock;
pub mod config;
pub mod metrics;
pub mod scheduler;
pub mod scoring;
pub mod signals;

// Breaker-transition notifications (Discord/Slack webhooks)
pub mod notify;

// ---- Re-exports for stable public API ----
// Convenient router access: `market_signal_engine::api::create_router` or
// `market_signal_engine::create_router`
pub use crate::api::{create_router, AppState};
pub use crate::clock::{Clock, ManualClock, SystemClock};
pub use crate::config::{load_config_default, EngineConfig};
pub use crate::notify::{BreakerEvent, NotifierMux};
pub use crate::scoring::ScoringConfig;
pub use crate::signals::{HubConfig, SignalHub, Snapshot};
