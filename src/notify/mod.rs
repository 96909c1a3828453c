//! Breaker state-change alerts over webhooks. Delivery is best-effort and
//! throttled per source; a flapping breaker never spams a channel.

pub mod discord;
pub mod slack;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};

use crate::signals::breaker::BreakerState;

pub use discord::DiscordNotifier;
pub use slack::SlackNotifier;

const ENV_DISCORD_WEBHOOK: &str = "DISCORD_WEBHOOK_URL";
const ENV_SLACK_WEBHOOK: &str = "SLACK_WEBHOOK_URL";
const ENV_ALERT_COOLDOWN_SECS: &str = "ALERT_COOLDOWN_SECS";
const DEFAULT_ALERT_COOLDOWN_SECS: i64 = 300;

#[derive(Debug, Clone)]
pub struct BreakerEvent {
    pub source: String,
    pub from: BreakerState,
    pub to: BreakerState,
    pub backoff_ms: u64,
    pub at: DateTime<Utc>,
}

/// Alert direction, for throttling: repeated trips are noise, a recovery
/// after a trip is not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertDirection {
    Opened,
    Recovered,
}

impl BreakerEvent {
    pub fn direction(&self) -> AlertDirection {
        if self.to == BreakerState::Open {
            AlertDirection::Opened
        } else {
            AlertDirection::Recovered
        }
    }

    pub fn headline(&self) -> String {
        match self.direction() {
            AlertDirection::Opened => format!("Breaker opened: {}", self.source),
            AlertDirection::Recovered => format!("Breaker closed: {}", self.source),
        }
    }

    pub fn detail(&self) -> String {
        format!(
            "{} → {} (backoff {}ms)\n@ {}",
            self.from,
            self.to,
            self.backoff_ms,
            self.at.to_rfc3339()
        )
    }
}

#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, ev: &BreakerEvent) -> Result<()>;
    fn name(&self) -> &'static str;
}

/// Per-source cooldown. Within the window only a direction change passes;
/// a repeat of the same direction is suppressed.
pub struct AlertThrottle {
    cooldown: Duration,
    inner: Mutex<HashMap<String, (DateTime<Utc>, AlertDirection)>>,
}

impl AlertThrottle {
    pub fn new(cooldown_secs: i64) -> Self {
        Self {
            cooldown: Duration::seconds(cooldown_secs),
            inner: Mutex::new(HashMap::new()),
        }
    }

    pub fn should_alert(&self, source: &str, dir: AlertDirection, now: DateTime<Utc>) -> bool {
        let inner = self.inner.lock().expect("alert throttle mutex poisoned");
        match inner.get(source) {
            None => true,
            Some(&(last_at, last_dir)) => now - last_at >= self.cooldown || dir != last_dir,
        }
    }

    pub fn record_alert(&self, source: &str, dir: AlertDirection, now: DateTime<Utc>) {
        let mut inner = self.inner.lock().expect("alert throttle mutex poisoned");
        inner.insert(source.to_string(), (now, dir));
    }
}

/// Fan-out to every configured webhook sink. Errors are logged, never
/// propagated; alerting must not disturb the signal pipeline.
pub struct NotifierMux {
    sinks: Vec<Box<dyn Notifier>>,
    throttle: AlertThrottle,
}

impl NotifierMux {
    /// Build from env. `None` when no webhook is configured, so callers can
    /// skip alerting entirely.
    pub fn from_env() -> Option<Arc<Self>> {
        let mut sinks: Vec<Box<dyn Notifier>> = Vec::new();
        if let Ok(url) = std::env::var(ENV_DISCORD_WEBHOOK) {
            if !url.trim().is_empty() {
                sinks.push(Box::new(DiscordNotifier::new(url)));
            }
        }
        if let Ok(url) = std::env::var(ENV_SLACK_WEBHOOK) {
            if !url.trim().is_empty() {
                sinks.push(Box::new(SlackNotifier::new(url)));
            }
        }
        if sinks.is_empty() {
            return None;
        }

        let cooldown_secs = std::env::var(ENV_ALERT_COOLDOWN_SECS)
            .ok()
            .and_then(|s| s.trim().parse::<i64>().ok())
            .unwrap_or(DEFAULT_ALERT_COOLDOWN_SECS);
        Some(Arc::new(Self::with_sinks(sinks, cooldown_secs)))
    }

    pub fn with_sinks(sinks: Vec<Box<dyn Notifier>>, cooldown_secs: i64) -> Self {
        Self {
            sinks,
            throttle: AlertThrottle::new(cooldown_secs),
        }
    }

    pub async fn notify(&self, ev: &BreakerEvent) {
        let dir = ev.direction();
        if !self.throttle.should_alert(&ev.source, dir, ev.at) {
            tracing::debug!(target: "notify", source = %ev.source, "alert suppressed by cooldown");
            return;
        }
        // Record before sending so a failing sink cannot retrigger spam.
        self.throttle.record_alert(&ev.source, dir, ev.at);

        for sink in &self.sinks {
            if let Err(e) = sink.send(ev).await {
                tracing::warn!(
                    target: "notify",
                    error = ?e,
                    sink = sink.name(),
                    source = %ev.source,
                    "breaker alert failed"
                );
            }
        }
    }
}
