//! # Snapshot Cache (L2)
//! Single-cell store of the last-known-good merged snapshot. The aggregator
//! overwrites it on every fresh merge and reads it back when all sources are
//! down; staleness policy (fresh TTL, outer serve-stale window) lives in the
//! aggregator, not here.

use std::sync::{Arc, Mutex};

use crate::clock::Clock;
use crate::signals::types::SignalItem;

/// What `stale_but_serveable` hands back: the payload plus its age.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedView {
    pub etag: String,
    pub items: Vec<SignalItem>,
    pub sources_ok: Vec<String>,
    pub cached_at_ms: u64,
    pub age_ms: u64,
}

#[derive(Debug)]
struct Stored {
    etag: String,
    items: Vec<SignalItem>,
    sources_ok: Vec<String>,
    cached_at_ms: u64,
}

/// Last-write-wins snapshot cell. Reads clone out; writers never wait on
/// readers beyond the short lock.
pub struct SnapshotCache {
    inner: Mutex<Option<Stored>>,
    clock: Arc<dyn Clock>,
}

impl SnapshotCache {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Mutex::new(None),
            clock,
        }
    }

    /// Overwrite unconditionally with a fresh timestamp and derived etag.
    pub fn set(&self, items: Vec<SignalItem>, sources_ok: Vec<String>) {
        let stored = Stored {
            etag: compute_etag(&items),
            items,
            sources_ok,
            cached_at_ms: self.clock.now_ms(),
        };
        let mut inner = self.inner.lock().expect("snapshot cache mutex poisoned");
        *inner = Some(stored);
    }

    /// Most recent snapshot regardless of freshness, with its age. `None`
    /// only when nothing was ever cached (or after `clear`).
    pub fn stale_but_serveable(&self) -> Option<CachedView> {
        let inner = self.inner.lock().expect("snapshot cache mutex poisoned");
        inner.as_ref().map(|stored| CachedView {
            etag: stored.etag.clone(),
            items: stored.items.clone(),
            sources_ok: stored.sources_ok.clone(),
            cached_at_ms: stored.cached_at_ms,
            age_ms: self.clock.now_ms().saturating_sub(stored.cached_at_ms),
        })
    }

    /// Ops/test hook. Normal operation only ever overwrites.
    pub fn clear(&self) {
        let mut inner = self.inner.lock().expect("snapshot cache mutex poisoned");
        *inner = None;
    }
}

impl std::fmt::Debug for SnapshotCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotCache").finish_non_exhaustive()
    }
}

/// Content digest over the fields that identify a payload. 16 hex chars is
/// plenty for an HTTP validator; collisions only cost a spurious 200.
pub fn compute_etag(items: &[SignalItem]) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    for it in items {
        hasher.update(it.source.as_bytes());
        hasher.update([0u8]);
        hasher.update(it.key.as_bytes());
        hasher.update([0u8]);
        hasher.update(it.value.to_le_bytes());
        hasher.update(it.observed_at.to_le_bytes());
    }
    hasher.update((items.len() as u64).to_le_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(16);
    for b in digest.iter().take(8) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}
