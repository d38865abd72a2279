//! [`CacheMetrics`]: counters for the monitoring collaborator.
//!
//! A collector is created by the embedder and passed explicitly into
//! [`DecryptionCache::new`](crate::cache::DecryptionCache::new) and
//! [`FieldVault::new`](crate::vault::FieldVault::new). Clones share the same
//! counters. Counters never influence cache behaviour.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use common::MetricsSnapshot;

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
    invalidations: AtomicU64,
    decrypts: AtomicU64,
    encrypts: AtomicU64,
    integrity_failures: AtomicU64,
    coalesced_waits: AtomicU64,
}

/// Shared, lock-free counters for cache and cipher activity.
#[derive(Clone, Debug, Default)]
pub struct CacheMetrics {
    inner: Arc<Counters>,
}

impl CacheMetrics {
    /// Create a new collector with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_hit(&self) {
        self.inner.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_miss(&self) {
        self.inner.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_eviction(&self) {
        self.inner.evictions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_expiration(&self) {
        self.inner.expirations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_invalidation(&self) {
        self.inner.invalidations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_decrypt(&self) {
        self.inner.decrypts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_encrypt(&self) {
        self.inner.encrypts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_integrity_failure(&self) {
        self.inner.integrity_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_coalesced_wait(&self) {
        self.inner.coalesced_waits.fetch_add(1, Ordering::Relaxed);
    }

    /// Read all counters into a [`MetricsSnapshot`].
    ///
    /// Counters are read individually, so a snapshot taken under concurrent
    /// load is not a single atomic cut.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let c = &self.inner;
        MetricsSnapshot {
            hits: c.hits.load(Ordering::Relaxed),
            misses: c.misses.load(Ordering::Relaxed),
            evictions: c.evictions.load(Ordering::Relaxed),
            expirations: c.expirations.load(Ordering::Relaxed),
            invalidations: c.invalidations.load(Ordering::Relaxed),
            decrypts: c.decrypts.load(Ordering::Relaxed),
            encrypts: c.encrypts.load(Ordering::Relaxed),
            integrity_failures: c.integrity_failures.load(Ordering::Relaxed),
            coalesced_waits: c.coalesced_waits.load(Ordering::Relaxed),
        }
    }
}
