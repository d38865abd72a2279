//! [`DecryptionCache`]: bounded LRU cache of decrypted field values.
//!
//! # Invariants
//!
//! - `len() <= capacity()` at all times. Inserting into a full cache evicts
//!   exactly one entry: the least recently touched by [`get`] or [`put`].
//! - A value is never served after [`invalidate`] for its key until a new
//!   [`put`]. The vault calls `invalidate` on every write and delete.
//! - A miss never inserts. Populating the cache after a decrypt is the
//!   caller's job, so the cache has no side effects tied to the cipher.
//!
//! All operations take one short-lived mutex; no lock is held across a
//! decrypt or an `.await`.
//!
//! [`get`]: DecryptionCache::get
//! [`put`]: DecryptionCache::put
//! [`invalidate`]: DecryptionCache::invalidate

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use common::FieldKey;
use lru::LruCache;
use parking_lot::Mutex;
use thiserror::Error;
use tracing::debug;

use crate::metrics::CacheMetrics;
use crate::plaintext::Plaintext;

/// Capacity measured as sufficient for a full list view.
pub const DEFAULT_CAPACITY: usize = 100;

/// Errors from the decryption cache.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The configured capacity is zero.
    #[error("cache capacity must be greater than zero, got {0}")]
    InvalidCapacity(usize),
}

#[derive(Debug)]
struct Entry {
    value: Plaintext,
    stored_at: Instant,
}

/// Shared, capacity-bounded LRU cache keyed by [`FieldKey`].
///
/// Cheap to clone; clones share the same entries and metrics.
#[derive(Clone, Debug)]
pub struct DecryptionCache {
    inner: Arc<Mutex<LruCache<FieldKey, Entry>>>,
    ttl: Option<Duration>,
    metrics: CacheMetrics,
}

impl DecryptionCache {
    /// Create a cache holding at most `capacity` entries, with no expiry.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::InvalidCapacity`] if `capacity` is zero.
    pub fn new(capacity: usize, metrics: CacheMetrics) -> Result<Self, CacheError> {
        Self::with_ttl(capacity, None, metrics)
    }

    /// Create a cache whose entries also expire `ttl` after they were stored.
    pub fn with_ttl(
        capacity: usize,
        ttl: Option<Duration>,
        metrics: CacheMetrics,
    ) -> Result<Self, CacheError> {
        let size = NonZeroUsize::new(capacity).ok_or(CacheError::InvalidCapacity(capacity))?;
        Ok(Self {
            inner: Arc::new(Mutex::new(LruCache::new(size))),
            ttl,
            metrics,
        })
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().cap().get()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    /// Look up `key`, marking it most recently used on a hit.
    ///
    /// Returns `None` on a miss. An expired entry is dropped and reported as a
    /// miss.
    pub fn get(&self, key: &FieldKey) -> Option<Plaintext> {
        self.get_with_now(key, Instant::now())
    }

    /// Insert or replace the value for `key` and mark it most recently used.
    ///
    /// When `key` is new and the cache is full, the least recently used entry
    /// is evicted first.
    pub fn put(&self, key: FieldKey, value: Plaintext) {
        self.put_with_now(key, value, Instant::now());
    }

    /// Remove `key` if present. Returns `true` if an entry was removed.
    pub fn invalidate(&self, key: &FieldKey) -> bool {
        let removed = self.inner.lock().pop(key).is_some();
        if removed {
            self.metrics.record_invalidation();
            debug!(record_id = %key.record_id, field = %key.field, "cache entry invalidated");
        }
        removed
    }

    /// Remove every entry belonging to `record_id`. Returns the number removed.
    pub fn invalidate_record(&self, record_id: &str) -> usize {
        let mut lru = self.inner.lock();
        let doomed: Vec<FieldKey> = lru
            .iter()
            .filter(|(key, _)| key.belongs_to(record_id))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &doomed {
            lru.pop(key);
            self.metrics.record_invalidation();
        }
        drop(lru);

        if !doomed.is_empty() {
            debug!(record_id = %record_id, removed = doomed.len(), "record invalidated");
        }
        doomed.len()
    }

    /// Remove every entry.
    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    /// Check presence without touching recency or counters.
    pub fn contains(&self, key: &FieldKey) -> bool {
        self.inner.lock().contains(key)
    }

    /// Read a live value without touching recency or counters.
    pub(crate) fn peek(&self, key: &FieldKey) -> Option<Plaintext> {
        let now = Instant::now();
        self.inner
            .lock()
            .peek(key)
            .filter(|entry| !self.is_expired(entry, now))
            .map(|entry| entry.value.clone())
    }

    #[cfg(test)]
    pub(crate) fn get_at(&self, key: &FieldKey, now: Instant) -> Option<Plaintext> {
        self.get_with_now(key, now)
    }

    #[cfg(test)]
    pub(crate) fn put_at(&self, key: FieldKey, value: Plaintext, now: Instant) {
        self.put_with_now(key, value, now);
    }

    fn get_with_now(&self, key: &FieldKey, now: Instant) -> Option<Plaintext> {
        let mut lru = self.inner.lock();

        let expired = lru.peek(key).map(|entry| self.is_expired(entry, now));

        let Some(expired) = expired else {
            drop(lru);
            self.metrics.record_miss();
            return None;
        };

        if expired {
            lru.pop(key);
            drop(lru);
            self.metrics.record_expiration();
            self.metrics.record_miss();
            return None;
        }

        let value = lru.get(key).map(|entry| entry.value.clone());
        drop(lru);
        self.metrics.record_hit();
        value
    }

    fn put_with_now(&self, key: FieldKey, value: Plaintext, now: Instant) {
        let entry = Entry {
            value,
            stored_at: now,
        };

        let mut lru = self.inner.lock();
        if lru.contains(&key) {
            lru.put(key, entry);
            return;
        }
        let evicted = lru.push(key, entry);
        drop(lru);

        if let Some((evicted_key, _)) = evicted {
            self.metrics.record_eviction();
            debug!(
                record_id = %evicted_key.record_id,
                field = %evicted_key.field,
                "evicted least recently used entry"
            );
        }
    }

    fn is_expired(&self, entry: &Entry, now: Instant) -> bool {
        match self.ttl {
            Some(ttl) => now.saturating_duration_since(entry.stored_at) >= ttl,
            None => false,
        }
    }
}
