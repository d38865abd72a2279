//! [`FieldVault`]: the only entry point callers use to read and write
//! encrypted fields.
//!
//! # Read path
//!
//! cache hit → return. Miss → join (or start) the single in-flight decrypt for
//! that key → load the blob from the [`BlobStore`] → decrypt on the blocking
//! pool → populate the cache → release every waiter with the same value.
//!
//! # Write path
//!
//! encrypt → persist → (only on confirmed persistence) drop any in-flight
//! decrypt for the key, invalidate, and put the new plaintext (write-through).
//! Mutations of one record are serialised so the cache commit order matches
//! the persistence order.
//!
//! # Invariants
//!
//! - The cache never serves a value older than the last successful write.
//!   A decrypt that was in flight when a write or delete landed never
//!   populates the cache.
//! - Cryptographic and structural failures propagate unchanged and are never
//!   retried.

use std::collections::HashMap;
use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use common::{BlobRecord, FieldKey, MetricsSnapshot, ServiceError};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::{OnceCell, OwnedMutexGuard, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use zeroize::Zeroizing;

use crate::cache::{CacheError, DecryptionCache, DEFAULT_CAPACITY};
use crate::crypto::{decrypt_field, encrypt_field, CipherError, EncryptedBlob};
use crate::keys::MasterKey;
use crate::metrics::CacheMetrics;
use crate::plaintext::Plaintext;
use crate::store::{BlobStore, StoreError};

/// Errors returned by [`FieldVault`] operations.
///
/// `Clone` so that one coalesced decrypt outcome reaches every waiter intact.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldError {
    /// Tag verification failed: the stored value was tampered with or was
    /// encrypted under another key or for another field.
    #[error("integrity check failed")]
    Integrity,

    /// The stored blob is structurally invalid.
    #[error("malformed blob: {0}")]
    MalformedBlob(String),

    /// Nothing is stored for the field.
    #[error("no value stored for {0}")]
    NotFound(FieldKey),

    /// The storage collaborator failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The decrypted bytes are not UTF-8 text.
    #[error("decrypted value is not valid UTF-8")]
    NotUtf8,

    /// AES-GCM encryption failed.
    #[error("encryption failed")]
    EncryptionFailure,

    /// The record id is too long to be bound into the associated data.
    #[error("record id of {0} bytes exceeds the binding limit")]
    RecordIdTooLong(usize),

    /// A decrypt worker task panicked or was cancelled.
    #[error("decrypt worker failed: {0}")]
    Worker(String),
}

impl From<CipherError> for FieldError {
    fn from(err: CipherError) -> Self {
        match err {
            CipherError::Integrity => FieldError::Integrity,
            CipherError::MalformedBlob(reason) => FieldError::MalformedBlob(reason),
            CipherError::EncryptionFailure => FieldError::EncryptionFailure,
        }
    }
}

impl From<FieldError> for ServiceError {
    fn from(err: FieldError) -> Self {
        match err {
            FieldError::Integrity | FieldError::MalformedBlob(_) | FieldError::NotUtf8 => {
                ServiceError::Unreadable
            }
            FieldError::NotFound(key) => ServiceError::NotFound(key.to_string()),
            FieldError::Store(StoreError::Unavailable(msg)) => ServiceError::Unavailable(msg),
            other => ServiceError::Internal(other.to_string()),
        }
    }
}

/// Tunables for a [`FieldVault`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultSettings {
    /// Maximum number of decrypted values held in memory.
    pub cache_capacity: usize,
    /// Optional expiry of cached values, measured from when they were stored.
    pub entry_ttl: Option<Duration>,
    /// Concurrent decrypts allowed in a bulk read; `0` means one per core.
    /// Values above [`Semaphore::MAX_PERMITS`] are clamped.
    pub decrypt_workers: usize,
}

impl Default for VaultSettings {
    fn default() -> Self {
        Self {
            cache_capacity: DEFAULT_CAPACITY,
            entry_ttl: None,
            decrypt_workers: 0,
        }
    }
}

type Outcome = Result<Plaintext, FieldError>;

/// One decrypt in progress, shared by every caller that missed on its key.
#[derive(Default)]
struct Flight {
    outcome: OnceCell<Outcome>,
}

enum Joined {
    Cached(Plaintext),
    Leader(Arc<Flight>),
    Waiter(Arc<Flight>),
}

struct Inner {
    key: MasterKey,
    store: Arc<dyn BlobStore>,
    cache: DecryptionCache,
    metrics: CacheMetrics,
    flights: Mutex<HashMap<FieldKey, Arc<Flight>>>,
    record_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    workers: Arc<Semaphore>,
    worker_count: usize,
}

/// Encrypted-field access with a bounded, write-through decryption cache.
///
/// Cheap to clone; clones share the key, cache, store, and metrics.
#[derive(Clone)]
pub struct FieldVault {
    inner: Arc<Inner>,
}

impl FieldVault {
    /// Build a vault over `store`, encrypting with `key`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::InvalidCapacity`] if `settings.cache_capacity` is zero.
    pub fn new(
        key: MasterKey,
        store: Arc<dyn BlobStore>,
        settings: VaultSettings,
        metrics: CacheMetrics,
    ) -> Result<Self, CacheError> {
        let cache =
            DecryptionCache::with_ttl(settings.cache_capacity, settings.entry_ttl, metrics.clone())?;
        let worker_count = match settings.decrypt_workers {
            0 => std::thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(1),
            n => n.min(Semaphore::MAX_PERMITS),
        };

        debug!(
            capacity = settings.cache_capacity,
            workers = worker_count,
            ttl_secs = settings.entry_ttl.map(|t| t.as_secs()),
            "field vault ready"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                key,
                store,
                cache,
                metrics,
                flights: Mutex::new(HashMap::new()),
                record_locks: Mutex::new(HashMap::new()),
                workers: Arc::new(Semaphore::new(worker_count)),
                worker_count,
            }),
        })
    }

    /// The decryption cache backing this vault.
    pub fn cache(&self) -> &DecryptionCache {
        &self.inner.cache
    }

    /// Current counter values.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.inner.metrics.snapshot()
    }

    /// Number of concurrent decrypts allowed in a bulk read.
    pub fn worker_count(&self) -> usize {
        self.inner.worker_count
    }

    /// Read and decrypt one field, loading its blob from the store on a miss.
    pub async fn read_field(&self, key: &FieldKey) -> Result<Plaintext, FieldError> {
        self.read_field_with(key, || self.inner.store.load(key)).await
    }

    /// Read and decrypt one field, calling `loader` for the blob on a miss.
    ///
    /// `loader` is not called on a hit, nor when another caller's decrypt for
    /// the same key is already in flight.
    ///
    /// # Errors
    ///
    /// [`FieldError::Integrity`] and [`FieldError::MalformedBlob`] are
    /// returned unchanged; the field must be shown as unreadable.
    pub async fn read_field_with<F, Fut>(
        &self,
        key: &FieldKey,
        loader: F,
    ) -> Result<Plaintext, FieldError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<BlobRecord>, StoreError>>,
    {
        if let Some(hit) = self.inner.cache.get(key) {
            return Ok(hit);
        }
        self.fetch(key, loader).await
    }

    /// Read many fields, decrypting misses concurrently.
    ///
    /// Hits are served inline. Misses are decrypted on the blocking pool, at
    /// most [`worker_count`](Self::worker_count) at a time. Results are in the
    /// order of `keys`; one failing field does not fail the others.
    pub async fn read_fields(&self, keys: &[FieldKey]) -> Vec<Result<Plaintext, FieldError>> {
        enum Slot {
            Ready(Outcome),
            Pending(JoinHandle<Outcome>),
        }

        let slots: Vec<Slot> = keys
            .iter()
            .map(|key| match self.inner.cache.get(key) {
                Some(hit) => Slot::Ready(Ok(hit)),
                None => Slot::Pending(self.spawn_fetch(key.clone())),
            })
            .collect();

        let mut results = Vec::with_capacity(slots.len());
        for slot in slots {
            let outcome = match slot {
                Slot::Ready(outcome) => outcome,
                Slot::Pending(handle) => handle
                    .await
                    .unwrap_or_else(|e| Err(FieldError::Worker(e.to_string()))),
            };
            results.push(outcome);
        }
        results
    }

    /// Encrypt and persist `plaintext`, then write it through to the cache.
    ///
    /// The cache is only touched after the store confirms durability.
    ///
    /// # Errors
    ///
    /// Returns [`FieldError::Store`] if persistence fails; the cache is left
    /// unchanged and the caller may retry the whole write.
    pub async fn write_field(
        &self,
        key: &FieldKey,
        plaintext: &str,
    ) -> Result<EncryptedBlob, FieldError> {
        let blob = encrypt_field(plaintext.as_bytes(), &self.inner.key, &field_binding(key)?)?;
        self.inner.metrics.record_encrypt();

        let _lock = self.lock_record(&key.record_id).await;
        let mut mutation = Mutation::new(&self.inner, Target::Field(key));

        if let Err(e) = self.inner.store.store(key, blob.to_record()).await {
            mutation.abandon();
            warn!(record_id = %key.record_id, field = %key.field, error = %e, "persisting field failed");
            return Err(e.into());
        }

        mutation.commit(Some(Plaintext::from(plaintext)));
        Ok(blob)
    }

    /// Delete one field from the store and drop it from the cache.
    pub async fn delete_field(&self, key: &FieldKey) -> Result<(), FieldError> {
        let _lock = self.lock_record(&key.record_id).await;
        let mut mutation = Mutation::new(&self.inner, Target::Field(key));

        if let Err(e) = self.inner.store.delete(key).await {
            mutation.abandon();
            warn!(record_id = %key.record_id, field = %key.field, error = %e, "deleting field failed");
            return Err(e.into());
        }

        mutation.commit(None);
        Ok(())
    }

    /// Delete every field of `record_id` from the store and the cache.
    pub async fn delete_record(&self, record_id: &str) -> Result<(), FieldError> {
        let _lock = self.lock_record(record_id).await;
        let mut mutation = Mutation::new(&self.inner, Target::Record(record_id));

        if let Err(e) = self.inner.store.delete_record(record_id).await {
            mutation.abandon();
            warn!(record_id = %record_id, error = %e, "deleting record failed");
            return Err(e.into());
        }

        mutation.commit(None);
        Ok(())
    }

    fn spawn_fetch(&self, key: FieldKey) -> JoinHandle<Outcome> {
        let vault = self.clone();
        let permits = Arc::clone(&self.inner.workers);
        tokio::spawn(async move {
            // The semaphore is never closed.
            let _permit = permits.acquire_owned().await.ok();
            vault.fetch(&key, || vault.inner.store.load(&key)).await
        })
    }

    /// Miss path: join or lead the single in-flight decrypt for `key`.
    async fn fetch<F, Fut>(&self, key: &FieldKey, loader: F) -> Outcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<BlobRecord>, StoreError>>,
    {
        let flight = match self.join_flight(key) {
            Joined::Cached(value) => return Ok(value),
            Joined::Leader(flight) => flight,
            Joined::Waiter(flight) => {
                self.inner.metrics.record_coalesced_wait();
                flight
            }
        };

        // If the leader is cancelled, the next waiter runs its own loader.
        let joined = JoinedFlight {
            inner: &self.inner,
            key,
            flight,
        };
        joined
            .flight
            .outcome
            .get_or_init(|| async {
                let outcome = self.load_and_decrypt(key, loader).await;
                self.land(key, &joined.flight, &outcome);
                outcome
            })
            .await
            .clone()
    }

    fn join_flight(&self, key: &FieldKey) -> Joined {
        let mut flights = self.inner.flights.lock();
        if let Some(flight) = flights.get(key) {
            return Joined::Waiter(Arc::clone(flight));
        }
        // A flight may have landed between our miss and taking the lock.
        if let Some(value) = self.inner.cache.peek(key) {
            return Joined::Cached(value);
        }
        let flight = Arc::new(Flight::default());
        flights.insert(key.clone(), Arc::clone(&flight));
        Joined::Leader(flight)
    }

    /// Deregister a finished flight and cache its value, unless a write or
    /// delete has superseded it.
    fn land(&self, key: &FieldKey, flight: &Arc<Flight>, outcome: &Outcome) {
        let mut flights = self.inner.flights.lock();
        let current = flights
            .get(key)
            .is_some_and(|registered| Arc::ptr_eq(registered, flight));
        if !current {
            debug!(record_id = %key.record_id, field = %key.field, "superseded decrypt not cached");
            return;
        }
        flights.remove(key);
        if let Ok(value) = outcome {
            self.inner.cache.put(key.clone(), value.clone());
        }
    }

    async fn load_and_decrypt<F, Fut>(&self, key: &FieldKey, loader: F) -> Outcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<BlobRecord>, StoreError>>,
    {
        let record = loader()
            .await?
            .ok_or_else(|| FieldError::NotFound(key.clone()))?;

        let blob = EncryptedBlob::from_record(&record).map_err(|e| {
            warn!(record_id = %key.record_id, field = %key.field, error = %e, "stored blob is malformed");
            FieldError::from(e)
        })?;

        let inner = Arc::clone(&self.inner);
        let key = key.clone();
        tokio::task::spawn_blocking(move || inner.decrypt(&key, &blob))
            .await
            .map_err(|e| FieldError::Worker(e.to_string()))?
    }

    async fn lock_record(&self, record_id: &str) -> RecordGuard<'_> {
        let lock = {
            let mut locks = self.inner.record_locks.lock();
            Arc::clone(locks.entry(record_id.to_owned()).or_default())
        };
        let guard = lock.lock_owned().await;
        RecordGuard {
            inner: &self.inner,
            record_id: record_id.to_owned(),
            guard: Some(guard),
        }
    }
}

impl std::fmt::Debug for FieldVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldVault")
            .field("cache", &self.inner.cache)
            .field("workers", &self.inner.worker_count)
            .finish_non_exhaustive()
    }
}

impl Inner {
    fn decrypt(&self, key: &FieldKey, blob: &EncryptedBlob) -> Outcome {
        self.metrics.record_decrypt();

        let bytes = decrypt_field(blob, &self.key, &field_binding(key)?).map_err(|e| {
            if e == CipherError::Integrity {
                self.metrics.record_integrity_failure();
                warn!(record_id = %key.record_id, field = %key.field, "field failed integrity verification");
            }
            FieldError::from(e)
        })?;

        let text = String::from_utf8(bytes.to_vec()).map_err(|e| {
            drop(Zeroizing::new(e.into_bytes()));
            FieldError::NotUtf8
        })?;
        Ok(Plaintext::from(text))
    }
}

/// Authenticated binding of a blob to its field: `len(record_id) BE u32 ‖
/// record_id ‖ field`. A blob copied onto another field fails verification.
fn field_binding(key: &FieldKey) -> Result<Vec<u8>, FieldError> {
    let record = key.record_id.as_bytes();
    let field = key.field.as_bytes();
    let prefix = binding_prefix(record.len())?;
    let mut ad = Vec::with_capacity(prefix.len() + record.len() + field.len());
    ad.extend_from_slice(&prefix);
    ad.extend_from_slice(record);
    ad.extend_from_slice(field);
    Ok(ad)
}

fn binding_prefix(record_len: usize) -> Result<[u8; 4], FieldError> {
    u32::try_from(record_len)
        .map(u32::to_be_bytes)
        .map_err(|_| FieldError::RecordIdTooLong(record_len))
}

// ---------------------------------------------------------------------------
// Mutation bookkeeping
// ---------------------------------------------------------------------------

#[derive(Clone, Copy)]
enum Target<'a> {
    Field(&'a FieldKey),
    Record(&'a str),
}

/// Cache side of one write or delete.
///
/// Settled by [`commit`](Mutation::commit) after confirmed persistence or by
/// [`abandon`](Mutation::abandon) after a store error. If dropped unsettled
/// (the caller was cancelled while the store call was pending) the target is
/// invalidated, since persistence may or may not have happened.
struct Mutation<'a> {
    inner: &'a Inner,
    target: Target<'a>,
    settled: bool,
}

impl<'a> Mutation<'a> {
    fn new(inner: &'a Inner, target: Target<'a>) -> Self {
        Self {
            inner,
            target,
            settled: false,
        }
    }

    fn abandon(&mut self) {
        self.settled = true;
    }

    fn commit(&mut self, value: Option<Plaintext>) {
        self.settled = true;
        let mut flights = self.inner.flights.lock();
        match self.target {
            Target::Field(key) => {
                flights.remove(key);
                self.inner.cache.invalidate(key);
                if let Some(value) = value {
                    self.inner.cache.put(key.clone(), value);
                }
            }
            Target::Record(record_id) => {
                flights.retain(|key, _| !key.belongs_to(record_id));
                self.inner.cache.invalidate_record(record_id);
            }
        }
    }
}

impl Drop for Mutation<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.commit(None);
        }
    }
}

/// One caller's membership in a flight.
///
/// When the last caller of an unfinished flight is dropped, the flight is
/// deregistered so the next read of the key starts afresh.
struct JoinedFlight<'a> {
    inner: &'a Inner,
    key: &'a FieldKey,
    flight: Arc<Flight>,
}

impl Drop for JoinedFlight<'_> {
    fn drop(&mut self) {
        let mut flights = self.inner.flights.lock();
        // The map holds one reference and this caller the other.
        let abandoned = flights.get(self.key).is_some_and(|registered| {
            Arc::ptr_eq(registered, &self.flight) && Arc::strong_count(&self.flight) == 2
        });
        if abandoned {
            flights.remove(self.key);
            debug!(record_id = %self.key.record_id, field = %self.key.field, "abandoned decrypt released");
        }
    }
}

/// Exclusive access to one record's mutations.
struct RecordGuard<'a> {
    inner: &'a Inner,
    record_id: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for RecordGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut locks = self.inner.record_locks.lock();
        if locks
            .get(&self.record_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.record_id);
        }
    }
}
