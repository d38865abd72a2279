//! Storage collaborator boundary.
//!
//! The vault never inspects how blobs are stored. A [`BlobStore`] keeps each
//! [`BlobRecord`] as an opaque value keyed by [`FieldKey`]; the relational
//! layer of the host application normally implements it.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::{BlobRecord, FieldKey};
use parking_lot::RwLock;
use thiserror::Error;

/// Errors reported by a storage collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The store could not be reached; the caller may retry the whole operation.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The store rejected the operation.
    #[error("store error: {0}")]
    Backend(String),
}

/// Persistence of encrypted blobs, keyed by field.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Fetch the stored record for `key`, or `None` if nothing is stored.
    async fn load(&self, key: &FieldKey) -> Result<Option<BlobRecord>, StoreError>;

    /// Durably store `record` for `key`, replacing any previous value.
    ///
    /// Returning `Ok` confirms durability.
    async fn store(&self, key: &FieldKey, record: BlobRecord) -> Result<(), StoreError>;

    /// Remove the stored value for `key`. Removing an absent key is not an error.
    async fn delete(&self, key: &FieldKey) -> Result<(), StoreError>;

    /// Remove every stored field of `record_id`.
    async fn delete_record(&self, record_id: &str) -> Result<(), StoreError>;
}

/// In-process [`BlobStore`] backed by a hash map.
///
/// Clones share the same contents.
#[derive(Clone, Debug, Default)]
pub struct MemoryBlobStore {
    inner: Arc<RwLock<HashMap<FieldKey, BlobRecord>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Read the raw stored record, bypassing the vault.
    pub fn raw(&self, key: &FieldKey) -> Option<BlobRecord> {
        self.inner.read().get(key).cloned()
    }

    /// Overwrite the raw stored record, bypassing the vault.
    ///
    /// Models a second process (or an attacker) changing the shared store.
    pub fn put_raw(&self, key: FieldKey, record: BlobRecord) {
        self.inner.write().insert(key, record);
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn load(&self, key: &FieldKey) -> Result<Option<BlobRecord>, StoreError> {
        Ok(self.raw(key))
    }

    async fn store(&self, key: &FieldKey, record: BlobRecord) -> Result<(), StoreError> {
        self.put_raw(key.clone(), record);
        Ok(())
    }

    async fn delete(&self, key: &FieldKey) -> Result<(), StoreError> {
        self.inner.write().remove(key);
        Ok(())
    }

    async fn delete_record(&self, record_id: &str) -> Result<(), StoreError> {
        self.inner.write().retain(|key, _| !key.belongs_to(record_id));
        Ok(())
    }
}
