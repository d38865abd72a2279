//! Shared fixtures for field-vault integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use field_vault::{
    BlobRecord, BlobStore, CacheMetrics, FieldKey, FieldVault, MasterKey, MemoryBlobStore,
    StoreError, VaultSettings,
};

/// Build a vault over `store` with the given cache capacity.
pub fn vault(key: &MasterKey, store: Arc<dyn BlobStore>, capacity: usize) -> FieldVault {
    let settings = VaultSettings {
        cache_capacity: capacity,
        ..Default::default()
    };
    FieldVault::new(key.clone(), store, settings, CacheMetrics::new()).unwrap()
}

/// `count` keys of the form `case-N/description`.
pub fn case_keys(count: usize) -> Vec<FieldKey> {
    (0..count)
        .map(|n| FieldKey::new(format!("case-{n}"), "description"))
        .collect()
}

pub fn description_for(key: &FieldKey) -> String {
    format!("confidential description of {}", key.record_id)
}

/// Populate `store` through a separate writer vault so the reader's cache
/// stays cold.
pub async fn seed(key: &MasterKey, store: &MemoryBlobStore, keys: &[FieldKey]) {
    let writer = vault(key, Arc::new(store.clone()), keys.len().max(1));
    for k in keys {
        writer.write_field(k, &description_for(k)).await.unwrap();
    }
}

/// A store that counts loads and answers them after a delay.
#[derive(Clone)]
pub struct SlowStore {
    pub inner: MemoryBlobStore,
    pub delay: Duration,
    pub loads: Arc<AtomicUsize>,
}

impl SlowStore {
    pub fn new(inner: MemoryBlobStore, delay: Duration) -> Self {
        Self {
            inner,
            delay,
            loads: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BlobStore for SlowStore {
    async fn load(&self, key: &FieldKey) -> Result<Option<BlobRecord>, StoreError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.inner.load(key).await
    }

    async fn store(&self, key: &FieldKey, record: BlobRecord) -> Result<(), StoreError> {
        self.inner.store(key, record).await
    }

    async fn delete(&self, key: &FieldKey) -> Result<(), StoreError> {
        self.inner.delete(key).await
    }

    async fn delete_record(&self, record_id: &str) -> Result<(), StoreError> {
        self.inner.delete_record(record_id).await
    }
}
