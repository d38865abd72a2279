//! `field-vault`: encrypted field storage with a bounded decryption cache.
//!
//! Sensitive text fields are stored as AES-256-GCM blobs. Reads go through a
//! capacity-bounded LRU cache so repeated views of the same records do not pay
//! for decryption again, while writes go through to the cache only after the
//! storage collaborator confirms durability.
//!
//! Typical startup sequence for an embedding process:
//! 1. Load and validate [`VaultConfig`] from environment variables.
//! 2. Initialise logging with [`telemetry::init`].
//! 3. Read the [`MasterKey`] named by the configuration.
//! 4. Build a [`FieldVault`] over the application's [`BlobStore`].

pub mod cache;
pub mod config;
pub mod crypto;
pub mod keys;
pub mod metrics;
pub mod plaintext;
pub mod store;
pub mod telemetry;
pub mod vault;

pub use cache::{CacheError, DecryptionCache};
pub use common::{BlobRecord, FieldKey, MetricsSnapshot, ServiceError};
pub use config::VaultConfig;
pub use crypto::{CipherError, EncryptedBlob};
pub use keys::{KeyError, MasterKey};
pub use metrics::CacheMetrics;
pub use plaintext::Plaintext;
pub use store::{BlobStore, MemoryBlobStore, StoreError};
pub use vault::{FieldError, FieldVault, VaultSettings};
