//! Types exchanged with the storage and monitoring collaborators.
//!
//! These types are serialised as JSON when carried across process or storage
//! boundaries.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Field identity
// ---------------------------------------------------------------------------

/// Stable identifier of one encrypted field: `(record_id, field)`.
///
/// Used both as the persistence lookup key and as the decryption cache key.
/// It is derivable without decrypting anything.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FieldKey {
    /// Identifier of the owning record (e.g. a case or evidence id).
    pub record_id: String,
    /// Name of the encrypted column within the record (e.g. `"description"`).
    pub field: String,
}

impl FieldKey {
    /// Construct a [`FieldKey`] from a record id and field name.
    pub fn new(record_id: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            record_id: record_id.into(),
            field: field.into(),
        }
    }

    /// Returns `true` if this key belongs to `record_id`.
    pub fn belongs_to(&self, record_id: &str) -> bool {
        self.record_id == record_id
    }
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.record_id, self.field)
    }
}

// ---------------------------------------------------------------------------
// Blob wire record
// ---------------------------------------------------------------------------

/// Serialised form of one encrypted field.
///
/// Ciphertext, nonce, and tag are each standard-base64 encoded and carried as
/// three distinct fields so their lengths can be validated before decoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobRecord {
    /// Base64 ciphertext (same byte length as the plaintext).
    pub ciphertext: String,
    /// Base64 96-bit nonce.
    pub nonce: String,
    /// Base64 128-bit authentication tag.
    pub tag: String,
}

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

/// Point-in-time copy of the cache and cipher counters.
///
/// Informational only; reading it never affects cache behaviour.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub invalidations: u64,
    pub decrypts: u64,
    pub encrypts: u64,
    pub integrity_failures: u64,
    /// Reads that waited on another caller's in-flight decrypt.
    pub coalesced_waits: u64,
}

impl MetricsSnapshot {
    /// Fraction of lookups served from the cache, in `[0.0, 1.0]`.
    ///
    /// Returns `0.0` when no lookups have been recorded.
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.hits + self.misses;
        if lookups == 0 {
            return 0.0;
        }
        self.hits as f64 / lookups as f64
    }

    /// Counter deltas since an earlier snapshot.
    pub fn since(&self, earlier: &MetricsSnapshot) -> MetricsSnapshot {
        MetricsSnapshot {
            hits: self.hits.saturating_sub(earlier.hits),
            misses: self.misses.saturating_sub(earlier.misses),
            evictions: self.evictions.saturating_sub(earlier.evictions),
            expirations: self.expirations.saturating_sub(earlier.expirations),
            invalidations: self.invalidations.saturating_sub(earlier.invalidations),
            decrypts: self.decrypts.saturating_sub(earlier.decrypts),
            encrypts: self.encrypts.saturating_sub(earlier.encrypts),
            integrity_failures: self
                .integrity_failures
                .saturating_sub(earlier.integrity_failures),
            coalesced_waits: self.coalesced_waits.saturating_sub(earlier.coalesced_waits),
        }
    }
}
