//! [`MasterKey`]: the process-wide 256-bit field encryption key.
//!
//! The key is supplied once at startup from an external secret source and
//! lives for the process lifetime. It is never logged, never serialised, and
//! its bytes are zeroed when the last copy is dropped.

use aes_gcm::aead::{rand_core::RngCore, OsRng};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// Byte length of an AES-256 key (32 bytes = 256 bits).
pub const KEY_LEN: usize = 32;

/// Errors produced while provisioning the master key.
#[derive(Debug, Error)]
pub enum KeyError {
    /// The key material has an unexpected length.
    #[error("master key has invalid length: expected {KEY_LEN} bytes, got {0}")]
    InvalidLength(usize),

    /// The named environment variable is not set.
    #[error("master key variable {0} is not set")]
    Missing(String),

    /// The key material is not valid base64.
    #[error("master key is not valid base64")]
    InvalidEncoding,
}

/// Fixed-size key buffer holding exactly [`KEY_LEN`] bytes.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MasterKey {
    bytes: [u8; KEY_LEN],
}

impl MasterKey {
    /// Build a key from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::InvalidLength`] if `bytes` is not [`KEY_LEN`] long.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KeyError> {
        let bytes: [u8; KEY_LEN] = bytes
            .try_into()
            .map_err(|_| KeyError::InvalidLength(bytes.len()))?;
        Ok(Self { bytes })
    }

    /// Build a key from standard base64 text.
    pub fn from_base64(encoded: &str) -> Result<Self, KeyError> {
        let decoded = Zeroizing::new(
            STANDARD
                .decode(encoded.trim())
                .map_err(|_| KeyError::InvalidEncoding)?,
        );
        Self::from_bytes(&decoded)
    }

    /// Read a base64-encoded key from the environment variable `var`.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::Missing`] if the variable is unset, otherwise the
    /// errors of [`MasterKey::from_base64`].
    pub fn from_env(var: &str) -> Result<Self, KeyError> {
        let value =
            Zeroizing::new(std::env::var(var).map_err(|_| KeyError::Missing(var.to_owned()))?);
        Self::from_base64(&value)
    }

    /// Generate a fresh random key from the OS CSPRNG.
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut bytes);
        Self { bytes }
    }

    pub(crate) fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print key material, not even in debug builds.
        f.write_str("MasterKey([REDACTED])")
    }
}
