//! AES-256-GCM field encryption primitives and the encrypted blob format.
//!
//! This module is intentionally free of cache and storage dependencies.
//! It provides the low-level encrypt/decrypt operations used by the vault layer.
//!
//! # Blob format
//!
//! ```text
//! { "ciphertext": base64(ct), "nonce": base64(12 bytes), "tag": base64(16 bytes) }
//! ```
//!
//! The three parts are carried independently (never concatenated) so their
//! encoded lengths can be checked before any base64 decoding happens.

pub mod blob;
pub mod cipher;

pub use blob::{EncryptedBlob, NONCE_LEN, TAG_LEN};
pub use cipher::{decrypt_field, encrypt_field, CipherError};
