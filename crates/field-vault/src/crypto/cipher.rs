//! AES-256-GCM encryption and decryption of individual fields.
//!
//! Every call to [`encrypt_field`] draws a fresh 96-bit nonce from the OS
//! CSPRNG. There is no nonce counter: a counter would reset on process restart
//! and GCM nonce reuse under one key breaks both confidentiality and
//! authentication.
//!
//! Decryption verifies the tag before any plaintext is released. A failed
//! verification is returned as [`CipherError::Integrity`] and is never retried.

use aes_gcm::{
    aead::{rand_core::RngCore, AeadInPlace, KeyInit, OsRng},
    Aes256Gcm, Key, Nonce, Tag,
};
use thiserror::Error;
use zeroize::Zeroizing;

use super::blob::{EncryptedBlob, NONCE_LEN, TAG_LEN};
use crate::keys::MasterKey;

/// Errors produced by the cipher layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CipherError {
    /// The authentication tag did not verify: tampered data or wrong key.
    #[error("integrity check failed")]
    Integrity,

    /// The blob is structurally invalid (bad lengths or encoding).
    #[error("malformed blob: {0}")]
    MalformedBlob(String),

    /// AES-GCM encryption failed (plaintext beyond the GCM length limit).
    #[error("aead encryption failed")]
    EncryptionFailure,
}

/// Encrypt a plaintext field using AES-256-GCM.
///
/// `associated_data` is authenticated but not encrypted; the same bytes must
/// be supplied to [`decrypt_field`]. Pass an empty slice for none.
///
/// # Errors
///
/// Returns [`CipherError::EncryptionFailure`] on an internal AEAD error
/// (unreachable for plaintexts under the 64 GiB GCM limit).
pub fn encrypt_field(
    plaintext: &[u8],
    key: &MasterKey,
    associated_data: &[u8],
) -> Result<EncryptedBlob, CipherError> {
    let cipher = build_cipher(key);

    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);

    let mut buffer = plaintext.to_vec();
    let tag = cipher
        .encrypt_in_place_detached(Nonce::from_slice(&nonce), associated_data, &mut buffer)
        .map_err(|_| CipherError::EncryptionFailure)?;

    let mut tag_bytes = [0u8; TAG_LEN];
    tag_bytes.copy_from_slice(tag.as_slice());

    Ok(EncryptedBlob::new(buffer, nonce, tag_bytes))
}

/// Decrypt an [`EncryptedBlob`] back to plaintext bytes.
///
/// The returned buffer is zeroed when dropped.
///
/// # Errors
///
/// Returns [`CipherError::Integrity`] if authentication fails (wrong key,
/// wrong associated data, or any tampered byte in ciphertext, nonce, or tag).
pub fn decrypt_field(
    blob: &EncryptedBlob,
    key: &MasterKey,
    associated_data: &[u8],
) -> Result<Zeroizing<Vec<u8>>, CipherError> {
    let cipher = build_cipher(key);
    let mut buffer = Zeroizing::new(blob.ciphertext().to_vec());
    cipher
        .decrypt_in_place_detached(
            Nonce::from_slice(blob.nonce()),
            associated_data,
            buffer.as_mut_slice(),
            Tag::from_slice(blob.tag()),
        )
        .map_err(|_| CipherError::Integrity)?;
    Ok(buffer)
}

fn build_cipher(key: &MasterKey) -> Aes256Gcm {
    Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()))
}
