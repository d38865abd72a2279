//! [`EncryptedBlob`]: one encrypted field and its three-part wire codec.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use common::BlobRecord;

use super::cipher::CipherError;

/// Byte length of an AES-GCM nonce (12 bytes = 96 bits).
pub const NONCE_LEN: usize = 12;

/// Byte length of an AES-GCM authentication tag (16 bytes = 128 bits).
pub const TAG_LEN: usize = 16;

/// Padded standard-base64 length of a [`NONCE_LEN`]-byte nonce.
const ENCODED_NONCE_LEN: usize = 16;

/// Padded standard-base64 length of a [`TAG_LEN`]-byte tag.
const ENCODED_TAG_LEN: usize = 24;

/// A single encrypted field value.
///
/// Immutable once created; an update replaces the whole blob. The ciphertext
/// is exactly as long as the plaintext it protects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedBlob {
    ciphertext: Vec<u8>,
    nonce: [u8; NONCE_LEN],
    tag: [u8; TAG_LEN],
}

impl EncryptedBlob {
    pub(crate) fn new(ciphertext: Vec<u8>, nonce: [u8; NONCE_LEN], tag: [u8; TAG_LEN]) -> Self {
        Self {
            ciphertext,
            nonce,
            tag,
        }
    }

    /// Assemble a blob from raw parts, validating the nonce and tag lengths.
    ///
    /// # Errors
    ///
    /// Returns [`CipherError::MalformedBlob`] if `nonce` is not [`NONCE_LEN`]
    /// bytes or `tag` is not [`TAG_LEN`] bytes.
    pub fn from_parts(ciphertext: Vec<u8>, nonce: &[u8], tag: &[u8]) -> Result<Self, CipherError> {
        let nonce: [u8; NONCE_LEN] = nonce.try_into().map_err(|_| {
            CipherError::MalformedBlob(format!(
                "nonce must be {NONCE_LEN} bytes, got {}",
                nonce.len()
            ))
        })?;
        let tag: [u8; TAG_LEN] = tag.try_into().map_err(|_| {
            CipherError::MalformedBlob(format!("tag must be {TAG_LEN} bytes, got {}", tag.len()))
        })?;
        Ok(Self::new(ciphertext, nonce, tag))
    }

    pub fn ciphertext(&self) -> &[u8] {
        &self.ciphertext
    }

    pub fn nonce(&self) -> &[u8; NONCE_LEN] {
        &self.nonce
    }

    pub fn tag(&self) -> &[u8; TAG_LEN] {
        &self.tag
    }

    /// Encode this blob into its three-field wire record.
    pub fn to_record(&self) -> BlobRecord {
        BlobRecord {
            ciphertext: STANDARD.encode(&self.ciphertext),
            nonce: STANDARD.encode(self.nonce),
            tag: STANDARD.encode(self.tag),
        }
    }

    /// Decode a wire record back into an [`EncryptedBlob`].
    ///
    /// Encoded lengths are checked before anything is base64-decoded.
    ///
    /// # Errors
    ///
    /// Returns [`CipherError::MalformedBlob`] if any part has the wrong encoded
    /// length, is not valid base64, or decodes to the wrong number of bytes.
    pub fn from_record(record: &BlobRecord) -> Result<Self, CipherError> {
        if record.nonce.len() != ENCODED_NONCE_LEN {
            return Err(CipherError::MalformedBlob(format!(
                "encoded nonce must be {ENCODED_NONCE_LEN} chars, got {}",
                record.nonce.len()
            )));
        }
        if record.tag.len() != ENCODED_TAG_LEN {
            return Err(CipherError::MalformedBlob(format!(
                "encoded tag must be {ENCODED_TAG_LEN} chars, got {}",
                record.tag.len()
            )));
        }
        if record.ciphertext.len() % 4 != 0 {
            return Err(CipherError::MalformedBlob(
                "encoded ciphertext length is not a multiple of 4".into(),
            ));
        }

        let nonce = decode_part(&record.nonce, "nonce")?;
        let tag = decode_part(&record.tag, "tag")?;
        let ciphertext = decode_part(&record.ciphertext, "ciphertext")?;
        Self::from_parts(ciphertext, &nonce, &tag)
    }

    /// Encode this blob as a JSON object, for storage in a single text column.
    ///
    /// # Errors
    ///
    /// Returns the serialiser's error; a record of three strings does not
    /// fail in practice.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.to_record())
    }

    /// Parse a blob from the JSON produced by [`EncryptedBlob::to_json`].
    ///
    /// # Errors
    ///
    /// Returns [`CipherError::MalformedBlob`] if the JSON does not hold the
    /// three expected string fields or any of them fails validation.
    pub fn from_json(json: &str) -> Result<Self, CipherError> {
        let record: BlobRecord = serde_json::from_str(json)
            .map_err(|e| CipherError::MalformedBlob(format!("invalid blob json: {e}")))?;
        Self::from_record(&record)
    }
}

fn decode_part(encoded: &str, part: &str) -> Result<Vec<u8>, CipherError> {
    STANDARD
        .decode(encoded)
        .map_err(|_| CipherError::MalformedBlob(format!("{part} is not valid base64")))
}
