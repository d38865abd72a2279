//! [`Plaintext`]: a shared handle to one decrypted field value.

use std::sync::Arc;

use zeroize::Zeroizing;

/// Decrypted field text.
///
/// Cloning is cheap (reference counted), so the cache and every caller can
/// hold the same value. The text is zeroed when the last handle is dropped and
/// is never printed by `Debug`.
#[derive(Clone, PartialEq, Eq)]
pub struct Plaintext(Arc<Zeroizing<String>>);

impl Plaintext {
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns `true` if both handles point at the same allocation.
    pub fn ptr_eq(&self, other: &Plaintext) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl From<String> for Plaintext {
    fn from(value: String) -> Self {
        Self(Arc::new(Zeroizing::new(value)))
    }
}

impl From<&str> for Plaintext {
    fn from(value: &str) -> Self {
        Self::from(value.to_owned())
    }
}

impl AsRef<str> for Plaintext {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl PartialEq<str> for Plaintext {
    fn eq(&self, other: &str) -> bool {
        self.as_str() == other
    }
}

impl PartialEq<&str> for Plaintext {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}

impl PartialEq<String> for Plaintext {
    fn eq(&self, other: &String) -> bool {
        self.as_str() == other
    }
}

impl std::fmt::Debug for Plaintext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Plaintext([REDACTED; {} bytes])", self.len())
    }
}
