//! User-facing error categories shared across crates.

use thiserror::Error;

/// Error category surfaced to the view layer.
///
/// Variants map to the way a field is presented to the user:
/// - [`ServiceError::Unreadable`] → shown as "cannot decrypt this value"
/// - [`ServiceError::NotFound`] → the field has no stored value
/// - [`ServiceError::Unavailable`] → transient; the whole request may be retried
/// - [`ServiceError::Internal`] → unexpected failure
///
/// A field that fails to decrypt is never rendered as empty or default content.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    /// The stored value failed integrity verification or is structurally corrupt.
    #[error("cannot decrypt this value")]
    Unreadable,

    /// No value is stored for the requested field.
    #[error("not found: {0}")]
    NotFound(String),

    /// The storage collaborator could not be reached or rejected the operation.
    #[error("service unavailable: {0}")]
    Unavailable(String),

    /// An unexpected internal error occurred.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// Short machine-readable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::Unreadable => "unreadable",
            ServiceError::NotFound(_) => "not_found",
            ServiceError::Unavailable(_) => "unavailable",
            ServiceError::Internal(_) => "internal_error",
        }
    }

    /// Returns `true` if retrying the whole request may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ServiceError::Unavailable(_))
    }
}
