//! Common types, wire records, and errors shared across `field-vault` crates.

pub mod error;
pub mod protocol;

pub use error::ServiceError;
pub use protocol::{BlobRecord, FieldKey, MetricsSnapshot};
