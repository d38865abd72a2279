//! Structured logging for processes embedding the vault.
//!
//! Events carry field keys (record id and field name) only. Plaintext and key
//! material are never logged; both types redact themselves in `Debug`.
//!
//! `RUST_LOG`, when set, takes precedence over the configured level.

use anyhow::{Context, Result};
use tracing::Subscriber;
use tracing_subscriber::EnvFilter;

/// Install the JSON subscriber as the process-wide default.
///
/// # Errors
///
/// Returns an error if `log_level` is not a valid filter or a global
/// subscriber is already installed.
pub fn init(log_level: &str) -> Result<()> {
    tracing::subscriber::set_global_default(subscriber(log_level)?)
        .context("failed to initialise tracing subscriber")
}

/// JSON subscriber filtered at `log_level`, not yet installed anywhere.
fn subscriber(log_level: &str) -> Result<impl Subscriber + Send + Sync + 'static> {
    Ok(tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter(log_level)?)
        .finish())
}

fn filter(log_level: &str) -> Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(from_env) => Ok(from_env),
        Err(_) => EnvFilter::try_new(log_level)
            .with_context(|| format!("invalid log level {log_level:?}")),
    }
}
