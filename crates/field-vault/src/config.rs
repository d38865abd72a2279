//! Configuration loading and validation for the field vault.
//!
//! All values are read from environment variables at startup. Loading fails
//! with a clear error message if any variable is invalid. The configuration
//! never carries key material, only the name of the variable that does.

use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::cache::DEFAULT_CAPACITY;
use crate::keys::MasterKey;
use crate::vault::VaultSettings;

/// Validated field vault configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct VaultConfig {
    /// Maximum number of decrypted values held in the cache.
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,

    /// Concurrent decrypts in a bulk read; `0` uses one per available core.
    #[serde(default)]
    pub decrypt_workers: usize,

    /// Seconds after which a cached value expires; `0` disables expiry.
    #[serde(default)]
    pub entry_ttl_secs: u64,

    /// Environment variable holding the base64-encoded 32-byte master key.
    #[serde(default = "default_master_key_var")]
    pub master_key_var: String,

    /// Tracing log level (e.g. `"info"`, `"debug"`).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_cache_capacity() -> usize {
    DEFAULT_CAPACITY
}
fn default_master_key_var() -> String {
    "FIELD_VAULT_MASTER_KEY".into()
}
fn default_log_level() -> String {
    "info".into()
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            cache_capacity: default_cache_capacity(),
            decrypt_workers: 0,
            entry_ttl_secs: 0,
            master_key_var: default_master_key_var(),
            log_level: default_log_level(),
        }
    }
}

impl VaultConfig {
    /// Load and validate configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if any variable cannot be parsed or fails validation.
    pub fn from_env() -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::Environment::default())
            .build()
            .context("failed to build configuration from environment")?;

        let c: VaultConfig = cfg
            .try_deserialize()
            .context("failed to deserialise configuration")?;

        c.validate()?;
        Ok(c)
    }

    /// Read the master key from the variable named by [`master_key_var`].
    ///
    /// [`master_key_var`]: VaultConfig::master_key_var
    pub fn master_key(&self) -> Result<MasterKey> {
        MasterKey::from_env(&self.master_key_var)
            .with_context(|| format!("failed to load master key from {}", self.master_key_var))
    }

    /// Vault tunables derived from this configuration.
    pub fn settings(&self) -> VaultSettings {
        VaultSettings {
            cache_capacity: self.cache_capacity,
            entry_ttl: (self.entry_ttl_secs > 0).then(|| Duration::from_secs(self.entry_ttl_secs)),
            decrypt_workers: self.decrypt_workers,
        }
    }

    /// Validate all fields, returning a descriptive error on the first failure.
    fn validate(&self) -> Result<()> {
        if self.cache_capacity == 0 {
            anyhow::bail!("CACHE_CAPACITY must be > 0");
        }
        ensure_non_empty(&self.master_key_var, "MASTER_KEY_VAR")?;
        ensure_non_empty(&self.log_level, "LOG_LEVEL")?;
        Ok(())
    }
}

fn ensure_non_empty(value: &str, name: &str) -> Result<()> {
    if value.trim().is_empty() {
        anyhow::bail!("{name} is required and must not be empty");
    }
    Ok(())
}
