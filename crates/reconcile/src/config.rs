//! Engine configuration.

use std::str::FromStr;
use std::time::Duration;

use projtrack_core::error::CoreError;

/// Default number of lanes reconciled concurrently.
pub const DEFAULT_WORKERS: usize = 4;
/// Default bound on a single store operation.
pub const DEFAULT_STORE_TIMEOUT_MS: u64 = 5_000;
/// Default number of commit attempts when disambiguating a case key.
pub const DEFAULT_MAX_SUFFIX_ATTEMPTS: u32 = 5;

/// Tunables for the reconciliation engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileConfig {
    /// Lanes processed concurrently within a batch.
    pub workers: usize,
    /// Bound on every individual store read or write.
    pub store_timeout: Duration,
    /// How many times the Disambiguator re-queries and retries after the
    /// store rejects a key it picked as free.
    pub max_suffix_attempts: u32,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            store_timeout: Duration::from_millis(DEFAULT_STORE_TIMEOUT_MS),
            max_suffix_attempts: DEFAULT_MAX_SUFFIX_ATTEMPTS,
        }
    }
}

impl ReconcileConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                     | Default |
    /// |-----------------------------|---------|
    /// | `RECON_WORKERS`             | `4`     |
    /// | `RECON_STORE_TIMEOUT_MS`    | `5000`  |
    /// | `RECON_MAX_SUFFIX_ATTEMPTS` | `5`     |
    pub fn from_env() -> Result<Self, CoreError> {
        let config = Self {
            workers: parse_setting(
                "RECON_WORKERS",
                std::env::var("RECON_WORKERS").ok(),
                DEFAULT_WORKERS,
            )?,
            store_timeout: Duration::from_millis(parse_setting(
                "RECON_STORE_TIMEOUT_MS",
                std::env::var("RECON_STORE_TIMEOUT_MS").ok(),
                DEFAULT_STORE_TIMEOUT_MS,
            )?),
            max_suffix_attempts: parse_setting(
                "RECON_MAX_SUFFIX_ATTEMPTS",
                std::env::var("RECON_MAX_SUFFIX_ATTEMPTS").ok(),
                DEFAULT_MAX_SUFFIX_ATTEMPTS,
            )?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.workers == 0 {
            return Err(CoreError::validation("workers", "must be at least 1"));
        }
        if self.store_timeout.is_zero() {
            return Err(CoreError::validation("store_timeout", "must be greater than zero"));
        }
        if self.max_suffix_attempts == 0 {
            return Err(CoreError::validation(
                "max_suffix_attempts",
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

/// Parse an optional setting, falling back to `default` when unset or blank.
fn parse_setting<T: FromStr>(name: &str, raw: Option<String>, default: T) -> Result<T, CoreError> {
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(default),
        Some(value) => value
            .parse()
            .map_err(|_| CoreError::validation(name, format!("'{value}' is not a valid number"))),
    }
}
