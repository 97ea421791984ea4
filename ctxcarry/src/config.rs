//! Configuration for pools and replay behaviour.

use crate::errors::CarryError;
use crate::replay::RestorePolicy;
use serde::{Deserialize, Serialize};

/// Prefix of environment variables read by [`CarryConfig::from_env`].
pub const ENV_PREFIX: &str = "CTXCARRY_";

/// Library configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CarryConfig {
    /// Label used in pool log events and worker thread names.
    #[serde(default = "default_pool_name")]
    pub pool_name: String,
    /// Panic on a restore invariant violation instead of only logging it.
    #[serde(default = "default_strict_restore")]
    pub strict_restore: bool,
    /// Report panics of `submit`ted work through the task handle instead of
    /// unwinding into the inner pool.
    #[serde(default = "default_catch_panics")]
    pub catch_panics: bool,
    /// Number of threads for the bundled fixed pool.
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,
    /// Default `EnvFilter` directive when `RUST_LOG` is unset.
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

fn default_pool_name() -> String {
    "ctxcarry".to_string()
}

fn default_strict_restore() -> bool {
    true
}

fn default_catch_panics() -> bool {
    true
}

fn default_worker_threads() -> usize {
    4
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Default for CarryConfig {
    fn default() -> Self {
        Self {
            pool_name: default_pool_name(),
            strict_restore: default_strict_restore(),
            catch_panics: default_catch_panics(),
            worker_threads: default_worker_threads(),
            log_filter: default_log_filter(),
        }
    }
}

impl CarryConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a JSON document; missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`CarryError::Config`] for malformed JSON or invalid values.
    pub fn from_json(json: &str) -> Result<Self, CarryError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| CarryError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Builds a configuration from defaults overlaid with `CTXCARRY_*`
    /// environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`CarryError::Config`] if a variable cannot be parsed.
    pub fn from_env() -> Result<Self, CarryError> {
        Self::default().overlay(|key| std::env::var(format!("{ENV_PREFIX}{key}")).ok())
    }

    fn overlay(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self, CarryError> {
        if let Some(name) = lookup("POOL_NAME") {
            self.pool_name = name;
        }
        if let Some(raw) = lookup("STRICT_RESTORE") {
            self.strict_restore = parse_bool("STRICT_RESTORE", &raw)?;
        }
        if let Some(raw) = lookup("CATCH_PANICS") {
            self.catch_panics = parse_bool("CATCH_PANICS", &raw)?;
        }
        if let Some(raw) = lookup("WORKER_THREADS") {
            self.worker_threads = raw.trim().parse().map_err(|_| {
                CarryError::Config(format!("{ENV_PREFIX}WORKER_THREADS must be a number, got '{raw}'"))
            })?;
        }
        if let Some(filter) = lookup("LOG_FILTER") {
            self.log_filter = filter;
        }
        self.validate()?;
        Ok(self)
    }

    fn validate(&self) -> Result<(), CarryError> {
        if self.worker_threads == 0 {
            return Err(CarryError::Config("worker_threads must be at least 1".to_string()));
        }
        if self.pool_name.trim().is_empty() {
            return Err(CarryError::Config("pool_name must not be empty".to_string()));
        }
        Ok(())
    }

    /// Sets the pool name.
    #[must_use]
    pub fn with_pool_name(mut self, name: impl Into<String>) -> Self {
        self.pool_name = name.into();
        self
    }

    /// Sets strict restore.
    #[must_use]
    pub fn with_strict_restore(mut self, strict: bool) -> Self {
        self.strict_restore = strict;
        self
    }

    /// Sets whether pooled tasks catch panics.
    #[must_use]
    pub fn with_catch_panics(mut self, catch: bool) -> Self {
        self.catch_panics = catch;
        self
    }

    /// Sets the number of worker threads.
    #[must_use]
    pub fn with_worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = threads;
        self
    }

    /// Sets the default log filter.
    #[must_use]
    pub fn with_log_filter(mut self, filter: impl Into<String>) -> Self {
        self.log_filter = filter.into();
        self
    }

    /// Returns the restore policy implied by `strict_restore`.
    #[must_use]
    pub fn restore_policy(&self) -> RestorePolicy {
        RestorePolicy::from_strict(self.strict_restore)
    }
}

fn parse_bool(key: &str, raw: &str) -> Result<bool, CarryError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(CarryError::Config(format!(
            "{ENV_PREFIX}{key} must be a boolean, got '{raw}'"
        ))),
    }
}
