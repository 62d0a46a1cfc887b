//! Ledger configuration.

use std::path::Path;

use serde::Deserialize;

use envelope_core::DEFAULT_BUCKET_NAME;

/// Default number of events per ledger page.
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Default number of buckets returned by `recent`.
pub const DEFAULT_RECENT_LIMIT: usize = 5;

/// Default number of lookups a role resolution makes before giving up on a lost race.
pub const DEFAULT_ROLE_RETRY_ATTEMPTS: usize = 3;

/// Errors raised while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Io {
        /// The file path.
        path: String,
        /// The underlying error.
        source: std::io::Error,
    },

    /// The configuration file is not valid JSON for `LedgerConfig`.
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        /// The file path.
        path: String,
        /// The underlying error.
        source: serde_json::Error,
    },

    /// A value is out of range.
    #[error("invalid config value for {field}: {reason}")]
    Invalid {
        /// The offending field.
        field: &'static str,
        /// Why it was rejected.
        reason: String,
    },
}

/// Ledger configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Name of the default bucket created with every account (default: "General").
    pub default_bucket_name: String,

    /// Events per page when the caller does not pick a size (default: 100).
    pub default_page_size: usize,

    /// Buckets returned by `recent_default` (default: 5).
    pub recent_limit: usize,

    /// Lookups `for_role` makes when it loses a creation race (default: 3).
    pub role_retry_attempts: usize,

    /// Path to the `RocksDB` data directory, when that backend is used.
    pub data_dir: Option<String>,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            default_bucket_name: DEFAULT_BUCKET_NAME.into(),
            default_page_size: DEFAULT_PAGE_SIZE,
            recent_limit: DEFAULT_RECENT_LIMIT,
            role_retry_attempts: DEFAULT_ROLE_RETRY_ATTEMPTS,
            data_dir: None,
        }
    }
}

impl LedgerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    ///
    /// Unparseable numeric values are ignored with a warning.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            default_bucket_name: std::env::var("LEDGER_DEFAULT_BUCKET_NAME")
                .unwrap_or(defaults.default_bucket_name),
            default_page_size: env_usize("LEDGER_PAGE_SIZE").unwrap_or(defaults.default_page_size),
            recent_limit: env_usize("LEDGER_RECENT_LIMIT").unwrap_or(defaults.recent_limit),
            role_retry_attempts: env_usize("LEDGER_ROLE_RETRY_ATTEMPTS")
                .unwrap_or(defaults.role_retry_attempts),
            data_dir: std::env::var("LEDGER_DATA_DIR").ok(),
        }
    }

    /// Load configuration from a JSON file. Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or fails validation.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let shown = path.display().to_string();

        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: shown.clone(),
            source,
        })?;
        let config: Self = serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: shown.clone(),
            source,
        })?;
        config.validate()?;

        tracing::info!(path = %shown, "Loaded ledger configuration from file");
        Ok(config)
    }

    /// Reject values the ledger cannot run with.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_bucket_name.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "default_bucket_name",
                reason: "must not be blank".into(),
            });
        }
        for (field, value) in [
            ("default_page_size", self.default_page_size),
            ("recent_limit", self.recent_limit),
            ("role_retry_attempts", self.role_retry_attempts),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    field,
                    reason: "must be positive".into(),
                });
            }
        }
        Ok(())
    }
}

fn env_usize(name: &str) -> Option<usize> {
    let raw = std::env::var(name).ok()?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(var = %name, value = %raw, "Ignoring non-numeric configuration value");
            None
        }
    }
}
