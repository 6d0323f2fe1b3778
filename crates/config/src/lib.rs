#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Configuration management for grouplimit
//!
//! Group limits and reservation defaults are loaded and merged from:
//! - Default values (hard-coded)
//! - Configuration file (~/.config/grouplimit/config.toml)
//! - Environment variables
//!
//! ```toml
//! [limits]
//! downloads = 4
//! builds = 1
//! mirror = -1     # explicitly unlimited, same as leaving it out
//!
//! [reservation]
//! default_wait_ms = 500
//! ```

pub mod limits;
pub mod reservation;

pub use limits::StaticLimits;
pub use reservation::ReservationConfig;

use grouplimit_errors::{ConfigError, Error};
use grouplimit_limiter::{limit_from_sentinel, Limiter, UNLIMITED_SENTINEL};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

/// Prefix of per-group limit overrides in the environment
pub const LIMIT_ENV_PREFIX: &str = "GROUPLIMIT_LIMIT_";

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Config {
    /// Group name to limit, `-1` meaning no limit
    #[serde(default)]
    pub limits: BTreeMap<String, i64>,

    #[serde(default)]
    pub reservation: ReservationConfig,
}

impl Config {
    /// Get the default config file path
    ///
    /// # Errors
    ///
    /// Returns an error if the system config directory cannot be determined.
    pub fn default_path() -> Result<PathBuf, Error> {
        let config_dir = dirs::config_dir().ok_or_else(|| ConfigError::NotFound {
            path: "config directory".to_string(),
        })?;
        Ok(config_dir.join("grouplimit").join("config.toml"))
    }

    /// Load configuration from file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not valid TOML, or
    /// holds a limit below `-1`.
    pub async fn load_from_file(path: &Path) -> Result<Self, Error> {
        let contents = fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound {
                    path: path.display().to_string(),
                }
                .into()
            } else {
                Error::io_with_path(&e, path)
            }
        })?;

        let config: Self = toml::from_str(&contents)?;
        config.validate()?;
        tracing::debug!(
            path = %path.display(),
            groups = config.limits.len(),
            "loaded limiter config"
        );
        Ok(config)
    }

    /// Load configuration with fallback to defaults
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file exists but cannot be read
    /// or parsed.
    pub async fn load() -> Result<Self, Error> {
        let config_path = Self::default_path()?;

        if config_path.exists() {
            Self::load_from_file(&config_path).await
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from an optional path or use default
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be read or parsed
    pub async fn load_or_default(path: Option<&Path>) -> Result<Self, Error> {
        match path {
            Some(config_path) => Self::load_from_file(config_path).await,
            None => Self::load().await,
        }
    }

    /// Save configuration to a specific path
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be serialized
    /// or if the file cannot be written.
    pub async fn save_to(&self, path: &Path) -> Result<(), Error> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| ConfigError::WriteError {
                    path: parent.display().to_string(),
                    error: e.to_string(),
                })?;
        }

        let toml_string =
            toml::to_string_pretty(self).map_err(|e| ConfigError::SerializeError {
                error: e.to_string(),
            })?;

        let content = format!(
            "# grouplimit configuration\n\
             # Omit a group or set it to -1 to leave it unlimited.\n\n\
             {toml_string}"
        );

        fs::write(path, content)
            .await
            .map_err(|e| ConfigError::WriteError {
                path: path.display().to_string(),
                error: e.to_string(),
            })?;

        Ok(())
    }

    /// Merge with environment variables
    ///
    /// `GROUPLIMIT_DEFAULT_WAIT_MS` overrides the default wait and
    /// `GROUPLIMIT_LIMIT_<NAME>` sets the limit of group `<name>` (lowercased).
    ///
    /// # Errors
    ///
    /// Returns an error if a variable holds a value that does not parse.
    pub fn merge_env(&mut self) -> Result<(), Error> {
        if let Ok(wait) = std::env::var("GROUPLIMIT_DEFAULT_WAIT_MS") {
            self.reservation.default_wait_ms =
                wait.parse().map_err(|_| ConfigError::InvalidValue {
                    field: "GROUPLIMIT_DEFAULT_WAIT_MS".to_string(),
                    value: wait,
                })?;
        }

        for (key, value) in std::env::vars() {
            let Some(group) = key.strip_prefix(LIMIT_ENV_PREFIX) else {
                continue;
            };
            if group.is_empty() {
                continue;
            }
            let limit: i64 = value.parse().map_err(|_| ConfigError::InvalidValue {
                field: key.clone(),
                value: value.clone(),
            })?;
            validate_limit(group, limit)?;
            self.limits.insert(group.to_lowercase(), limit);
        }

        Ok(())
    }

    /// Check that every configured limit is usable
    ///
    /// # Errors
    ///
    /// Returns an error for the first limit below `-1`.
    pub fn validate(&self) -> Result<(), Error> {
        for (group, limit) in &self.limits {
            validate_limit(group, *limit)?;
        }
        Ok(())
    }

    /// Configured limits as a lookup table, unlimited groups left out
    #[must_use]
    pub fn static_limits(&self) -> StaticLimits {
        self.limits
            .iter()
            .filter_map(|(group, limit)| {
                limit_from_sentinel(*limit).map(|limit| (group.clone(), limit))
            })
            .collect()
    }

    /// Build a limiter backed by the configured limits
    #[must_use]
    pub fn limiter(&self) -> Limiter {
        Limiter::new(self.static_limits())
    }

    /// Default wait for reservations, `None` when waiting is disabled
    #[must_use]
    pub fn default_wait(&self) -> Option<Duration> {
        self.reservation.default_wait()
    }
}

fn validate_limit(group: &str, limit: i64) -> Result<(), ConfigError> {
    if limit < UNLIMITED_SENTINEL {
        return Err(ConfigError::InvalidLimit {
            group: group.to_string(),
            value: limit.to_string(),
        });
    }
    Ok(())
}
