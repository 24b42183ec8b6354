//! Configuration loading via `ortho-config`.

use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::poller::PollTiming;

/// Default ARM management endpoint.
pub const DEFAULT_API_ENDPOINT: &str = "https://management.azure.com";

/// Default `api-version` query parameter for `Microsoft.NetApp` calls.
pub const DEFAULT_API_VERSION: &str = "2024-03-01";

const SECONDS_PER_MINUTE: u64 = 60;

/// Control-plane access and orchestration settings derived from environment
/// variables, configuration files, and CLI flags.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "STRATA",
    discovery(
        app_name = "strata",
        env_var = "STRATA_CONFIG_PATH",
        config_file_name = "strata.toml",
        dotfile_name = ".strata.toml",
        project_file_name = "strata.toml"
    )
)]
pub struct StrataConfig {
    /// Base URL of the management API.
    #[ortho_config(default = DEFAULT_API_ENDPOINT.to_owned())]
    pub api_endpoint: String,
    /// API version sent with every request.
    #[ortho_config(default = DEFAULT_API_VERSION.to_owned())]
    pub api_version: String,
    /// Pre-issued bearer token. This value is required.
    pub bearer_token: String,
    /// Seconds between two polls.
    #[ortho_config(default = 10)]
    pub poll_interval_secs: u64,
    /// Seconds to wait before the first poll of an operation.
    #[ortho_config(default = 10)]
    pub min_settle_secs: u64,
    /// Consecutive target observations required before a poll finishes.
    #[ortho_config(default = 5)]
    pub continuous_occurrences: u32,
    /// Budget for a create or update, in minutes.
    #[ortho_config(default = 90)]
    pub create_timeout_mins: u64,
    /// Budget for a delete, in minutes.
    #[ortho_config(default = 60)]
    pub delete_timeout_mins: u64,
    /// Refuse to delete volumes unless explicitly disabled.
    #[ortho_config(default = true)]
    pub prevent_volume_destruction: bool,
}

/// Metadata for a configuration field, used to generate actionable error messages.
struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
}

impl FieldMetadata {
    const fn new(description: &'static str, env_var: &'static str, toml_key: &'static str) -> Self {
        Self {
            description,
            env_var,
            toml_key,
        }
    }

    fn hint(&self) -> String {
        format!("set {} or add {} to strata.toml", self.env_var, self.toml_key)
    }
}

impl StrataConfig {
    fn require_field(value: &str, metadata: &FieldMetadata) -> Result<(), ConfigError> {
        if value.trim().is_empty() {
            return Err(ConfigError::MissingField(format!(
                "missing {}: {}",
                metadata.description,
                metadata.hint()
            )));
        }
        Ok(())
    }

    fn require_positive(value: u64, metadata: &FieldMetadata) -> Result<(), ConfigError> {
        if value == 0 {
            return Err(ConfigError::InvalidValue(format!(
                "{} must be greater than zero: {}",
                metadata.description,
                metadata.hint()
            )));
        }
        Ok(())
    }

    /// Loads configuration using the `ortho-config` derive. Values merge
    /// defaults, configuration files, environment variables, and CLI flags in
    /// that order of precedence.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the loader fails to merge sources.
    pub fn load_from_sources() -> Result<Self, ConfigError> {
        Self::load().map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Loads configuration without attempting to parse CLI arguments. Values
    /// still merge defaults, configuration files, and environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("strata")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Performs semantic validation. Error messages name the environment
    /// variable and configuration key that fix the problem.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when a required field is empty
    /// and [`ConfigError::InvalidValue`] when a numeric setting is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        Self::require_field(
            &self.bearer_token,
            &FieldMetadata::new("API bearer token", "STRATA_BEARER_TOKEN", "bearer_token"),
        )?;
        Self::require_field(
            &self.api_endpoint,
            &FieldMetadata::new("API endpoint", "STRATA_API_ENDPOINT", "api_endpoint"),
        )?;
        Self::require_field(
            &self.api_version,
            &FieldMetadata::new("API version", "STRATA_API_VERSION", "api_version"),
        )?;
        Self::require_positive(
            self.poll_interval_secs,
            &FieldMetadata::new(
                "poll interval",
                "STRATA_POLL_INTERVAL_SECS",
                "poll_interval_secs",
            ),
        )?;
        Self::require_positive(
            u64::from(self.continuous_occurrences),
            &FieldMetadata::new(
                "continuous occurrences",
                "STRATA_CONTINUOUS_OCCURRENCES",
                "continuous_occurrences",
            ),
        )?;
        Self::require_positive(
            self.create_timeout_mins,
            &FieldMetadata::new(
                "create timeout",
                "STRATA_CREATE_TIMEOUT_MINS",
                "create_timeout_mins",
            ),
        )?;
        Self::require_positive(
            self.delete_timeout_mins,
            &FieldMetadata::new(
                "delete timeout",
                "STRATA_DELETE_TIMEOUT_MINS",
                "delete_timeout_mins",
            ),
        )?;
        Ok(())
    }

    /// Poll cadence described by this configuration.
    #[must_use]
    pub const fn poll_timing(&self) -> PollTiming {
        PollTiming {
            interval: Duration::from_secs(self.poll_interval_secs),
            min_settle: Duration::from_secs(self.min_settle_secs),
            continuous_occurrences: self.continuous_occurrences,
        }
    }

    /// Budget for create and update operations.
    #[must_use]
    pub const fn create_timeout(&self) -> Duration {
        Duration::from_secs(self.create_timeout_mins.saturating_mul(SECONDS_PER_MINUTE))
    }

    /// Budget for delete operations.
    #[must_use]
    pub const fn delete_timeout(&self) -> Duration {
        Duration::from_secs(self.delete_timeout_mins.saturating_mul(SECONDS_PER_MINUTE))
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// Indicates a configuration value is out of range.
    #[error("invalid configuration value: {0}")]
    InvalidValue(String),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}
