//! Error types for the management API client.

use thiserror::Error;

use crate::config::ConfigError;

/// Errors raised while constructing an [`super::ArmClient`].
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ArmClientError {
    /// Raised when the configuration is incomplete.
    #[error("configuration error: {0}")]
    Config(String),
    /// Raised when the HTTP client cannot be built.
    #[error("failed to build HTTP client: {0}")]
    Http(String),
}

impl From<ConfigError> for ArmClientError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value.to_string())
    }
}
