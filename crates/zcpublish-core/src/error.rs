//! Error types shared across the zcpublish workspace.
//!
//! Steady-state announcement failures never reach the caller; what remains
//! here is what can stop the component from starting, which is bad
//! configuration.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using ZcError as the error type.
pub type Result<T> = std::result::Result<T, ZcError>;

/// Top-level error type.
#[derive(Debug, Error, Serialize, Deserialize)]
#[serde(tag = "type", content = "details")]
pub enum ZcError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Configuration errors.
#[derive(Debug, Error, Serialize, Deserialize)]
pub enum ConfigError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },

    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {reason}")]
    LoadFailed { path: String, reason: String },

    /// Invalid configuration format
    #[error("Invalid configuration format: {reason}")]
    InvalidFormat { reason: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    /// Port outside of 1..=65535
    #[error("Invalid port {port}: must be between 1 and 65535")]
    InvalidPort { port: u32 },

    /// Two endpoints declared with the same id
    #[error("Duplicate endpoint id: {id}")]
    DuplicateEndpoint { id: u32 },

    /// Invalid endpoint declaration
    #[error("Invalid endpoint configuration for '{endpoint}': {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },
}

impl ConfigError {
    /// Creates a file not found error.
    pub fn file_not_found(path: impl Into<String>) -> Self {
        Self::FileNotFound { path: path.into() }
    }

    /// Creates an invalid value error.
    pub fn invalid_value(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }
}
