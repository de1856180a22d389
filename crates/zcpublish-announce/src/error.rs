//! Error types for the announcement service

use thiserror::Error;
use zcpublish_core::ZcError;

/// Result type alias for announcement operations
pub type Result<T> = std::result::Result<T, PublishError>;

/// Errors that can occur while announcing services.
///
/// Only initialization surfaces these to the owner. At steady state they are
/// produced by the directory backends and consumed by the publisher, which
/// logs them and either drops the affected record or waits for the next
/// client state change.
#[derive(Debug, Error)]
pub enum PublishError {
    /// Configuration rejected at initialization
    #[error("Invalid configuration: {0}")]
    Config(#[from] ZcError),

    /// Directory client could not be created
    #[error("Failed to connect to the directory service: {0}")]
    ConnectFailed(String),

    /// There is no live directory client
    #[error("Directory client is not available")]
    ClientUnavailable,

    /// The client is not in the running state
    #[error("Directory client is not running (state: {state})")]
    NotRunning { state: String },

    /// A commit was rejected synchronously by the backend
    #[error("Failed to commit service '{service_name}': {reason}")]
    CommitFailed {
        service_name: String,
        reason: String,
    },

    /// The backend referenced a group it does not know
    #[error("Unknown entry group: {0}")]
    UnknownGroup(u64),
}

impl PublishError {
    /// Creates a commit failed error.
    pub fn commit_failed(service_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::CommitFailed {
            service_name: service_name.into(),
            reason: reason.into(),
        }
    }
}
