//! Error types for the sync engine.

use notesync_protocol::{Collection, ProtocolError, ValidationFailure};
use notesync_store::StoreError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// A record or request body failed validation. Never retried.
    #[error("validation failed: {reason}")]
    Validation {
        /// Collection the offending record belongs to, if known.
        collection: Option<Collection>,
        /// Reason reported by the validator or the server.
        reason: String,
    },

    /// Network or transport error.
    #[error("network error: {message}")]
    Network {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// The server rejected the request for a reason other than validation.
    #[error("server error ({status}): {message}")]
    Server {
        /// HTTP status.
        status: u16,
        /// Message from the response body.
        message: String,
    },

    /// A response could not be decoded.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Local store error during sync.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A sync cycle is already running.
    #[error("a sync cycle is already running")]
    Busy,

    /// The cycle's task was cancelled before it finished.
    #[error("sync cancelled")]
    Cancelled,

    /// The orchestrator has been shut down.
    #[error("sync orchestrator is shut down")]
    ShutDown,

    /// Not connected.
    #[error("not connected to server")]
    NotConnected,
}

impl SyncError {
    /// Creates a retryable network error.
    pub fn network_retryable(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
            retryable: true,
        }
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::Network { retryable: true, .. })
    }
}

impl From<ValidationFailure> for SyncError {
    fn from(failure: ValidationFailure) -> Self {
        SyncError::Validation {
            collection: failure.collection,
            reason: failure.to_string(),
        }
    }
}

impl From<ProtocolError> for SyncError {
    fn from(err: ProtocolError) -> Self {
        SyncError::Protocol(err.to_string())
    }
}
