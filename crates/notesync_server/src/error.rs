//! Error types for the sync server.

use notesync_protocol::{Collection, ErrorBody, HttpResponse, ProtocolError, ValidationFailure};
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in the sync server.
#[derive(Error, Debug)]
pub enum ServerError {
    /// The request body is not JSON.
    #[error("malformed JSON: {0}")]
    InvalidJson(String),

    /// The request body is JSON but breaks the record contract.
    #[error("invalid request body: {reason}")]
    InvalidBody {
        /// Offending collection, if known.
        collection: Option<Collection>,
        /// Why the body was refused.
        reason: String,
    },

    /// The pull cursor is half-specified or unparseable.
    #[error("invalid cursor: {0}")]
    InvalidCursor(String),

    /// Missing, malformed or expired token.
    #[error("not authorized: {0}")]
    NotAuthorized(String),

    /// No route for the path.
    #[error("not found: {0}")]
    NotFound(String),

    /// The route exists but not for this method.
    #[error("method not allowed: {0}")]
    MethodNotAllowed(String),

    /// The batch is well formed but breaks a business rule.
    #[error("{collection} rejected: {message}")]
    Rejected {
        /// Collection of the offending record.
        collection: Collection,
        /// What was wrong.
        message: String,
    },

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServerError {
    /// Creates a business-rule rejection.
    pub fn rejected(collection: Collection, message: impl Into<String>) -> Self {
        ServerError::Rejected {
            collection,
            message: message.into(),
        }
    }

    /// HTTP status for this error.
    pub fn status(&self) -> u16 {
        match self {
            ServerError::InvalidJson(_)
            | ServerError::InvalidBody { .. }
            | ServerError::InvalidCursor(_) => 400,
            ServerError::NotAuthorized(_) => 401,
            ServerError::NotFound(_) => 404,
            ServerError::MethodNotAllowed(_) => 405,
            ServerError::Rejected { .. } => 422,
            ServerError::Internal(_) => 500,
        }
    }

    /// Error body sent to the client.
    ///
    /// Details of authentication failures and internal errors stay in the
    /// server log.
    pub fn body(&self) -> ErrorBody {
        match self {
            ServerError::InvalidJson(_) => ErrorBody::code("INVALID_JSON"),
            ServerError::InvalidBody { collection, .. } => {
                let body = ErrorBody::message("Invalid request body");
                match collection {
                    Some(collection) => body.with_collection(collection.as_str()),
                    None => body,
                }
            }
            ServerError::InvalidCursor(_) => ErrorBody::message("Invalid cursor"),
            ServerError::NotAuthorized(_) => ErrorBody::message("Unauthorized"),
            ServerError::NotFound(_) => ErrorBody::message("Not found"),
            ServerError::MethodNotAllowed(_) => ErrorBody::message("Method not allowed"),
            ServerError::Rejected {
                collection,
                message,
            } => ErrorBody::message(message.clone()).with_collection(collection.as_str()),
            ServerError::Internal(_) => ErrorBody::message("Internal server error"),
        }
    }

    /// Renders the error as an HTTP response.
    pub fn to_response(&self) -> HttpResponse {
        let body = serde_json::to_vec(&self.body()).unwrap_or_default();
        HttpResponse::new(self.status(), body)
    }

    /// Returns true if this is a client error (4xx).
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status())
    }

    /// Returns true if this is a server error (5xx).
    pub fn is_server_error(&self) -> bool {
        self.status() >= 500
    }
}

impl From<ValidationFailure> for ServerError {
    fn from(failure: ValidationFailure) -> Self {
        ServerError::InvalidBody {
            collection: failure.collection,
            reason: failure.reason,
        }
    }
}

impl From<ProtocolError> for ServerError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::MalformedJson(msg) => ServerError::InvalidJson(msg),
            ProtocolError::InvalidMessage(msg) => ServerError::InvalidBody {
                collection: None,
                reason: msg,
            },
            ProtocolError::InvalidCursor(msg) => ServerError::InvalidCursor(msg),
        }
    }
}
