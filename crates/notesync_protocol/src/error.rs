//! Error types for the protocol crate.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while encoding or decoding protocol messages.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The bytes were not valid JSON.
    #[error("malformed JSON: {0}")]
    MalformedJson(String),

    /// The JSON was well formed but did not match the expected shape.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// A cursor was half-specified or unparseable.
    #[error("invalid cursor: {0}")]
    InvalidCursor(String),
}

impl ProtocolError {
    /// Classifies a serde_json error as syntax vs. shape.
    pub(crate) fn from_json(err: serde_json::Error) -> Self {
        match err.classify() {
            serde_json::error::Category::Syntax | serde_json::error::Category::Eof => {
                ProtocolError::MalformedJson(err.to_string())
            }
            _ => ProtocolError::InvalidMessage(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_errors_are_classified() {
        let syntax = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        assert!(matches!(
            ProtocolError::from_json(syntax),
            ProtocolError::MalformedJson(_)
        ));

        let shape = serde_json::from_str::<Vec<u8>>("{\"a\":1}").unwrap_err();
        assert!(matches!(
            ProtocolError::from_json(shape),
            ProtocolError::InvalidMessage(_)
        ));
    }
}
