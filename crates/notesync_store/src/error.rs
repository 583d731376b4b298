//! Error types for the local store.

use notesync_protocol::Collection;
use std::io;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in local store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No live record with this id.
    #[error("{collection} not found: {id}")]
    NotFound {
        /// The collection searched.
        collection: Collection,
        /// The id that was not found.
        id: String,
    },

    /// A record with this id already exists.
    #[error("{collection} already exists: {id}")]
    AlreadyExists {
        /// The collection written to.
        collection: Collection,
        /// The duplicate id.
        id: String,
    },

    /// A weak reference names a record that is missing or deleted.
    #[error("{collection} {id}: {field} references missing record {target}")]
    MissingReference {
        /// Collection of the referring record.
        collection: Collection,
        /// Id of the referring record.
        id: String,
        /// Referring field.
        field: &'static str,
        /// Id that could not be resolved.
        target: String,
    },

    /// I/O error while persisting a snapshot.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The snapshot file could not be encoded or decoded.
    #[error("snapshot error: {0}")]
    Snapshot(String),
}

impl StoreError {
    pub(crate) fn not_found(collection: Collection, id: &str) -> Self {
        StoreError::NotFound {
            collection,
            id: id.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = StoreError::not_found(Collection::Page, "p1");
        assert_eq!(err.to_string(), "page not found: p1");

        let err = StoreError::MissingReference {
            collection: Collection::Alarm,
            id: "a1".into(),
            field: "page_id",
            target: "p9".into(),
        };
        assert_eq!(
            err.to_string(),
            "alarm a1: page_id references missing record p9"
        );
    }
}
