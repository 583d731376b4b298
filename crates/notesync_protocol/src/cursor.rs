//! Pull pagination cursor.

use crate::error::{ProtocolError, ProtocolResult};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Position in the `(created_at ASC, id ASC)` pull order.
///
/// The id tie-break keeps rows sharing a timestamp from being skipped or
/// repeated across chunk boundaries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PullCursor {
    /// Creation time of the last row delivered.
    pub created_at: i64,
    /// Id of the last row delivered.
    pub id: String,
}

impl PullCursor {
    /// Creates a cursor.
    pub fn new(created_at: i64, id: impl Into<String>) -> Self {
        Self {
            created_at,
            id: id.into(),
        }
    }

    /// Compares a row position against this cursor.
    pub fn cmp_position(&self, created_at: i64, id: &str) -> Ordering {
        created_at
            .cmp(&self.created_at)
            .then_with(|| id.cmp(self.id.as_str()))
    }

    /// Returns true if a row at `(created_at, id)` comes after this cursor.
    pub fn precedes(&self, created_at: i64, id: &str) -> bool {
        self.cmp_position(created_at, id) == Ordering::Greater
    }

    /// Builds a cursor from its two optional wire halves.
    ///
    /// Both halves present yields a cursor, both absent yields `None`, and
    /// anything else is an error.
    pub fn from_parts(created_at: Option<&str>, last_id: Option<&str>) -> ProtocolResult<Option<Self>> {
        match (created_at, last_id) {
            (None, None) => Ok(None),
            (Some(ts), Some(id)) => {
                let created_at = ts.trim().parse::<i64>().map_err(|_| {
                    ProtocolError::InvalidCursor(format!("created_at is not a timestamp: {ts}"))
                })?;
                Ok(Some(Self::new(created_at, id)))
            }
            _ => Err(ProtocolError::InvalidCursor(
                "created_at and last_id must be given together".into(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_breaks_timestamp_ties() {
        let cursor = PullCursor::new(100, "b");
        assert!(!cursor.precedes(100, "a"));
        assert!(!cursor.precedes(100, "b"));
        assert!(cursor.precedes(100, "c"));
        assert!(cursor.precedes(101, "a"));
        assert!(!cursor.precedes(99, "z"));
    }

    #[test]
    fn parts_must_come_together() {
        assert_eq!(PullCursor::from_parts(None, None).unwrap(), None);
        assert_eq!(
            PullCursor::from_parts(Some("42"), Some("p1")).unwrap(),
            Some(PullCursor::new(42, "p1"))
        );
        assert!(PullCursor::from_parts(Some("42"), None).is_err());
        assert!(PullCursor::from_parts(None, Some("p1")).is_err());
        assert!(PullCursor::from_parts(Some("yesterday"), Some("p1")).is_err());
    }
}
