//! Last-write-wins conflict resolution.

use serde::{Deserialize, Serialize};

/// Outcome of reconciling one incoming record against the server's copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordOutcome {
    /// Incoming values were written.
    Accepted,
    /// Server copy is newer; the row is unchanged and returned to the client.
    Rejected,
    /// The record is (now) deleted. Deletes always win.
    Deleted,
}

impl RecordOutcome {
    /// Returns true if the incoming values were written.
    pub fn is_accepted(&self) -> bool {
        matches!(self, RecordOutcome::Accepted)
    }
}

/// Decides whether an incoming create/update overwrites the stored row.
///
/// `stored_updated_at` is `None` when the server has no live row. A
/// tombstoned id never comes back to life. Equal timestamps favour the
/// incoming record, so two writers in the same millisecond overwrite each
/// other whole-record (there is no field-level merge).
pub fn resolve_write(
    stored_updated_at: Option<i64>,
    incoming_updated_at: i64,
    tombstoned: bool,
) -> RecordOutcome {
    if tombstoned {
        return RecordOutcome::Deleted;
    }
    match stored_updated_at {
        Some(stored) if incoming_updated_at < stored => RecordOutcome::Rejected,
        _ => RecordOutcome::Accepted,
    }
}
