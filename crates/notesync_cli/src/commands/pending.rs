//! Pending command implementation.

use notesync_engine::collect_from;
use notesync_protocol::ChangeSet;
use notesync_store::LocalStore;
use std::path::Path;

/// Loads a snapshot and collects what the next push would send.
pub fn pending(path: &Path) -> Result<ChangeSet, Box<dyn std::error::Error>> {
    let data = LocalStore::load_snapshot(path)?;
    Ok(collect_from(&data))
}

/// Runs the pending command.
pub fn run(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let changes = pending(path)?;
    tracing::debug!(changes = changes.len(), "collected pending changes");
    println!("{}", serde_json::to_string_pretty(&changes)?);
    Ok(())
}
