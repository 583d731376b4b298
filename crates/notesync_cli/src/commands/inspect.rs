//! Inspect command implementation.

use notesync_store::{LocalStore, StatusCounts, StoreCounts};
use serde::Serialize;
use std::path::Path;

/// Snapshot inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Snapshot path.
    pub path: String,
    /// Server time of the last complete pull.
    pub last_pulled_at: Option<i64>,
    /// Row counts by collection and status.
    pub counts: StoreCounts,
}

/// Loads a snapshot and tallies its rows.
pub fn inspect(path: &Path) -> Result<InspectResult, Box<dyn std::error::Error>> {
    if !path.exists() {
        return Err(format!("No snapshot found at {:?}", path).into());
    }
    let data = LocalStore::load_snapshot(path)?;
    Ok(InspectResult {
        path: path.display().to_string(),
        last_pulled_at: data.last_pulled_at,
        counts: StoreCounts::from_data(&data),
    })
}

/// Runs the inspect command.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let result = inspect(path)?;
    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => print_text_output(&result),
    }
    Ok(())
}

fn print_text_output(result: &InspectResult) {
    println!("Snapshot: {}", result.path);
    match result.last_pulled_at {
        Some(at) => println!("Last pulled at: {at}"),
        None => println!("Last pulled at: never"),
    }
    println!();
    println!(
        "{:<10} {:>8} {:>8} {:>8} {:>8}",
        "collection", "created", "updated", "synced", "deleted"
    );
    print_row("page", &result.counts.pages);
    print_row("folder", &result.counts.folders);
    print_row("alarm", &result.counts.alarms);
}

fn print_row(name: &str, counts: &StatusCounts) {
    println!(
        "{:<10} {:>8} {:>8} {:>8} {:>8}",
        name, counts.created, counts.updated, counts.synced, counts.deleted
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use notesync_protocol::Page;

    #[test]
    fn counts_a_written_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        let store = LocalStore::open(&path, "u1").unwrap();
        store.create_page(Page::new("p1")).unwrap();
        store.create_page(Page::new("p2")).unwrap();

        let result = inspect(&path).unwrap();
        assert_eq!(result.counts.pages.created, 2);
        assert_eq!(result.counts.pages.pending(), 2);
        assert_eq!(result.last_pulled_at, None);
    }

    #[test]
    fn missing_snapshot_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(inspect(&dir.path().join("absent.json")).is_err());
    }
}
