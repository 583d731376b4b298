//! Change collection.

use notesync_protocol::{ChangeBatch, ChangeSet, Collection, RecordStatus, SyncRecord};
use notesync_store::{LocalStore, StoreData, Table, TableRecord};

/// Collects every pending change in the store into one push body.
///
/// This is a pure read: statuses change only after the server acknowledges
/// the push.
pub fn collect_changes(store: &LocalStore) -> ChangeSet {
    store.read(collect_from)
}

/// Collects pending changes from a store snapshot.
pub fn collect_from(data: &StoreData) -> ChangeSet {
    ChangeSet::from_batches(
        batch_of(&data.pages),
        batch_of(&data.folders),
        batch_of(&data.alarms),
    )
}

fn batch_of<T: TableRecord>(table: &Table<T>) -> ChangeBatch<T> {
    let mut batch = ChangeBatch::new();
    for row in table.iter() {
        match row.status {
            RecordStatus::Created => batch.created.push(row.record.clone()),
            RecordStatus::Updated => batch.updated.push(row.record.clone()),
            RecordStatus::Deleted => batch.deleted.push(row.record.id().to_string()),
            RecordStatus::Synced => {}
        }
    }
    batch
}

/// `(id, updated_at)` of every created or updated record in a batch.
pub(crate) fn pushed_versions<T: SyncRecord>(batch: Option<&ChangeBatch<T>>) -> Vec<(String, i64)> {
    batch
        .map(|batch| {
            batch
                .created
                .iter()
                .chain(&batch.updated)
                .map(|record| (record.id().to_string(), record.updated_at()))
                .collect()
        })
        .unwrap_or_default()
}

/// Ids deleted in a batch.
pub(crate) fn pushed_deletions<T>(batch: Option<&ChangeBatch<T>>) -> Vec<String> {
    batch.map(|batch| batch.deleted.clone()).unwrap_or_default()
}

/// One-line summary for logs, e.g. `page=3 folder=1 alarm=0`.
pub(crate) fn summarize(changes: &ChangeSet) -> String {
    Collection::ALL
        .iter()
        .map(|c| format!("{}={}", c, changes.count(*c)))
        .collect::<Vec<_>>()
        .join(" ")
}
