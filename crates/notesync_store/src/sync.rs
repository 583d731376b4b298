//! Operations used by the sync engine.
//!
//! Local edits go through [`crate::ops`]; these entry points apply what the
//! server says instead. They never record changed fields and never make a
//! row pending.

use crate::ops::recount_all;
use crate::store::{LocalStore, Transaction};
use crate::table::{LocalRecord, TableRecord};
use notesync_protocol::{DeletedIds, RecordStatus, SyncRecord};
use std::ops::AddAssign;
use tracing::debug;

/// What happened when server rows were merged into the local store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    /// Rows written as `synced`.
    pub applied: usize,
    /// Rows left alone because a newer local edit is pending.
    pub kept: usize,
    /// Rows dropped because they reference a record that is not here.
    pub skipped: usize,
    /// Rows removed because the server deleted them.
    pub removed: usize,
}

impl MergeStats {
    /// Total rows looked at.
    pub fn total(&self) -> usize {
        self.applied + self.kept + self.skipped + self.removed
    }
}

impl AddAssign for MergeStats {
    fn add_assign(&mut self, other: Self) {
        self.applied += other.applied;
        self.kept += other.kept;
        self.skipped += other.skipped;
        self.removed += other.removed;
    }
}

impl Transaction<'_> {
    /// Marks pushed records as `synced`.
    ///
    /// `pushed` pairs each id with the `updated_at` that was sent. A record
    /// edited again since then keeps its pending status. Returns how many
    /// rows were settled.
    pub fn mark_synced<T: TableRecord>(&mut self, pushed: &[(String, i64)]) -> usize {
        let table = T::table_mut(self.data);
        let mut settled = 0;
        for (id, updated_at) in pushed {
            if let Some(row) = table.get_mut(id) {
                if row.is_live() && row.record.updated_at() == *updated_at {
                    row.settle();
                    settled += 1;
                }
            }
        }
        settled
    }

    /// Drops rows whose deletion the server acknowledged.
    pub fn purge_deleted<T: TableRecord>(&mut self, ids: &[String]) -> usize {
        let table = T::table_mut(self.data);
        let mut purged = 0;
        for id in ids {
            if table.get(id).is_some_and(|row| row.status == RecordStatus::Deleted) {
                table.remove(id);
                purged += 1;
            }
        }
        purged
    }

    /// Merges server rows into the store.
    ///
    /// A row replaces the local one and is marked `synced` unless the local
    /// row is pending with a strictly newer `updated_at`, or is pending
    /// deletion. Alarms whose page is not live locally are skipped.
    pub fn apply_remote<T: TableRecord>(&mut self, rows: Vec<T>) -> MergeStats {
        let mut stats = MergeStats::default();
        for row in rows {
            if !row.references_resolve(&*self.data) {
                stats.skipped += 1;
                continue;
            }

            let table = T::table_mut(self.data);
            let keep_local = table.get(row.id()).is_some_and(|local| match local.status {
                RecordStatus::Deleted => true,
                RecordStatus::Created | RecordStatus::Updated => {
                    local.record.updated_at() > row.updated_at()
                }
                RecordStatus::Synced => false,
            });

            if keep_local {
                stats.kept += 1;
            } else {
                table.put(LocalRecord::new(row, RecordStatus::Synced));
                stats.applied += 1;
            }
        }
        if stats.applied > 0 {
            self.repair_references();
        }
        stats
    }

    /// Removes rows the server has deleted, whatever their local status.
    pub fn apply_remote_deletes(&mut self, deleted: &DeletedIds) -> MergeStats {
        let mut stats = MergeStats::default();

        for id in &deleted.alarms {
            if self.data.alarms.remove(id).is_some() {
                stats.removed += 1;
            }
        }
        for id in &deleted.pages {
            if self.data.pages.remove(id).is_some() {
                stats.removed += 1;
            }
        }
        for id in &deleted.folders {
            if self.data.folders.remove(id).is_some() {
                stats.removed += 1;
            }
        }

        if !deleted.is_empty() {
            debug!(removed = stats.removed, "applied remote deletions");
            self.repair_references();
        }
        stats
    }

    /// Records the server time of the last complete pull cycle.
    pub fn set_last_pulled_at(&mut self, server_time: i64) {
        self.data.last_pulled_at = Some(server_time);
    }

    /// Restores referential integrity after server rows were merged.
    ///
    /// Pages pointing at a folder that is gone are detached, alarms whose
    /// page is gone are dropped, and folder counts are recomputed. Rows are
    /// not marked pending: the server applies the same rules.
    pub fn repair_references(&mut self) {
        let data = &mut *self.data;

        let live_folders: Vec<String> = data
            .folders
            .iter()
            .filter(|row| row.is_live())
            .map(|row| row.record.id.clone())
            .collect();
        for row in data.pages.iter_mut() {
            if let Some(folder_id) = &row.record.folder_id {
                if !live_folders.contains(folder_id) {
                    row.record.folder_id = None;
                }
            }
        }

        let orphans: Vec<String> = data
            .alarms
            .iter()
            .filter(|row| !data.pages.contains_live(&row.record.page_id))
            .map(|row| row.record.id.clone())
            .collect();
        for id in &orphans {
            data.alarms.remove(id);
        }

        recount_all(data);
    }
}

impl LocalStore {
    /// Rows of one collection with changes the server has not seen.
    pub fn pending<T: TableRecord>(&self) -> Vec<LocalRecord<T>> {
        self.read(|data| {
            T::table(data)
                .iter()
                .filter(|row| row.status.is_pending())
                .cloned()
                .collect()
        })
    }

    /// Returns true if any collection has unpushed changes.
    pub fn has_pending(&self) -> bool {
        let counts = self.counts();
        counts.pages.pending() + counts.folders.pending() + counts.alarms.pending() > 0
    }
}
