//! Server store of record: live rows plus per-collection tombstones.

use crate::error::ServerResult;
use notesync_protocol::{Alarm, Folder, Page, SyncRecord, Tombstone};
use notesync_store::{Clock, SystemClock};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// One collection: live rows and tombstones, both keyed by id.
#[derive(Debug, Clone)]
pub struct ServerTable<T> {
    rows: BTreeMap<String, T>,
    tombstones: BTreeMap<String, Tombstone>,
}

impl<T> Default for ServerTable<T> {
    fn default() -> Self {
        Self {
            rows: BTreeMap::new(),
            tombstones: BTreeMap::new(),
        }
    }
}

impl<T: SyncRecord> ServerTable<T> {
    /// Live row by id.
    pub fn get(&self, id: &str) -> Option<&T> {
        self.rows.get(id)
    }

    /// Live row by id, mutably.
    pub fn get_mut(&mut self, id: &str) -> Option<&mut T> {
        self.rows.get_mut(id)
    }

    /// Tombstone by id.
    pub fn tombstone(&self, id: &str) -> Option<&Tombstone> {
        self.tombstones.get(id)
    }

    /// Writes a live row.
    pub fn put(&mut self, row: T) {
        self.rows.insert(row.id().to_string(), row);
    }

    /// Removes the live row (if any) and records a tombstone.
    ///
    /// Returns the removed row. An existing tombstone keeps its original
    /// deletion time.
    pub fn bury(&mut self, id: &str, user_id: &str, deleted_at: i64) -> Option<T> {
        let removed = self.rows.remove(id);
        self.tombstones
            .entry(id.to_string())
            .or_insert_with(|| Tombstone {
                id: id.to_string(),
                user_id: user_id.to_string(),
                deleted_at,
            });
        removed
    }

    /// Live rows owned by `user_id`, in id order.
    pub fn owned_by<'a>(&'a self, user_id: &'a str) -> impl Iterator<Item = &'a T> + 'a {
        self.rows.values().filter(move |row| row.user_id() == user_id)
    }

    /// Live rows owned by `user_id`, mutably.
    pub fn owned_by_mut<'a>(&'a mut self, user_id: &'a str) -> impl Iterator<Item = &'a mut T> + 'a {
        self.rows
            .values_mut()
            .filter(move |row| row.user_id() == user_id)
    }

    /// Ids of `user_id`'s tombstones recorded at or after `since`.
    pub fn buried_since(&self, user_id: &str, since: Option<i64>) -> Vec<String> {
        self.tombstones
            .values()
            .filter(|t| t.user_id == user_id && since.map_or(true, |since| t.deleted_at >= since))
            .map(|t| t.id.clone())
            .collect()
    }

    /// Number of live rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if there are no live rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Number of tombstones.
    pub fn tombstone_count(&self) -> usize {
        self.tombstones.len()
    }
}

/// All server-side state.
#[derive(Debug, Clone, Default)]
pub struct ServerData {
    /// Pages.
    pub pages: ServerTable<Page>,
    /// Folders.
    pub folders: ServerTable<Folder>,
    /// Alarms.
    pub alarms: ServerTable<Alarm>,
}

/// Maps a record type to its server table.
pub trait ServerRecord: SyncRecord {
    /// The table holding this record type.
    fn table(data: &ServerData) -> &ServerTable<Self>;

    /// The table holding this record type, mutably.
    fn table_mut(data: &mut ServerData) -> &mut ServerTable<Self>;
}

impl ServerRecord for Page {
    fn table(data: &ServerData) -> &ServerTable<Self> {
        &data.pages
    }

    fn table_mut(data: &mut ServerData) -> &mut ServerTable<Self> {
        &mut data.pages
    }
}

impl ServerRecord for Folder {
    fn table(data: &ServerData) -> &ServerTable<Self> {
        &data.folders
    }

    fn table_mut(data: &mut ServerData) -> &mut ServerTable<Self> {
        &mut data.folders
    }
}

impl ServerRecord for Alarm {
    fn table(data: &ServerData) -> &ServerTable<Self> {
        &data.alarms
    }

    fn table_mut(data: &mut ServerData) -> &mut ServerTable<Self> {
        &mut data.alarms
    }
}

/// Thread-safe server store with all-or-nothing transactions.
pub struct ServerStore {
    data: RwLock<ServerData>,
    clock: Arc<dyn Clock>,
}

impl ServerStore {
    /// Creates an empty store on the wall clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Creates an empty store on the given clock.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            data: RwLock::new(ServerData::default()),
            clock,
        }
    }

    /// Current server time (ms).
    pub fn now_millis(&self) -> i64 {
        self.clock.now_millis()
    }

    /// Runs `f` against a read view of the data.
    pub fn read<R>(&self, f: impl FnOnce(&ServerData) -> R) -> R {
        f(&self.data.read())
    }

    /// Runs `f` on a working copy and commits it only if `f` succeeds.
    ///
    /// Writers are serialized; readers see either the old or the new state.
    pub fn transaction<R>(&self, f: impl FnOnce(&mut ServerData) -> ServerResult<R>) -> ServerResult<R> {
        let mut guard = self.data.write();
        let mut working = guard.clone();
        let result = f(&mut working);
        match &result {
            Ok(_) => *guard = working,
            Err(e) => debug!(error = %e, "server transaction rolled back"),
        }
        result
    }
}

impl Default for ServerStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServerError;
    use notesync_protocol::Collection;

    fn page(id: &str, user: &str) -> Page {
        let mut page = Page::new(id).with_timestamps(1, 1);
        page.user_id = user.into();
        page
    }

    #[test]
    fn bury_keeps_first_deletion_time() {
        let mut table = ServerTable::default();
        table.put(page("p1", "u1"));

        assert!(table.bury("p1", "u1", 10).is_some());
        assert!(table.bury("p1", "u1", 20).is_none());
        assert_eq!(table.tombstone("p1").map(|t| t.deleted_at), Some(10));
        assert!(table.get("p1").is_none());
    }

    #[test]
    fn tombstones_are_scoped_by_user_and_time() {
        let mut table: ServerTable<Page> = ServerTable::default();
        table.bury("a", "u1", 10);
        table.bury("b", "u1", 30);
        table.bury("c", "u2", 30);

        assert_eq!(table.buried_since("u1", None), vec!["a", "b"]);
        assert_eq!(table.buried_since("u1", Some(20)), vec!["b"]);
    }

    #[test]
    fn failed_transaction_changes_nothing() {
        let store = ServerStore::new();
        let result: ServerResult<()> = store.transaction(|data| {
            data.pages.put(page("p1", "u1"));
            Err(ServerError::rejected(Collection::Page, "nope"))
        });
        assert!(result.is_err());
        assert!(store.read(|data| data.pages.is_empty()));

        store
            .transaction(|data| {
                data.pages.put(page("p1", "u1"));
                Ok(())
            })
            .unwrap();
        assert_eq!(store.read(|data| data.pages.len()), 1);
    }
}
