//! The local store and its transactions.

use crate::clock::{Clock, SystemClock};
use crate::error::{StoreError, StoreResult};
use crate::table::{changed_fields, LocalRecord, Query, StoreData, TableRecord};
use notesync_protocol::{Alarm, Folder, Page, RecordStatus, SyncRecord};
use parking_lot::RwLock;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Embedded record store for one signed-in user.
///
/// Every mutation runs inside [`LocalStore::transaction`]: the closure works
/// on a private copy of the data which replaces the committed state only if
/// the closure returns `Ok` (and, for a persistent store, the snapshot was
/// written). Writers are serialized by the store's lock.
///
/// # Example
///
/// ```
/// use notesync_store::LocalStore;
/// use notesync_protocol::{Folder, Page};
///
/// let store = LocalStore::open_in_memory("user-1");
/// store.create_folder(Folder::new("f1", "Work")).unwrap();
/// store.create_page(Page::new("p1").with_folder("f1")).unwrap();
///
/// let folder = store.get::<Folder>("f1").unwrap();
/// assert_eq!(folder.page_count, 1);
/// ```
#[derive(Debug)]
pub struct LocalStore {
    data: RwLock<StoreData>,
    clock: Arc<dyn Clock>,
    user_id: String,
    snapshot_path: Option<PathBuf>,
}

impl LocalStore {
    /// Opens a store that lives only in memory.
    pub fn open_in_memory(user_id: impl Into<String>) -> Self {
        Self {
            data: RwLock::new(StoreData::default()),
            clock: Arc::new(SystemClock),
            user_id: user_id.into(),
            snapshot_path: None,
        }
    }

    /// Opens (or creates) a store persisted as a JSON snapshot at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing snapshot cannot be read or decoded.
    pub fn open(path: &Path, user_id: impl Into<String>) -> StoreResult<Self> {
        let data = if path.exists() {
            let bytes = fs::read(path)?;
            serde_json::from_slice(&bytes).map_err(|e| StoreError::Snapshot(e.to_string()))?
        } else {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            StoreData::default()
        };

        Ok(Self {
            data: RwLock::new(data),
            clock: Arc::new(SystemClock),
            user_id: user_id.into(),
            snapshot_path: Some(path.to_path_buf()),
        })
    }

    /// Reads a snapshot file without opening it for writing.
    pub fn load_snapshot(path: &Path) -> StoreResult<StoreData> {
        let bytes = fs::read(path)?;
        serde_json::from_slice(&bytes).map_err(|e| StoreError::Snapshot(e.to_string()))
    }

    /// Replaces the clock used to stamp timestamps.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// The user this store belongs to.
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Current time according to the store's clock.
    pub fn now_millis(&self) -> i64 {
        self.clock.now_millis()
    }

    /// Executes a function within a transaction.
    ///
    /// If the function returns `Ok`, the changes are committed.
    /// If it returns `Err`, nothing is changed.
    pub fn transaction<F, R>(&self, f: F) -> StoreResult<R>
    where
        F: FnOnce(&mut Transaction<'_>) -> StoreResult<R>,
    {
        let mut committed = self.data.write();
        let mut working = committed.clone();

        let result = {
            let mut txn = Transaction {
                data: &mut working,
                clock: self.clock.as_ref(),
                user_id: &self.user_id,
            };
            f(&mut txn)?
        };

        if let Some(path) = &self.snapshot_path {
            write_snapshot(path, &working)?;
        }
        *committed = working;
        Ok(result)
    }

    /// Runs a read-only function against the committed state.
    pub fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&StoreData) -> R,
    {
        f(&self.data.read())
    }

    /// Gets a live record by id.
    pub fn get<T: TableRecord>(&self, id: &str) -> Option<T> {
        self.read(|data| T::table(data).live(id).cloned())
    }

    /// Lists live records matching a query.
    pub fn list<T: TableRecord>(&self, query: &Query<'_, T>) -> Vec<T> {
        self.read(|data| T::table(data).list(query))
    }

    /// All rows of a collection with their sync markers, including rows
    /// pending deletion.
    pub fn records<T: TableRecord>(&self) -> Vec<LocalRecord<T>> {
        self.read(|data| T::table(data).iter().cloned().collect())
    }

    /// Server time of the last complete pull cycle.
    pub fn last_pulled_at(&self) -> Option<i64> {
        self.read(|data| data.last_pulled_at)
    }

    /// Row counts by status.
    pub fn counts(&self) -> StoreCounts {
        self.read(StoreCounts::from_data)
    }

    /// Creates a folder.
    pub fn create_folder(&self, folder: Folder) -> StoreResult<Folder> {
        self.transaction(|txn| txn.create_folder(folder))
    }

    /// Updates a folder.
    pub fn update_folder(&self, id: &str, f: impl FnOnce(&mut Folder)) -> StoreResult<Folder> {
        self.transaction(|txn| txn.update_folder(id, f))
    }

    /// Deletes a folder, detaching its pages.
    pub fn delete_folder(&self, id: &str) -> StoreResult<Folder> {
        self.transaction(|txn| txn.delete_folder(id))
    }

    /// Creates a page.
    pub fn create_page(&self, page: Page) -> StoreResult<Page> {
        self.transaction(|txn| txn.create_page(page))
    }

    /// Updates a page.
    pub fn update_page(&self, id: &str, f: impl FnOnce(&mut Page)) -> StoreResult<Page> {
        self.transaction(|txn| txn.update_page(id, f))
    }

    /// Deletes a page and its alarms.
    pub fn delete_page(&self, id: &str) -> StoreResult<Page> {
        self.transaction(|txn| txn.delete_page(id))
    }

    /// Creates an alarm.
    pub fn create_alarm(&self, alarm: Alarm) -> StoreResult<Alarm> {
        self.transaction(|txn| txn.create_alarm(alarm))
    }

    /// Updates an alarm.
    pub fn update_alarm(&self, id: &str, f: impl FnOnce(&mut Alarm)) -> StoreResult<Alarm> {
        self.transaction(|txn| txn.update_alarm(id, f))
    }

    /// Deletes an alarm.
    pub fn delete_alarm(&self, id: &str) -> StoreResult<Alarm> {
        self.transaction(|txn| txn.delete_alarm(id))
    }
}

fn write_snapshot(path: &Path, data: &StoreData) -> StoreResult<()> {
    let bytes = serde_json::to_vec(data).map_err(|e| StoreError::Snapshot(e.to_string()))?;
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Mutable access to the store inside [`LocalStore::transaction`].
pub struct Transaction<'a> {
    pub(crate) data: &'a mut StoreData,
    pub(crate) clock: &'a dyn Clock,
    pub(crate) user_id: &'a str,
}

impl Transaction<'_> {
    /// The working copy of the data.
    pub fn data(&self) -> &StoreData {
        &*self.data
    }

    /// Current time according to the store's clock.
    pub fn now_millis(&self) -> i64 {
        self.clock.now_millis()
    }

    /// Gets a live record by id.
    pub fn get<T: TableRecord>(&self, id: &str) -> Option<&T> {
        T::table(&*self.data).live(id)
    }

    /// Lists live records matching a query.
    pub fn list<T: TableRecord>(&self, query: &Query<'_, T>) -> Vec<T> {
        T::table(&*self.data).list(query)
    }

    /// Inserts a new record with status `created`.
    ///
    /// The store stamps the owner and both timestamps.
    pub fn insert<T: TableRecord>(&mut self, mut record: T) -> StoreResult<T> {
        if T::table(&*self.data).get(record.id()).is_some() {
            return Err(StoreError::AlreadyExists {
                collection: T::COLLECTION,
                id: record.id().to_string(),
            });
        }

        let now = self.clock.now_millis();
        record.set_user_id(self.user_id);
        record.set_created_at(now);
        record.set_updated_at(now);

        T::table_mut(self.data).put(LocalRecord::new(record.clone(), RecordStatus::Created));
        Ok(record)
    }

    /// Applies `f` to a live record and records what changed.
    ///
    /// A no-op mutation leaves the record untouched. Otherwise `updated_at`
    /// moves strictly forward and a `synced` record becomes `updated`; a
    /// `created` record stays `created`.
    pub fn update<T: TableRecord>(&mut self, id: &str, f: impl FnOnce(&mut T)) -> StoreResult<T> {
        let now = self.clock.now_millis();
        let row = T::table_mut(self.data)
            .get_mut(id)
            .filter(|row| row.is_live())
            .ok_or_else(|| StoreError::not_found(T::COLLECTION, id))?;

        let before = row.record.clone();
        let mut after = before.clone();
        f(&mut after);
        restore_identity(&before, &mut after);

        let fields = changed_fields(&before, &after);
        if fields.is_empty() {
            return Ok(before);
        }

        after.set_updated_at(now.max(before.updated_at() + 1));
        row.record = after.clone();
        row.changed.extend(fields);
        if row.status == RecordStatus::Synced {
            row.status = RecordStatus::Updated;
        }
        Ok(after)
    }

    /// Deletes a live record.
    ///
    /// The row is kept as `deleted` until the server acknowledges the
    /// deletion, even if it was never synced: a push carrying the row may
    /// already be in flight.
    pub fn remove<T: TableRecord>(&mut self, id: &str) -> StoreResult<T> {
        let row = T::table_mut(self.data)
            .get_mut(id)
            .filter(|row| row.is_live())
            .ok_or_else(|| StoreError::not_found(T::COLLECTION, id))?;

        row.status = RecordStatus::Deleted;
        row.changed.clear();
        Ok(row.record.clone())
    }
}

/// Keeps identity and ownership fields out of reach of update closures.
fn restore_identity<T: SyncRecord>(before: &T, after: &mut T) {
    if after.id() != before.id() {
        // id is the primary key
        let mut fixed = before.clone();
        std::mem::swap(after, &mut fixed);
        return;
    }
    after.set_user_id(before.user_id());
    after.set_created_at(before.created_at());
    after.set_updated_at(before.updated_at());
}

/// Row counts by status, per collection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreCounts {
    /// Page counts.
    pub pages: StatusCounts,
    /// Folder counts.
    pub folders: StatusCounts,
    /// Alarm counts.
    pub alarms: StatusCounts,
}

/// Row counts by status for one collection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    /// Created locally.
    pub created: usize,
    /// Updated locally.
    pub updated: usize,
    /// Synced.
    pub synced: usize,
    /// Pending deletion.
    pub deleted: usize,
}

impl StatusCounts {
    fn tally<'a, T: 'a>(rows: impl Iterator<Item = &'a LocalRecord<T>>) -> Self {
        let mut counts = Self::default();
        for row in rows {
            match row.status {
                RecordStatus::Created => counts.created += 1,
                RecordStatus::Updated => counts.updated += 1,
                RecordStatus::Synced => counts.synced += 1,
                RecordStatus::Deleted => counts.deleted += 1,
            }
        }
        counts
    }

    /// Rows with changes the server has not seen.
    pub fn pending(&self) -> usize {
        self.created + self.updated + self.deleted
    }
}

impl StoreCounts {
    /// Tallies a store's rows.
    pub fn from_data(data: &StoreData) -> Self {
        Self {
            pages: StatusCounts::tally(data.pages.iter()),
            folders: StatusCounts::tally(data.folders.iter()),
            alarms: StatusCounts::tally(data.alarms.iter()),
        }
    }
}
