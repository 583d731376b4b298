//! Typed tables and queries.

use notesync_protocol::{Alarm, Folder, Page, RecordStatus, SyncRecord};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// A record plus its local-only sync markers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalRecord<T> {
    /// The record as it would be pushed.
    #[serde(flatten)]
    pub record: T,
    /// Lifecycle status.
    #[serde(rename = "_status")]
    pub status: RecordStatus,
    /// Fields changed since the last acknowledgement.
    #[serde(rename = "_changed", default, skip_serializing_if = "BTreeSet::is_empty")]
    pub changed: BTreeSet<String>,
}

impl<T: SyncRecord> LocalRecord<T> {
    /// Wraps a record with a status and no changed fields.
    pub fn new(record: T, status: RecordStatus) -> Self {
        Self {
            record,
            status,
            changed: BTreeSet::new(),
        }
    }

    /// Returns true unless the record is pending deletion.
    pub fn is_live(&self) -> bool {
        self.status != RecordStatus::Deleted
    }

    /// Marks the record as matching the server.
    pub fn settle(&mut self) {
        self.status = RecordStatus::Synced;
        self.changed.clear();
    }
}

/// One collection's rows, keyed by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Table<T> {
    rows: BTreeMap<String, LocalRecord<T>>,
}

impl<T> Default for Table<T> {
    fn default() -> Self {
        Self {
            rows: BTreeMap::new(),
        }
    }
}

impl<T: SyncRecord> Table<T> {
    /// Gets a row, including rows pending deletion.
    pub fn get(&self, id: &str) -> Option<&LocalRecord<T>> {
        self.rows.get(id)
    }

    /// Gets a row mutably, including rows pending deletion.
    pub fn get_mut(&mut self, id: &str) -> Option<&mut LocalRecord<T>> {
        self.rows.get_mut(id)
    }

    /// Gets a live record.
    pub fn live(&self, id: &str) -> Option<&T> {
        self.rows
            .get(id)
            .filter(|row| row.is_live())
            .map(|row| &row.record)
    }

    /// Returns true if a live record has this id.
    pub fn contains_live(&self, id: &str) -> bool {
        self.live(id).is_some()
    }

    /// Iterates over all rows.
    pub fn iter(&self) -> impl Iterator<Item = &LocalRecord<T>> {
        self.rows.values()
    }

    /// Iterates mutably over all rows.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut LocalRecord<T>> {
        self.rows.values_mut()
    }

    /// Inserts or replaces a row.
    pub fn put(&mut self, row: LocalRecord<T>) {
        self.rows.insert(row.record.id().to_string(), row);
    }

    /// Removes a row outright.
    pub fn remove(&mut self, id: &str) -> Option<LocalRecord<T>> {
        self.rows.remove(id)
    }

    /// Number of rows, including rows pending deletion.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Runs a query over live rows.
    pub fn list(&self, query: &Query<'_, T>) -> Vec<T> {
        let mut matched: Vec<&T> = self
            .rows
            .values()
            .filter(|row| row.is_live())
            .map(|row| &row.record)
            .filter(|record| query.filter.as_ref().map_or(true, |f| f(*record)))
            .collect();

        matched.sort_by(|a, b| {
            let key = |r: &T| match query.order {
                SortOrder::CreatedAsc | SortOrder::CreatedDesc => r.created_at(),
                SortOrder::UpdatedAsc | SortOrder::UpdatedDesc => r.updated_at(),
            };
            let ordering = key(*a).cmp(&key(*b)).then_with(|| a.id().cmp(b.id()));
            match query.order {
                SortOrder::CreatedAsc | SortOrder::UpdatedAsc => ordering,
                SortOrder::CreatedDesc | SortOrder::UpdatedDesc => ordering.reverse(),
            }
        });

        matched
            .into_iter()
            .skip(query.offset)
            .take(query.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect()
    }
}

/// Sort order for [`Query`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    /// Oldest first.
    #[default]
    CreatedAsc,
    /// Newest first.
    CreatedDesc,
    /// Least recently modified first.
    UpdatedAsc,
    /// Most recently modified first.
    UpdatedDesc,
}

/// Filter, sort and range over one table.
pub struct Query<'a, T> {
    filter: Option<Box<dyn Fn(&T) -> bool + 'a>>,
    order: SortOrder,
    offset: usize,
    limit: Option<usize>,
}

impl<'a, T> Query<'a, T> {
    /// Every live record, oldest first.
    pub fn all() -> Self {
        Self {
            filter: None,
            order: SortOrder::default(),
            offset: 0,
            limit: None,
        }
    }

    /// Keeps records matching the predicate.
    pub fn filter(mut self, predicate: impl Fn(&T) -> bool + 'a) -> Self {
        self.filter = Some(Box::new(predicate));
        self
    }

    /// Sets the sort order.
    pub fn order(mut self, order: SortOrder) -> Self {
        self.order = order;
        self
    }

    /// Skips `offset` records and returns at most `limit`.
    pub fn range(mut self, offset: usize, limit: usize) -> Self {
        self.offset = offset;
        self.limit = Some(limit);
        self
    }
}

impl<T> Default for Query<'_, T> {
    fn default() -> Self {
        Self::all()
    }
}

/// The whole local database.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreData {
    /// Pages.
    #[serde(default)]
    pub pages: Table<Page>,
    /// Folders.
    #[serde(default)]
    pub folders: Table<Folder>,
    /// Alarms.
    #[serde(default)]
    pub alarms: Table<Alarm>,
    /// Server time recorded at the end of the last complete pull cycle.
    #[serde(default)]
    pub last_pulled_at: Option<i64>,
}

/// Maps a record type to its table.
pub trait TableRecord: SyncRecord {
    /// The table holding this record type.
    fn table(data: &StoreData) -> &Table<Self>;

    /// The table holding this record type, mutably.
    fn table_mut(data: &mut StoreData) -> &mut Table<Self>;

    /// Returns true if every required reference names a live record.
    fn references_resolve(&self, _data: &StoreData) -> bool {
        true
    }
}

impl TableRecord for Page {
    fn table(data: &StoreData) -> &Table<Self> {
        &data.pages
    }

    fn table_mut(data: &mut StoreData) -> &mut Table<Self> {
        &mut data.pages
    }
}

impl TableRecord for Folder {
    fn table(data: &StoreData) -> &Table<Self> {
        &data.folders
    }

    fn table_mut(data: &mut StoreData) -> &mut Table<Self> {
        &mut data.folders
    }
}

impl TableRecord for Alarm {
    fn table(data: &StoreData) -> &Table<Self> {
        &data.alarms
    }

    fn table_mut(data: &mut StoreData) -> &mut Table<Self> {
        &mut data.alarms
    }

    fn references_resolve(&self, data: &StoreData) -> bool {
        data.pages.contains_live(&self.page_id)
    }
}

/// Names of fields whose serialized values differ.
pub(crate) fn changed_fields<T: Serialize>(before: &T, after: &T) -> BTreeSet<String> {
    let (Ok(Value::Object(old)), Ok(Value::Object(new))) =
        (serde_json::to_value(before), serde_json::to_value(after))
    else {
        return BTreeSet::new();
    };

    new.iter()
        .filter(|(key, value)| old.get(key.as_str()) != Some(*value))
        .map(|(key, _)| key.clone())
        .filter(|key| key != "updated_at")
        .collect()
}
