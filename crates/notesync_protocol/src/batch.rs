//! Push batches.

use crate::record::{Alarm, Collection, Folder, Page};
use serde::{Deserialize, Serialize};

/// Changes to one collection since the last successful push.
///
/// A record id appears in at most one of the three buckets. Deletions carry
/// only the id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct ChangeBatch<T> {
    /// Records created locally.
    #[serde(default)]
    pub created: Vec<T>,
    /// Records updated locally.
    #[serde(default)]
    pub updated: Vec<T>,
    /// Ids of records deleted locally.
    #[serde(default)]
    pub deleted: Vec<String>,
}

impl<T> ChangeBatch<T> {
    /// Creates an empty batch.
    pub fn new() -> Self {
        Self {
            created: Vec::new(),
            updated: Vec::new(),
            deleted: Vec::new(),
        }
    }

    /// Returns true if the batch carries no changes.
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }

    /// Total number of changes in the batch.
    pub fn len(&self) -> usize {
        self.created.len() + self.updated.len() + self.deleted.len()
    }
}

impl<T> Default for ChangeBatch<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// A push body: one optional batch per collection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangeSet {
    /// Page changes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<ChangeBatch<Page>>,
    /// Folder changes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder: Option<ChangeBatch<Folder>>,
    /// Alarm changes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alarm: Option<ChangeBatch<Alarm>>,
}

impl ChangeSet {
    /// Builds a change set, dropping empty batches.
    pub fn from_batches(
        page: ChangeBatch<Page>,
        folder: ChangeBatch<Folder>,
        alarm: ChangeBatch<Alarm>,
    ) -> Self {
        fn keep<T>(batch: ChangeBatch<T>) -> Option<ChangeBatch<T>> {
            (!batch.is_empty()).then_some(batch)
        }
        Self {
            page: keep(page),
            folder: keep(folder),
            alarm: keep(alarm),
        }
    }

    /// Returns true if nothing needs pushing.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total number of changes across collections.
    pub fn len(&self) -> usize {
        self.page.as_ref().map_or(0, ChangeBatch::len)
            + self.folder.as_ref().map_or(0, ChangeBatch::len)
            + self.alarm.as_ref().map_or(0, ChangeBatch::len)
    }

    /// Number of changes for one collection.
    pub fn count(&self, collection: Collection) -> usize {
        match collection {
            Collection::Page => self.page.as_ref().map_or(0, ChangeBatch::len),
            Collection::Folder => self.folder.as_ref().map_or(0, ChangeBatch::len),
            Collection::Alarm => self.alarm.as_ref().map_or(0, ChangeBatch::len),
        }
    }
}
