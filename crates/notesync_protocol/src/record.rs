//! Synchronized record kinds.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The three synchronized collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    /// Note pages.
    Page,
    /// Folders grouping pages.
    Folder,
    /// Reminders attached to pages.
    Alarm,
}

impl Collection {
    /// All collections, in the order pushes are applied.
    pub const ALL: [Collection; 3] = [Collection::Folder, Collection::Page, Collection::Alarm];

    /// Returns the wire name of the collection.
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Page => "page",
            Collection::Folder => "folder",
            Collection::Alarm => "alarm",
        }
    }

    /// Parses a wire name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "page" => Some(Collection::Page),
            "folder" => Some(Collection::Folder),
            "alarm" => Some(Collection::Alarm),
            _ => None,
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Local lifecycle marker. Never persisted server-side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    /// Created locally, never acknowledged by the server.
    Created,
    /// Mutated locally since the last acknowledgement.
    Updated,
    /// Matches the server's copy.
    Synced,
    /// Deleted locally, deletion not yet acknowledged.
    Deleted,
}

impl RecordStatus {
    /// Returns true if the record has changes the server has not seen.
    pub fn is_pending(&self) -> bool {
        !matches!(self, RecordStatus::Synced)
    }
}

/// Common contract of every synchronized record.
pub trait SyncRecord:
    Clone + fmt::Debug + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// The collection this record belongs to.
    const COLLECTION: Collection;

    /// Globally unique, client-generated id.
    fn id(&self) -> &str;

    /// Owner of the record.
    fn user_id(&self) -> &str;

    /// Sets the owner of the record.
    fn set_user_id(&mut self, user_id: &str);

    /// Creation time (ms).
    fn created_at(&self) -> i64;

    /// Sets the creation time (ms).
    fn set_created_at(&mut self, millis: i64);

    /// Last mutation time (ms). The last-write-wins key.
    fn updated_at(&self) -> i64;

    /// Sets the last mutation time (ms).
    fn set_updated_at(&mut self, millis: i64);

    /// Character budget this record consumes in a pull chunk.
    fn content_size(&self) -> usize {
        0
    }
}

/// Kind of page content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageKind {
    /// Rich text.
    #[default]
    Text,
    /// Drawing canvas.
    Draw,
}

/// A note page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    /// Page id.
    pub id: String,
    /// Owner.
    #[serde(default)]
    pub user_id: String,
    /// Title text.
    #[serde(default)]
    pub title: String,
    /// Body text.
    #[serde(default)]
    pub body: String,
    /// Whether the page is publicly readable.
    #[serde(default)]
    pub is_public: bool,
    /// Cover image.
    #[serde(default)]
    pub img_url: Option<String>,
    /// Character count of title + body.
    #[serde(default)]
    pub length: i64,
    /// Content kind.
    #[serde(rename = "type", default)]
    pub kind: PageKind,
    /// Containing folder. A relation, not ownership.
    #[serde(default)]
    pub folder_id: Option<String>,
    /// Creation time (ms).
    #[serde(default)]
    pub created_at: i64,
    /// Last mutation time (ms).
    pub updated_at: i64,
}

impl Page {
    /// Creates an empty text page.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            user_id: String::new(),
            title: String::new(),
            body: String::new(),
            is_public: false,
            img_url: None,
            length: 0,
            kind: PageKind::Text,
            folder_id: None,
            created_at: 0,
            updated_at: 0,
        }
    }

    /// Sets the title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Sets the body.
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Places the page in a folder.
    pub fn with_folder(mut self, folder_id: impl Into<String>) -> Self {
        self.folder_id = Some(folder_id.into());
        self
    }

    /// Sets both timestamps.
    pub fn with_timestamps(mut self, created_at: i64, updated_at: i64) -> Self {
        self.created_at = created_at;
        self.updated_at = updated_at;
        self
    }

    /// Character count of title + body.
    pub fn char_len(&self) -> usize {
        self.title.chars().count() + self.body.chars().count()
    }

    /// Recomputes the derived `length` field.
    pub fn refresh_length(&mut self) {
        self.length = self.char_len() as i64;
    }
}

impl SyncRecord for Page {
    const COLLECTION: Collection = Collection::Page;

    fn id(&self) -> &str {
        &self.id
    }

    fn user_id(&self) -> &str {
        &self.user_id
    }

    fn set_user_id(&mut self, user_id: &str) {
        self.user_id = user_id.to_string();
    }

    fn created_at(&self) -> i64 {
        self.created_at
    }

    fn set_created_at(&mut self, millis: i64) {
        self.created_at = millis;
    }

    fn updated_at(&self) -> i64 {
        self.updated_at
    }

    fn set_updated_at(&mut self, millis: i64) {
        self.updated_at = millis;
    }

    fn content_size(&self) -> usize {
        self.char_len()
    }
}

/// A folder of pages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Folder {
    /// Folder id.
    pub id: String,
    /// Owner.
    #[serde(default)]
    pub user_id: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Optional description.
    #[serde(default)]
    pub description: Option<String>,
    /// Optional thumbnail.
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    /// Number of live pages in the folder. Derived.
    #[serde(default)]
    pub page_count: i64,
    /// When a page was last added to the folder (ms).
    #[serde(default)]
    pub last_page_added_at: Option<i64>,
    /// Creation time (ms).
    #[serde(default)]
    pub created_at: i64,
    /// Last mutation time (ms).
    pub updated_at: i64,
}

impl Folder {
    /// Creates an empty folder.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            user_id: String::new(),
            name: name.into(),
            description: None,
            thumbnail_url: None,
            page_count: 0,
            last_page_added_at: None,
            created_at: 0,
            updated_at: 0,
        }
    }

    /// Sets both timestamps.
    pub fn with_timestamps(mut self, created_at: i64, updated_at: i64) -> Self {
        self.created_at = created_at;
        self.updated_at = updated_at;
        self
    }
}

impl SyncRecord for Folder {
    const COLLECTION: Collection = Collection::Folder;

    fn id(&self) -> &str {
        &self.id
    }

    fn user_id(&self) -> &str {
        &self.user_id
    }

    fn set_user_id(&mut self, user_id: &str) {
        self.user_id = user_id.to_string();
    }

    fn created_at(&self) -> i64 {
        self.created_at
    }

    fn set_created_at(&mut self, millis: i64) {
        self.created_at = millis;
    }

    fn updated_at(&self) -> i64 {
        self.updated_at
    }

    fn set_updated_at(&mut self, millis: i64) {
        self.updated_at = millis;
    }
}

/// A reminder attached to a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alarm {
    /// Alarm id.
    pub id: String,
    /// Owner.
    #[serde(default)]
    pub user_id: String,
    /// Page this alarm fires for.
    pub page_id: String,
    /// Next fire time (ms).
    #[serde(default)]
    pub next_alarm_time: i64,
    /// Notifications sent so far.
    #[serde(default)]
    pub sent_count: i64,
    /// Id of the last notification delivered.
    #[serde(default)]
    pub last_notification_id: Option<String>,
    /// Creation time (ms).
    #[serde(default)]
    pub created_at: i64,
    /// Last mutation time (ms).
    pub updated_at: i64,
}

impl Alarm {
    /// Creates an alarm for a page.
    pub fn new(id: impl Into<String>, page_id: impl Into<String>, next_alarm_time: i64) -> Self {
        Self {
            id: id.into(),
            user_id: String::new(),
            page_id: page_id.into(),
            next_alarm_time,
            sent_count: 0,
            last_notification_id: None,
            created_at: 0,
            updated_at: 0,
        }
    }

    /// Sets both timestamps.
    pub fn with_timestamps(mut self, created_at: i64, updated_at: i64) -> Self {
        self.created_at = created_at;
        self.updated_at = updated_at;
        self
    }
}

impl SyncRecord for Alarm {
    const COLLECTION: Collection = Collection::Alarm;

    fn id(&self) -> &str {
        &self.id
    }

    fn user_id(&self) -> &str {
        &self.user_id
    }

    fn set_user_id(&mut self, user_id: &str) {
        self.user_id = user_id.to_string();
    }

    fn created_at(&self) -> i64 {
        self.created_at
    }

    fn set_created_at(&mut self, millis: i64) {
        self.created_at = millis;
    }

    fn updated_at(&self) -> i64 {
        self.updated_at
    }

    fn set_updated_at(&mut self, millis: i64) {
        self.updated_at = millis;
    }
}

/// Retained marker of a deletion, propagated to other clients on pull.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tombstone {
    /// Id of the deleted record.
    pub id: String,
    /// Owner of the deleted record.
    pub user_id: String,
    /// Deletion time (ms).
    pub deleted_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collection_names() {
        for collection in Collection::ALL {
            assert_eq!(Collection::from_name(collection.as_str()), Some(collection));
        }
        assert_eq!(Collection::from_name("pages"), None);
        assert_eq!(Collection::Alarm.to_string(), "alarm");
    }

    #[test]
    fn page_kind_serializes_as_type() {
        let mut page = Page::new("p1").with_title("Hi");
        page.kind = PageKind::Draw;
        let json = serde_json::to_value(&page).unwrap();
        assert_eq!(json["type"], "draw");
        assert!(json.get("kind").is_none());
    }

    #[test]
    fn page_length_counts_chars_not_bytes() {
        let mut page = Page::new("p1").with_title("héllo").with_body("wörld");
        page.refresh_length();
        assert_eq!(page.length, 10);
        assert_eq!(page.content_size(), 10);
    }

    #[test]
    fn minimal_page_deserializes_with_defaults() {
        let page: Page = serde_json::from_str(r#"{"id":"p1","updated_at":5}"#).unwrap();
        assert_eq!(page.id, "p1");
        assert_eq!(page.updated_at, 5);
        assert_eq!(page.kind, PageKind::Text);
        assert!(page.folder_id.is_none());
    }

    #[test]
    fn only_synced_is_settled() {
        assert!(RecordStatus::Created.is_pending());
        assert!(RecordStatus::Updated.is_pending());
        assert!(RecordStatus::Deleted.is_pending());
        assert!(!RecordStatus::Synced.is_pending());
    }
}
