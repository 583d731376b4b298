//! Protocol messages for sync.

use crate::batch::ChangeSet;
use crate::cursor::PullCursor;
use crate::error::{ProtocolError, ProtocolResult};
use crate::record::{Alarm, Folder, Page};
use serde::{Deserialize, Serialize};

/// Pull request: one chunk after `cursor`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PullRequest {
    /// Position after which rows are wanted. `None` starts a new cycle.
    pub cursor: Option<PullCursor>,
    /// Tombstones older than this are not re-sent.
    pub last_pulled_at: Option<i64>,
}

impl PullRequest {
    /// Creates a pull request.
    pub fn new(cursor: Option<PullCursor>, last_pulled_at: Option<i64>) -> Self {
        Self {
            cursor,
            last_pulled_at,
        }
    }

    /// Returns true if this request opens a pull cycle.
    pub fn is_first_chunk(&self) -> bool {
        self.cursor.is_none()
    }

    /// Renders the request as query parameters.
    pub fn to_query(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        if let Some(cursor) = &self.cursor {
            pairs.push(("created_at".to_string(), cursor.created_at.to_string()));
            pairs.push(("last_id".to_string(), cursor.id.clone()));
        }
        if let Some(since) = self.last_pulled_at {
            pairs.push(("last_pulled_at".to_string(), since.to_string()));
        }
        pairs
    }

    /// Parses the request from query parameters.
    pub fn from_query(pairs: &[(String, String)]) -> ProtocolResult<Self> {
        let cursor = PullCursor::from_parts(
            query_value(pairs, "created_at"),
            query_value(pairs, "last_id"),
        )?;
        let last_pulled_at = parse_millis(pairs, "last_pulled_at")?;
        Ok(Self {
            cursor,
            last_pulled_at,
        })
    }
}

/// Ids tombstoned on the server, per collection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletedIds {
    /// Deleted page ids.
    #[serde(default)]
    pub pages: Vec<String>,
    /// Deleted folder ids.
    #[serde(default)]
    pub folders: Vec<String>,
    /// Deleted alarm ids.
    #[serde(default)]
    pub alarms: Vec<String>,
}

impl DeletedIds {
    /// Returns true if no ids are listed.
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty() && self.folders.is_empty() && self.alarms.is_empty()
    }

    /// Total number of ids.
    pub fn len(&self) -> usize {
        self.pages.len() + self.folders.len() + self.alarms.len()
    }
}

/// One pull chunk.
///
/// Folder and alarm snapshots and tombstones ride only on the first chunk of
/// a cycle; pages are paginated by the `(created_at, lastId)` cursor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PullResponse {
    /// Pages in cursor order.
    pub pages: Vec<Page>,
    /// Full folder snapshot (first chunk only).
    #[serde(default)]
    pub folders: Vec<Folder>,
    /// Full alarm snapshot (first chunk only).
    #[serde(default)]
    pub alarms: Vec<Alarm>,
    /// Tombstoned ids (first chunk only).
    #[serde(default)]
    pub deleted: DeletedIds,
    /// Cursor timestamp of the last page, as a string.
    pub created_at: Option<String>,
    /// Cursor id of the last page.
    #[serde(rename = "lastId")]
    pub last_id: Option<String>,
    /// Whether more pages remain after this chunk.
    #[serde(rename = "hasMore")]
    pub has_more: bool,
    /// Server clock when the chunk was produced (first chunk only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_time: Option<i64>,
}

impl PullResponse {
    /// Returns the cursor to continue from, if the chunk carried one.
    pub fn cursor(&self) -> ProtocolResult<Option<PullCursor>> {
        PullCursor::from_parts(self.created_at.as_deref(), self.last_id.as_deref())
    }

    /// Sets the continuation cursor.
    pub fn set_cursor(&mut self, cursor: Option<PullCursor>) {
        match cursor {
            Some(cursor) => {
                self.created_at = Some(cursor.created_at.to_string());
                self.last_id = Some(cursor.id);
            }
            None => {
                self.created_at = None;
                self.last_id = None;
            }
        }
    }

    /// Total number of rows and tombstones carried.
    pub fn row_count(&self) -> usize {
        self.pages.len() + self.folders.len() + self.alarms.len() + self.deleted.len()
    }

    /// Encodes to JSON.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| ProtocolError::InvalidMessage(e.to_string()))
    }

    /// Decodes from JSON.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        serde_json::from_slice(bytes).map_err(ProtocolError::from_json)
    }
}

/// Push request: all local changes in one batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PushRequest {
    /// The cursor the client believes the server was at.
    pub last_pulled_at: Option<i64>,
    /// The changes, sent as the request body.
    pub changes: ChangeSet,
}

impl PushRequest {
    /// Creates a push request.
    pub fn new(changes: ChangeSet, last_pulled_at: Option<i64>) -> Self {
        Self {
            last_pulled_at,
            changes,
        }
    }

    /// Renders the query parameters.
    pub fn to_query(&self) -> Vec<(String, String)> {
        self.last_pulled_at
            .map(|since| vec![("last_pulled_at".to_string(), since.to_string())])
            .unwrap_or_default()
    }

    /// Encodes the body to JSON.
    pub fn encode_body(&self) -> ProtocolResult<Vec<u8>> {
        serde_json::to_vec(&self.changes).map_err(|e| ProtocolError::InvalidMessage(e.to_string()))
    }

    /// Parses `last_pulled_at` from query parameters.
    pub fn last_pulled_at_from_query(pairs: &[(String, String)]) -> ProtocolResult<Option<i64>> {
        parse_millis(pairs, "last_pulled_at")
    }
}

/// Server rows returned for records rejected by last-write-wins.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RejectedRows {
    /// Server copies of rejected pages.
    #[serde(default)]
    pub page: Vec<Page>,
    /// Server copies of rejected folders.
    #[serde(default)]
    pub folder: Vec<Folder>,
    /// Server copies of rejected alarms.
    #[serde(default)]
    pub alarm: Vec<Alarm>,
}

impl RejectedRows {
    /// Number of rejected records.
    pub fn len(&self) -> usize {
        self.page.len() + self.folder.len() + self.alarm.len()
    }

    /// Returns true if nothing was rejected.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Push acknowledgement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PushResponse {
    /// Number of changes written.
    #[serde(default)]
    pub accepted: u64,
    /// Records kept at the server's newer version.
    #[serde(default)]
    pub rejected: RejectedRows,
    /// Pushed ids the server already holds as deleted.
    #[serde(default)]
    pub deleted: DeletedIds,
}

impl PushResponse {
    /// Encodes to JSON.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| ProtocolError::InvalidMessage(e.to_string()))
    }

    /// Decodes from JSON.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        serde_json::from_slice(bytes).map_err(ProtocolError::from_json)
    }
}

/// Error body returned with non-2xx statuses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Human-readable error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Machine-readable code.
    #[serde(rename = "errorCode", default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    /// Collection the error relates to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,
}

impl ErrorBody {
    /// An error with a message.
    pub fn message(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::default()
        }
    }

    /// An error with only a code.
    pub fn code(code: impl Into<String>) -> Self {
        Self {
            error_code: Some(code.into()),
            ..Self::default()
        }
    }

    /// Attaches the offending collection.
    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = Some(collection.into());
        self
    }

    /// Best-effort description for logs and client errors.
    pub fn describe(&self) -> String {
        let base = self
            .error
            .clone()
            .or_else(|| self.error_code.clone())
            .unwrap_or_else(|| "unknown error".into());
        match &self.collection {
            Some(collection) => format!("{collection}: {base}"),
            None => base,
        }
    }
}

fn query_value<'a>(pairs: &'a [(String, String)], name: &str) -> Option<&'a str> {
    pairs
        .iter()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.as_str())
}

fn parse_millis(pairs: &[(String, String)], name: &str) -> ProtocolResult<Option<i64>> {
    query_value(pairs, name)
        .map(|raw| {
            raw.trim()
                .parse::<i64>()
                .map_err(|_| ProtocolError::InvalidMessage(format!("{name} is not a timestamp")))
        })
        .transpose()
}
