//! # notesync protocol
//!
//! Record model and wire messages for notesync synchronization.
//!
//! This crate provides:
//! - The three synchronized record kinds (`Page`, `Folder`, `Alarm`) and
//!   their deletion `Tombstone`s
//! - Per-collection change batches for push
//! - The `(created_at, id)` pull cursor
//! - Pull/push request and response messages (JSON)
//! - The minimal record validator shared by client and server
//! - The last-write-wins decision used during reconciliation
//! - Transport-neutral HTTP request/response values
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod batch;
mod conflict;
mod cursor;
mod error;
mod http;
mod messages;
mod record;
mod validation;

pub use batch::{ChangeBatch, ChangeSet};
pub use conflict::{resolve_write, RecordOutcome};
pub use cursor::PullCursor;
pub use error::{ProtocolError, ProtocolResult};
pub use http::{
    encode_query, parse_query, HttpRequest, HttpResponse, Method, PULL_PATH, PUSH_PATH,
};
pub use messages::{
    DeletedIds, ErrorBody, PullRequest, PullResponse, PushRequest, PushResponse, RejectedRows,
};
pub use record::{Alarm, Collection, Folder, Page, PageKind, RecordStatus, SyncRecord, Tombstone};
pub use validation::{validate_push_body, validate_record, ValidationFailure};
