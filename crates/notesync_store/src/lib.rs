//! # notesync store
//!
//! Embedded, transactional record store used by each client while offline.
//!
//! This crate provides:
//! - Three typed tables (pages, folders, alarms)
//! - Closure-scoped transactions: all-or-nothing
//! - Lifecycle status and per-field change tracking on every write
//! - Soft delete until the deletion is acknowledged by the server
//! - Application-level referential integrity (folder → pages, page → alarms)
//! - Optional JSON snapshot persistence
//!
//! ## Key Invariants
//!
//! - A live page's `folder_id` names a live folder or is `None`
//! - A live alarm's `page_id` names a live page
//! - `Folder::page_count` equals the number of live pages in the folder
//!   after every committed transaction

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod clock;
mod error;
mod ops;
mod store;
mod sync;
mod table;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{StoreError, StoreResult};
pub use store::{LocalStore, StatusCounts, StoreCounts, Transaction};
pub use sync::MergeStats;
pub use table::{LocalRecord, Query, SortOrder, StoreData, Table, TableRecord};

/// Generates a new globally unique record id.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
