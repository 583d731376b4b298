//! # notesync engine
//!
//! Client-side synchronization for the notesync local store.
//!
//! This crate provides:
//! - Change collection from the local store
//! - Push client with acknowledgement bookkeeping
//! - Chunked pull client with cursor following
//! - Sync engine and debounced orchestrator
//! - HTTP transport abstraction
//!
//! ## Architecture
//!
//! Each sync cycle is **push-then-pull**:
//! 1. Collect every pending local change and push it as one batch
//! 2. Mark acknowledged records `synced` and write back rejected rows
//! 3. Pull server changes in `(created_at, id)` cursor order
//! 4. Record the server time of the first chunk as `last_pulled_at`
//!
//! ## Key Invariants
//!
//! - At most one cycle runs at a time per client
//! - A failed push leaves every pending change in place
//! - Chunks already applied survive a failed pull
//! - A local edit made while a push is in flight stays pending

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod collector;
mod config;
mod engine;
mod error;
mod http;
mod orchestrator;
mod pull;
mod push;
mod retry;
mod transport;

pub use collector::{collect_changes, collect_from};
pub use config::{RetryConfig, SyncConfig};
pub use engine::{SyncCycleResult, SyncEngine, SyncState, SyncStats};
pub use error::{SyncError, SyncResult};
pub use http::{status_error, HttpClient, HttpTransport, LoopbackClient, LoopbackServer};
pub use orchestrator::SyncOrchestrator;
pub use pull::{PullClient, PullOutcome};
pub use push::{PushClient, PushOutcome};
pub use retry::retry_and_continue;
pub use transport::{MockTransport, SyncTransport};
