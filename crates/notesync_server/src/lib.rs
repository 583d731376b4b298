//! # notesync server
//!
//! Reference sync server for notesync clients.
//!
//! This crate provides:
//! - Pull and push endpoint logic behind transport-neutral HTTP values
//! - A store of record with per-collection tombstones
//! - Last-write-wins reconciliation of push batches
//! - Cursor-ordered, size-bounded pull chunks
//! - Authentication (HMAC-SHA256 bearer tokens)
//!
//! # Authentication
//!
//! Authentication is optional but recommended for production:
//!
//! ```rust,ignore
//! use notesync_server::{AuthConfig, ServerConfig, TokenValidator};
//!
//! let secret = b"my-secure-secret-32-bytes-long!".to_vec();
//! let config = ServerConfig::default().with_auth(secret.clone());
//!
//! // Issue a token for a user
//! let validator = TokenValidator::new(AuthConfig::new(secret));
//! let token = validator.create_token("user-1")?;
//! ```
//!
//! # Protocol
//!
//! Clients push first, then pull:
//! 1. `POST /sync/push` applies every pending change in one transaction
//! 2. `GET /sync/pull` returns pages in `(created_at, id)` order, chunk by chunk
//! 3. The first chunk also carries folders, alarms and tombstones

#![deny(unsafe_code)]
#![warn(missing_docs)]
// Production code MUST NOT use panic!/unwrap()/expect()
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod auth;
mod config;
mod error;
mod handler;
mod pull;
mod reconciler;
mod server;
mod store;

pub use auth::{AuthConfig, TokenValidator};
pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use handler::{decode_push_body, HandlerContext, RequestHandler};
pub use pull::pull_chunk;
pub use reconciler::apply_push;
pub use server::SyncServer;
pub use store::{ServerData, ServerRecord, ServerStore, ServerTable};
