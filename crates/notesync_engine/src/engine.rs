//! Sync engine: one push-then-pull cycle.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::pull::{PullClient, PullOutcome};
use crate::push::{PushClient, PushOutcome};
use crate::transport::SyncTransport;
use notesync_store::LocalStore;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// The current state of the sync engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Engine is idle, not syncing.
    Idle,
    /// Engine is pushing local changes to the server.
    Pushing,
    /// Engine is pulling changes from the server.
    Pulling,
    /// Engine is waiting before retrying.
    RetryWait,
    /// The last cycle failed.
    Error,
}

/// Statistics about sync operations.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Total number of sync cycles completed.
    pub cycles_completed: u64,
    /// Total number of changes pushed.
    pub records_pushed: u64,
    /// Total number of rows pulled.
    pub records_pulled: u64,
    /// Total number of pushed records the server kept its own version of.
    pub records_rejected: u64,
    /// Total number of retries.
    pub retries: u64,
    /// Last sync time.
    pub last_sync_time: Option<Instant>,
    /// Last error message.
    pub last_error: Option<String>,
}

/// Result of a sync cycle.
#[derive(Debug, Clone)]
pub struct SyncCycleResult {
    /// Push phase.
    pub push: PushOutcome,
    /// Pull phase.
    pub pull: PullOutcome,
    /// Duration of the sync cycle.
    pub duration: Duration,
}

/// The sync engine runs push/pull cycles against a remote server.
///
/// The engine itself does not serialize cycles; callers go through
/// [`crate::SyncOrchestrator`] for that.
pub struct SyncEngine<T: SyncTransport> {
    config: SyncConfig,
    transport: Arc<T>,
    store: Arc<LocalStore>,
    state: RwLock<SyncState>,
    stats: RwLock<SyncStats>,
}

impl<T: SyncTransport> SyncEngine<T> {
    /// Creates a new sync engine.
    pub fn new(config: SyncConfig, transport: T, store: Arc<LocalStore>) -> Self {
        Self::with_shared_transport(config, Arc::new(transport), store)
    }

    /// Creates a sync engine over a transport shared with other code.
    pub fn with_shared_transport(config: SyncConfig, transport: Arc<T>, store: Arc<LocalStore>) -> Self {
        Self {
            config,
            transport,
            store,
            state: RwLock::new(SyncState::Idle),
            stats: RwLock::new(SyncStats::default()),
        }
    }

    /// Gets the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Gets the local store.
    pub fn store(&self) -> &Arc<LocalStore> {
        &self.store
    }

    /// Gets the transport.
    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    /// Gets the current state.
    pub fn state(&self) -> SyncState {
        *self.state.read()
    }

    /// Gets the current stats.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    pub(crate) fn set_state(&self, state: SyncState) {
        *self.state.write() = state;
    }

    pub(crate) fn record_retry(&self) {
        self.stats.write().retries += 1;
        self.set_state(SyncState::RetryWait);
    }

    /// Performs a full sync cycle: push, then pull.
    ///
    /// A failed push skips the pull and leaves every pending change in
    /// place for the next cycle.
    pub fn run_cycle(&self) -> SyncResult<SyncCycleResult> {
        let start = Instant::now();

        self.set_state(SyncState::Pushing);
        let pusher = PushClient::new(&self.store, self.transport.as_ref(), &self.config.bookkeeping_retry);
        let push = pusher
            .push(self.store.last_pulled_at())
            .map_err(|e| self.handle_error(e))?;

        self.set_state(SyncState::Pulling);
        let pull = PullClient::new(&self.store, self.transport.as_ref())
            .pull_all()
            .map_err(|e| self.handle_error(e))?;

        let result = SyncCycleResult {
            push,
            pull,
            duration: start.elapsed(),
        };
        self.set_state(SyncState::Idle);

        {
            let mut stats = self.stats.write();
            stats.cycles_completed += 1;
            stats.records_pushed += result.push.sent as u64;
            stats.records_pulled += result.pull.received as u64;
            stats.records_rejected += result.push.rejected as u64;
            stats.last_sync_time = Some(Instant::now());
            stats.last_error = None;
        }

        info!(
            pushed = result.push.sent,
            pulled = result.pull.received,
            elapsed_ms = result.duration.as_millis() as u64,
            "sync cycle complete"
        );
        Ok(result)
    }

    /// Handles an error by updating state and stats.
    fn handle_error(&self, error: SyncError) -> SyncError {
        warn!(error = %error, retryable = error.is_retryable(), "sync cycle failed");
        self.set_state(SyncState::Error);
        self.stats.write().last_error = Some(error.to_string());
        error
    }
}
