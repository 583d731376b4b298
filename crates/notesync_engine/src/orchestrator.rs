//! Sync orchestrator: debounced triggers, one cycle at a time, retries.

use crate::engine::{SyncCycleResult, SyncEngine, SyncState, SyncStats};
use crate::error::{SyncError, SyncResult};
use crate::transport::SyncTransport;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Coordinates sync cycles for one client.
///
/// Cheap to clone; clones share the same engine, run-flag and timer. The
/// orchestrator must be used from within a Tokio runtime.
///
/// - [`trigger`](Self::trigger) requests a cycle. Calls within the debounce
///   window collapse into one cycle run after the window closes.
/// - [`sync_now`](Self::sync_now) runs a cycle immediately, or fails with
///   [`SyncError::Busy`] if one is already running.
///
/// Transient network errors are retried with a fixed delay; validation and
/// server errors are returned as-is.
pub struct SyncOrchestrator<T: SyncTransport + 'static> {
    inner: Arc<Inner<T>>,
}

struct Inner<T: SyncTransport + 'static> {
    engine: Arc<SyncEngine<T>>,
    running: AtomicBool,
    rerun: AtomicBool,
    shut_down: AtomicBool,
    generation: AtomicU64,
}

impl<T: SyncTransport + 'static> Clone for SyncOrchestrator<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Clears the run-flag when a cycle ends, however it ends.
struct RunGuard<T: SyncTransport + 'static> {
    inner: Arc<Inner<T>>,
}

impl<T: SyncTransport + 'static> RunGuard<T> {
    fn acquire(inner: &Arc<Inner<T>>) -> Option<Self> {
        inner
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self {
                inner: Arc::clone(inner),
            })
    }
}

impl<T: SyncTransport + 'static> Drop for RunGuard<T> {
    fn drop(&mut self) {
        self.inner.running.store(false, Ordering::Release);
    }
}

impl<T: SyncTransport + 'static> SyncOrchestrator<T> {
    /// Creates an orchestrator around an engine.
    pub fn new(engine: SyncEngine<T>) -> Self {
        Self {
            inner: Arc::new(Inner {
                engine: Arc::new(engine),
                running: AtomicBool::new(false),
                rerun: AtomicBool::new(false),
                shut_down: AtomicBool::new(false),
                generation: AtomicU64::new(0),
            }),
        }
    }

    /// The engine driven by this orchestrator.
    pub fn engine(&self) -> &Arc<SyncEngine<T>> {
        &self.inner.engine
    }

    /// Current engine state.
    pub fn state(&self) -> SyncState {
        self.inner.engine.state()
    }

    /// Engine statistics.
    pub fn stats(&self) -> SyncStats {
        self.inner.engine.stats()
    }

    /// Returns true while a cycle is running.
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    /// Requests a sync cycle after the debounce window.
    ///
    /// Restarts the window if one is already open. If a cycle is running
    /// when the window closes, one more cycle runs after it.
    pub fn trigger(&self) {
        Inner::trigger(&self.inner);
    }

    /// Runs a sync cycle now.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Busy`] if a cycle is already running, or the
    /// cycle's error after retries are exhausted.
    pub async fn sync_now(&self) -> SyncResult<SyncCycleResult> {
        Inner::run(&self.inner).await
    }

    /// Cancels any scheduled cycle and refuses new ones.
    ///
    /// A cycle already running is allowed to finish.
    pub fn shutdown(&self) {
        self.inner.shut_down.store(true, Ordering::SeqCst);
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        info!("sync orchestrator shut down");
    }
}

impl<T: SyncTransport + 'static> Inner<T> {
    fn trigger(this: &Arc<Self>) {
        if this.shut_down.load(Ordering::SeqCst) {
            return;
        }

        // a newer trigger supersedes this one; stale timers wake and exit
        let generation = this.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let debounce = this.engine.config().debounce;
        let task = Arc::clone(this);
        tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            if task.generation.load(Ordering::SeqCst) != generation {
                return;
            }
            match Inner::run(&task).await {
                Ok(_) => {}
                Err(SyncError::Busy) => {
                    debug!("cycle already running, queueing another");
                    task.rerun.store(true, Ordering::SeqCst);
                    if !task.running.load(Ordering::Acquire) && task.rerun.swap(false, Ordering::SeqCst) {
                        Inner::trigger(&task);
                    }
                }
                Err(e) => warn!(error = %e, "triggered sync failed"),
            }
        });
    }

    async fn run(this: &Arc<Self>) -> SyncResult<SyncCycleResult> {
        if this.shut_down.load(Ordering::SeqCst) {
            return Err(SyncError::ShutDown);
        }

        let guard = RunGuard::acquire(this).ok_or(SyncError::Busy)?;

        // the cycle task owns the run-flag; a dropped caller does not release it
        let cycle = tokio::spawn(async move {
            let inner = Arc::clone(&guard.inner);
            let result = Inner::run_with_retry(&inner).await;
            drop(guard);

            if inner.rerun.swap(false, Ordering::SeqCst) {
                Inner::trigger(&inner);
            }
            result
        });
        cycle.await.map_err(|_| SyncError::Cancelled)?
    }

    async fn run_with_retry(this: &Arc<Self>) -> SyncResult<SyncCycleResult> {
        let retry = this.engine.config().retry.clone();
        let mut attempt = 0;

        loop {
            let engine = Arc::clone(&this.engine);
            let result = tokio::task::spawn_blocking(move || engine.run_cycle())
                .await
                .map_err(|_| SyncError::Cancelled)?;

            match result {
                Ok(result) => return Ok(result),
                Err(e) if e.is_retryable() && attempt + 1 < retry.max_attempts => {
                    attempt += 1;
                    this.engine.record_retry();
                    warn!(attempt, error = %e, "retrying sync cycle");
                    tokio::time::sleep(retry.delay_for_attempt(attempt)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RetryConfig, SyncConfig};
    use crate::transport::MockTransport;
    use notesync_protocol::Page;
    use notesync_store::LocalStore;
    use std::time::Duration;

    fn orchestrator(debounce_ms: u64) -> SyncOrchestrator<MockTransport> {
        let config = SyncConfig::new("memory://")
            .with_debounce(Duration::from_millis(debounce_ms))
            .with_retry(RetryConfig::new(3).with_delay(Duration::from_millis(5)));
        let store = Arc::new(LocalStore::open_in_memory("u1"));
        SyncOrchestrator::new(SyncEngine::new(config, MockTransport::new(), store))
    }

    #[tokio::test]
    async fn sync_now_runs_a_cycle() {
        let sync = orchestrator(10);
        sync.engine().store().create_page(Page::new("p1")).unwrap();

        let result = sync.sync_now().await.unwrap();
        assert_eq!(result.push.sent, 1);
        assert_eq!(sync.state(), SyncState::Idle);
        assert!(!sync.is_running());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_sync_now_is_exclusive() {
        let sync = orchestrator(10);
        sync.engine()
            .transport()
            .set_latency(Duration::from_millis(50));

        let calls: Vec<_> = (0..8)
            .map(|_| {
                let sync = sync.clone();
                tokio::spawn(async move { sync.sync_now().await })
            })
            .collect();

        let mut ok = 0;
        let mut busy = 0;
        for call in calls {
            match call.await.unwrap() {
                Ok(_) => ok += 1,
                Err(SyncError::Busy) => busy += 1,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert!(ok >= 1);
        assert_eq!(ok + busy, 8);
        assert_eq!(sync.engine().transport().max_concurrent_calls(), 1);
        assert_eq!(sync.stats().cycles_completed, ok as u64);
    }

    #[tokio::test]
    async fn triggers_in_window_collapse() {
        let sync = orchestrator(100);
        for _ in 0..5 {
            sync.trigger();
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(sync.stats().cycles_completed, 0);

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(sync.stats().cycles_completed, 1);
        assert_eq!(sync.engine().transport().pull_requests().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn trigger_during_cycle_queues_one_more() {
        let sync = orchestrator(10);
        sync.engine()
            .transport()
            .set_latency(Duration::from_millis(150));

        let first = {
            let sync = sync.clone();
            tokio::spawn(async move { sync.sync_now().await })
        };
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(sync.is_running());

        for _ in 0..3 {
            sync.trigger();
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        first.await.unwrap().unwrap();

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(sync.stats().cycles_completed, 2);
        assert_eq!(sync.engine().transport().pull_requests().len(), 2);
        assert!(!sync.is_running());
    }

    #[tokio::test]
    async fn abandoned_sync_now_keeps_the_run_flag() {
        let sync = orchestrator(10);
        sync.engine()
            .transport()
            .set_latency(Duration::from_millis(200));

        let abandoned = tokio::time::timeout(Duration::from_millis(50), sync.sync_now()).await;
        assert!(abandoned.is_err());
        assert!(sync.is_running());
        assert!(matches!(sync.sync_now().await, Err(SyncError::Busy)));

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(!sync.is_running());
        assert_eq!(sync.stats().cycles_completed, 1);
        assert_eq!(sync.engine().transport().max_concurrent_calls(), 1);
    }

    #[tokio::test]
    async fn network_errors_are_retried() {
        let sync = orchestrator(10);
        sync.engine().store().create_page(Page::new("p1")).unwrap();
        sync.engine().transport().fail_next(2);

        let result = sync.sync_now().await.unwrap();
        assert_eq!(result.push.sent, 1);
        assert_eq!(sync.stats().retries, 2);
    }

    #[tokio::test]
    async fn retries_are_bounded() {
        let sync = orchestrator(10);
        sync.engine().store().create_page(Page::new("p1")).unwrap();
        sync.engine().transport().fail_next(10);

        let err = sync.sync_now().await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(sync.stats().retries, 2);
        assert_eq!(sync.state(), SyncState::Error);
        assert!(!sync.is_running());
    }

    #[tokio::test]
    async fn shutdown_cancels_pending_trigger() {
        let sync = orchestrator(50);
        sync.trigger();
        sync.shutdown();
        tokio::time::sleep(Duration::from_millis(150)).await;

        assert_eq!(sync.stats().cycles_completed, 0);
        assert!(matches!(sync.sync_now().await, Err(SyncError::ShutDown)));
    }
}
