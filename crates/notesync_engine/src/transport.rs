//! Transport layer abstraction for sync operations.

use crate::error::{SyncError, SyncResult};
use notesync_protocol::{PullRequest, PullResponse, PushRequest, PushResponse};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

/// A sync transport handles network communication with the sync server.
///
/// This trait abstracts the network layer, allowing for different implementations
/// (HTTP, loopback, mock for testing, etc.).
pub trait SyncTransport: Send + Sync {
    /// Pulls one chunk from the server.
    fn pull(&self, request: &PullRequest) -> SyncResult<PullResponse>;

    /// Pushes a change set to the server.
    fn push(&self, request: &PushRequest) -> SyncResult<PushResponse>;

    /// Checks if the transport is connected.
    fn is_connected(&self) -> bool;

    /// Closes the transport connection.
    fn close(&self) -> SyncResult<()>;
}

/// A mock transport for testing.
///
/// Pull responses are served from a queue; once the queue is empty an
/// exhausted chunk is returned. Push always answers with the configured
/// response.
#[derive(Debug, Default)]
pub struct MockTransport {
    connected: AtomicBool,
    pull_responses: Mutex<VecDeque<PullResponse>>,
    push_response: Mutex<PushResponse>,
    failures: AtomicUsize,
    latency: Mutex<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    pulls: Mutex<Vec<PullRequest>>,
    pushes: Mutex<Vec<PushRequest>>,
}

impl MockTransport {
    /// Creates a new mock transport.
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            ..Self::default()
        }
    }

    /// Queues a pull response.
    pub fn queue_pull_response(&self, response: PullResponse) {
        self.pull_responses.lock().push_back(response);
    }

    /// Sets the push response.
    pub fn set_push_response(&self, response: PushResponse) {
        *self.push_response.lock() = response;
    }

    /// Makes the next `count` calls fail with a retryable network error.
    pub fn fail_next(&self, count: usize) {
        self.failures.store(count, Ordering::SeqCst);
    }

    /// Delays every call by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = latency;
    }

    /// Sets the connected state.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Pull requests received so far.
    pub fn pull_requests(&self) -> Vec<PullRequest> {
        self.pulls.lock().clone()
    }

    /// Push requests received so far.
    pub fn push_requests(&self) -> Vec<PushRequest> {
        self.pushes.lock().clone()
    }

    /// Highest number of calls that were ever in progress at once.
    pub fn max_concurrent_calls(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn call<R>(&self, respond: impl FnOnce() -> R) -> SyncResult<R> {
        if !self.is_connected() {
            return Err(SyncError::NotConnected);
        }

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let latency = *self.latency.lock();
        if !latency.is_zero() {
            std::thread::sleep(latency);
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(SyncError::network_retryable("injected failure"));
        }
        Ok(respond())
    }
}

impl SyncTransport for MockTransport {
    fn pull(&self, request: &PullRequest) -> SyncResult<PullResponse> {
        self.call(|| {
            self.pulls.lock().push(request.clone());
            self.pull_responses.lock().pop_front().unwrap_or_default()
        })
    }

    fn push(&self, request: &PushRequest) -> SyncResult<PushResponse> {
        self.call(|| {
            self.pushes.lock().push(request.clone());
            self.push_response.lock().clone()
        })
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn close(&self) -> SyncResult<()> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_transport_connection() {
        let transport = MockTransport::new();
        assert!(transport.is_connected());

        transport.set_connected(false);
        assert!(!transport.is_connected());

        transport.set_connected(true);
        transport.close().unwrap();
        assert!(!transport.is_connected());
    }

    #[test]
    fn mock_transport_not_connected_error() {
        let transport = MockTransport::new();
        transport.set_connected(false);

        let result = transport.pull(&PullRequest::default());
        assert!(matches!(result, Err(SyncError::NotConnected)));
    }

    #[test]
    fn mock_transport_serves_queue_then_exhausts() {
        let transport = MockTransport::new();
        transport.queue_pull_response(PullResponse {
            has_more: true,
            ..PullResponse::default()
        });

        assert!(transport.pull(&PullRequest::default()).unwrap().has_more);
        assert!(!transport.pull(&PullRequest::default()).unwrap().has_more);
        assert_eq!(transport.pull_requests().len(), 2);
    }

    #[test]
    fn mock_transport_injected_failures() {
        let transport = MockTransport::new();
        transport.fail_next(1);

        let err = transport.push(&PushRequest::default()).unwrap_err();
        assert!(err.is_retryable());
        assert!(transport.push(&PushRequest::default()).is_ok());
        assert_eq!(transport.push_requests().len(), 1);
    }
}
