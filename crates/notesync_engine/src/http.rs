//! HTTP transport implementation.
//!
//! This module provides an HTTP-based transport for the sync engine.
//! The actual HTTP client is abstracted via a trait to allow different
//! implementations (reqwest, hyper, etc.).

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::transport::SyncTransport;
use notesync_protocol::{
    Collection, ErrorBody, HttpRequest, HttpResponse, PullRequest, PullResponse, PushRequest,
    PushResponse, PULL_PATH, PUSH_PATH,
};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

/// HTTP client abstraction.
///
/// Implement this trait to provide the actual HTTP transport.
pub trait HttpClient: Send + Sync {
    /// Sends a request to `url` and returns the response, giving up after
    /// `timeout`.
    ///
    /// `Err` means no response was received at all (connection refused,
    /// timeout, reset). Any status code, including 5xx, is an `Ok`.
    fn send(
        &self,
        url: &str,
        request: &HttpRequest,
        timeout: Duration,
    ) -> Result<HttpResponse, String>;

    /// Checks if the client is connected/healthy.
    fn is_healthy(&self) -> bool;
}

/// HTTP-based sync transport.
///
/// Uses JSON request/response bodies.
pub struct HttpTransport<C: HttpClient> {
    /// Base URL of the sync server (e.g., "https://sync.example.com").
    base_url: String,
    /// Bearer token.
    token: Option<String>,
    /// Per-request timeout handed to the client.
    timeout: Duration,
    /// HTTP client implementation.
    client: C,
    /// Connection state.
    connected: AtomicBool,
    /// Last error message.
    last_error: RwLock<Option<String>>,
}

impl<C: HttpClient> HttpTransport<C> {
    /// Creates a new HTTP transport.
    pub fn new(base_url: impl Into<String>, client: C) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
            timeout: Duration::from_secs(30),
            client,
            connected: AtomicBool::new(true),
            last_error: RwLock::new(None),
        }
    }

    /// Creates a transport for the server, token and timeout in `config`.
    pub fn from_config(config: &SyncConfig, client: C) -> Self {
        let transport = Self::new(config.server_url.clone(), client).with_timeout(config.timeout);
        match &config.token {
            Some(token) => transport.with_token(token.clone()),
            None => transport,
        }
    }

    /// Sets the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the bearer token sent with every request.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the last error message.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    fn set_error(&self, err: &str) {
        *self.last_error.write() = Some(err.to_string());
    }

    fn clear_error(&self) {
        *self.last_error.write() = None;
    }

    fn send(&self, request: HttpRequest) -> SyncResult<Vec<u8>> {
        if !self.is_connected() {
            return Err(SyncError::NotConnected);
        }

        let request = match &self.token {
            Some(token) => request.with_bearer(token.clone()),
            None => request,
        };
        let url = format!("{}{}", self.base_url, request.path_and_query());
        debug!(method = request.method.as_str(), %url, "sending sync request");

        let response = self.client.send(&url, &request, self.timeout).map_err(|e| {
            self.set_error(&e);
            SyncError::network_retryable(e)
        })?;

        if response.is_success() {
            self.clear_error();
            return Ok(response.body);
        }

        let err = status_error(&response);
        self.set_error(&err.to_string());
        warn!(status = response.status, error = %err, "sync request failed");
        Err(err)
    }
}

/// Maps a non-2xx response to the client error taxonomy.
pub fn status_error(response: &HttpResponse) -> SyncError {
    let body: ErrorBody = serde_json::from_slice(&response.body).unwrap_or_default();
    let message = body.describe();
    match response.status {
        400 => SyncError::Validation {
            collection: body.collection.as_deref().and_then(Collection::from_name),
            reason: message,
        },
        408 | 429 | 502 | 503 | 504 => SyncError::Network {
            message: format!("HTTP {}: {}", response.status, message),
            retryable: true,
        },
        status => SyncError::Server { status, message },
    }
}

impl<C: HttpClient> SyncTransport for HttpTransport<C> {
    fn pull(&self, request: &PullRequest) -> SyncResult<PullResponse> {
        let body = self.send(HttpRequest::get(PULL_PATH, request.to_query()))?;
        Ok(PullResponse::decode(&body)?)
    }

    fn push(&self, request: &PushRequest) -> SyncResult<PushResponse> {
        let body = request.encode_body()?;
        let body = self.send(HttpRequest::post(PUSH_PATH, request.to_query(), body))?;
        Ok(PushResponse::decode(&body)?)
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst) && self.client.is_healthy()
    }

    fn close(&self) -> SyncResult<()> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// A loopback HTTP client that routes requests directly to a sync server.
///
/// Useful for testing without actual network overhead.
pub struct LoopbackClient<S: LoopbackServer> {
    server: S,
}

impl<S: LoopbackServer> LoopbackClient<S> {
    /// Creates a new loopback client connected to the given server.
    pub fn new(server: S) -> Self {
        Self { server }
    }
}

/// Trait for servers that can handle loopback requests.
pub trait LoopbackServer: Send + Sync {
    /// Handles a request and returns the response.
    fn handle(&self, request: &HttpRequest) -> HttpResponse;
}

impl<F> LoopbackServer for F
where
    F: Fn(&HttpRequest) -> HttpResponse + Send + Sync,
{
    fn handle(&self, request: &HttpRequest) -> HttpResponse {
        self(request)
    }
}

impl<S: LoopbackServer> HttpClient for LoopbackClient<S> {
    fn send(
        &self,
        _url: &str,
        request: &HttpRequest,
        _timeout: Duration,
    ) -> Result<HttpResponse, String> {
        Ok(self.server.handle(request))
    }

    fn is_healthy(&self) -> bool {
        true
    }
}
