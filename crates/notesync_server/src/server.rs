//! Main sync server.

use crate::config::ServerConfig;
use crate::error::ServerResult;
use crate::handler::{HandlerContext, RequestHandler};
use crate::store::ServerStore;
use notesync_protocol::{HttpRequest, HttpResponse, PullRequest, PullResponse, PushRequest, PushResponse};
use std::sync::Arc;

/// The sync server.
///
/// Owns the store of record and answers pull and push requests. It is
/// transport-neutral: an HTTP front end decodes requests into
/// [`HttpRequest`] values and writes back the [`HttpResponse`].
///
/// # Example
///
/// ```
/// use notesync_protocol::{HttpRequest, PULL_PATH};
/// use notesync_server::{ServerConfig, SyncServer};
///
/// let server = SyncServer::new(ServerConfig::default());
/// let response = server.handle(&HttpRequest::get(PULL_PATH, Vec::new()).with_bearer("user-1"));
/// assert_eq!(response.status, 200);
/// ```
pub struct SyncServer {
    handler: RequestHandler,
    context: Arc<HandlerContext>,
}

impl SyncServer {
    /// Creates a new sync server with an empty store.
    pub fn new(config: ServerConfig) -> Self {
        Self::with_store(config, Arc::new(ServerStore::new()))
    }

    /// Creates a sync server over an existing store.
    pub fn with_store(config: ServerConfig, store: Arc<ServerStore>) -> Self {
        let context = Arc::new(HandlerContext::new(config, store));
        let handler = RequestHandler::new(Arc::clone(&context));

        Self { handler, context }
    }

    /// Handles an HTTP request, including routing, authentication and
    /// error rendering.
    pub fn handle(&self, request: &HttpRequest) -> HttpResponse {
        self.handler.handle_http(request)
    }

    /// Serves one pull chunk for an already authenticated user.
    pub fn handle_pull(&self, user_id: &str, request: &PullRequest) -> PullResponse {
        self.handler.handle_pull(user_id, request)
    }

    /// Applies a push for an already authenticated user.
    pub fn handle_push(&self, user_id: &str, request: PushRequest) -> ServerResult<PushResponse> {
        self.handler.handle_push(user_id, request)
    }

    /// The server store.
    pub fn store(&self) -> &Arc<ServerStore> {
        &self.context.store
    }

    /// The server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.context.config
    }
}
