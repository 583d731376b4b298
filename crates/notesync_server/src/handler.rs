//! Request handlers for the pull and push endpoints.

use crate::auth::{AuthConfig, TokenValidator};
use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::pull::pull_chunk;
use crate::reconciler::apply_push;
use crate::store::ServerStore;
use notesync_protocol::{
    validate_push_body, ChangeSet, HttpRequest, HttpResponse, Method, PullRequest, PullResponse,
    PushRequest, PushResponse, PULL_PATH, PUSH_PATH,
};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Shared state for request handling.
pub struct HandlerContext {
    /// Server configuration.
    pub config: ServerConfig,
    /// Server store (shared across all handlers).
    pub store: Arc<ServerStore>,
    validator: Option<TokenValidator>,
}

impl HandlerContext {
    /// Creates a new handler context.
    pub fn new(config: ServerConfig, store: Arc<ServerStore>) -> Self {
        let validator = match (&config.auth_secret, config.require_auth) {
            (Some(secret), true) => Some(TokenValidator::new(
                AuthConfig::new(secret.clone()).with_expiry(config.token_expiry),
            )),
            _ => None,
        };
        Self {
            config,
            store,
            validator,
        }
    }

    /// Resolves the user behind a bearer token.
    ///
    /// With authentication enabled the token must be a valid signed token.
    /// Without it, the bearer value itself names the user.
    pub fn authenticate(&self, bearer: Option<&str>) -> ServerResult<String> {
        let token = bearer.ok_or_else(|| ServerError::NotAuthorized("missing bearer token".into()))?;
        match &self.validator {
            Some(validator) => validator.validate(token),
            None if self.config.require_auth => {
                Err(ServerError::NotAuthorized("no auth secret configured".into()))
            }
            None => Ok(token.to_string()),
        }
    }
}

/// Handler for sync requests.
pub struct RequestHandler {
    context: Arc<HandlerContext>,
}

impl RequestHandler {
    /// Creates a new request handler.
    pub fn new(context: Arc<HandlerContext>) -> Self {
        Self { context }
    }

    /// Routes an HTTP request and renders the result, errors included.
    pub fn handle_http(&self, request: &HttpRequest) -> HttpResponse {
        match self.route(request) {
            Ok(response) => response,
            Err(e) => {
                if e.is_server_error() {
                    warn!(path = %request.path, error = %e, "request failed");
                } else {
                    debug!(path = %request.path, status = e.status(), error = %e, "request refused");
                }
                e.to_response()
            }
        }
    }

    fn route(&self, request: &HttpRequest) -> ServerResult<HttpResponse> {
        let allowed = match request.path.as_str() {
            PULL_PATH => Method::Get,
            PUSH_PATH => Method::Post,
            other => return Err(ServerError::NotFound(other.to_string())),
        };
        if request.method != allowed {
            return Err(ServerError::MethodNotAllowed(format!(
                "{} {}",
                request.method.as_str(),
                request.path
            )));
        }

        let user_id = self.context.authenticate(request.bearer.as_deref())?;
        let body = match allowed {
            Method::Get => {
                let pull = PullRequest::from_query(&request.query)?;
                self.handle_pull(&user_id, &pull).encode()?
            }
            Method::Post => {
                let last_pulled_at = PushRequest::last_pulled_at_from_query(&request.query)?;
                let changes = decode_push_body(&request.body)?;
                self.handle_push(&user_id, PushRequest::new(changes, last_pulled_at))?
                    .encode()?
            }
        };
        Ok(HttpResponse::new(200, body))
    }

    /// Serves one pull chunk for `user_id`.
    pub fn handle_pull(&self, user_id: &str, request: &PullRequest) -> PullResponse {
        let now = self.context.store.now_millis();
        let response = self
            .context
            .store
            .read(|data| pull_chunk(data, user_id, request, &self.context.config, now));
        debug!(
            user = user_id,
            pages = response.pages.len(),
            has_more = response.has_more,
            first = request.is_first_chunk(),
            "served pull chunk"
        );
        response
    }

    /// Applies a push batch for `user_id` atomically.
    pub fn handle_push(&self, user_id: &str, request: PushRequest) -> ServerResult<PushResponse> {
        let now = self.context.store.now_millis();
        let sent = request.changes.len();
        let response = self
            .context
            .store
            .transaction(|data| apply_push(data, user_id, request.changes, now))?;
        info!(
            user = user_id,
            sent,
            accepted = response.accepted,
            rejected = response.rejected.len(),
            "push committed"
        );
        Ok(response)
    }
}

/// Parses and validates a push body.
///
/// Malformed JSON and contract violations are distinct errors; nothing is
/// decoded into typed records until the whole body passed validation.
pub fn decode_push_body(body: &[u8]) -> ServerResult<ChangeSet> {
    let value: Value =
        serde_json::from_slice(body).map_err(|e| ServerError::InvalidJson(e.to_string()))?;
    validate_push_body(&value)?;
    serde_json::from_value(value).map_err(|e| ServerError::InvalidBody {
        collection: None,
        reason: e.to_string(),
    })
}
