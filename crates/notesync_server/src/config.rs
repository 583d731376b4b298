//! Server configuration.

use std::time::Duration;

/// Configuration for the sync server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Maximum number of page rows in one pull chunk.
    pub max_pull_rows: usize,
    /// Character budget of one pull chunk, summed over title + body.
    pub target_pull_size: usize,
    /// Whether to require a bearer token.
    pub require_auth: bool,
    /// Secret key for token validation (if auth enabled).
    pub auth_secret: Option<Vec<u8>>,
    /// How long a token stays valid after it was issued.
    pub token_expiry: Duration,
}

impl ServerConfig {
    /// Creates a configuration with default limits and no authentication.
    pub fn new() -> Self {
        Self {
            max_pull_rows: 100,
            target_pull_size: 500_000,
            require_auth: false,
            auth_secret: None,
            token_expiry: Duration::from_secs(24 * 60 * 60),
        }
    }

    /// Sets the maximum rows per pull chunk. Zero is treated as one.
    pub fn with_max_pull_rows(mut self, rows: usize) -> Self {
        self.max_pull_rows = rows.max(1);
        self
    }

    /// Sets the character budget per pull chunk.
    pub fn with_target_pull_size(mut self, size: usize) -> Self {
        self.target_pull_size = size;
        self
    }

    /// Enables authentication with the given secret.
    pub fn with_auth(mut self, secret: impl Into<Vec<u8>>) -> Self {
        self.require_auth = true;
        self.auth_secret = Some(secret.into());
        self
    }

    /// Sets the token lifetime.
    pub fn with_token_expiry(mut self, expiry: Duration) -> Self {
        self.token_expiry = expiry;
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new()
    }
}
