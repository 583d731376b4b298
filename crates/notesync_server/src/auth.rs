//! Bearer-token authentication for the sync server.
//!
//! Tokens are signed with HMAC-SHA256 and carry their issue time for
//! expiration checking.
//!
//! ## Token Format
//!
//! `<user_id>.<issued_at_ms>.<signature>` where the signature is the
//! unpadded base64url HMAC-SHA256 of `<user_id>.<issued_at_ms>`.

use crate::error::{ServerError, ServerResult};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

type HmacSha256 = Hmac<Sha256>;

/// Authentication configuration.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Secret key for HMAC.
    pub secret: Vec<u8>,
    /// Token expiration duration.
    pub token_expiry: Duration,
}

impl AuthConfig {
    /// Creates a new auth configuration.
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
            token_expiry: Duration::from_secs(24 * 60 * 60),
        }
    }

    /// Sets the token expiration duration.
    pub fn with_expiry(mut self, expiry: Duration) -> Self {
        self.token_expiry = expiry;
        self
    }
}

/// Issues and checks bearer tokens.
#[derive(Clone)]
pub struct TokenValidator {
    config: AuthConfig,
}

impl TokenValidator {
    /// Creates a new token validator.
    pub fn new(config: AuthConfig) -> Self {
        Self { config }
    }

    /// Creates a token for `user_id`, issued now.
    pub fn create_token(&self, user_id: &str) -> ServerResult<String> {
        self.create_token_at(user_id, now_millis())
    }

    /// Creates a token for `user_id` with an explicit issue time.
    pub fn create_token_at(&self, user_id: &str, issued_at: i64) -> ServerResult<String> {
        if user_id.is_empty() {
            return Err(ServerError::NotAuthorized("empty user id".into()));
        }
        let payload = format!("{user_id}.{issued_at}");
        let signature = URL_SAFE_NO_PAD.encode(self.mac(&payload)?.finalize().into_bytes());
        Ok(format!("{payload}.{signature}"))
    }

    /// Validates a token and returns the user it was issued to.
    pub fn validate(&self, token: &str) -> ServerResult<String> {
        self.validate_at(token, now_millis())
    }

    /// Validates a token against an explicit current time.
    pub fn validate_at(&self, token: &str, now: i64) -> ServerResult<String> {
        let mut parts = token.rsplitn(3, '.');
        let (Some(signature), Some(issued), Some(user_id)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(ServerError::NotAuthorized("malformed token".into()));
        };
        if user_id.is_empty() {
            return Err(ServerError::NotAuthorized("malformed token".into()));
        }

        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| ServerError::NotAuthorized("malformed signature".into()))?;
        self.mac(&format!("{user_id}.{issued}"))?
            .verify_slice(&signature)
            .map_err(|_| ServerError::NotAuthorized("invalid signature".into()))?;

        let issued_at: i64 = issued
            .parse()
            .map_err(|_| ServerError::NotAuthorized("malformed issue time".into()))?;
        let expiry = self.config.token_expiry.as_millis() as i64;
        if now > issued_at.saturating_add(expiry) {
            return Err(ServerError::NotAuthorized("token expired".into()));
        }

        Ok(user_id.to_string())
    }

    fn mac(&self, payload: &str) -> ServerResult<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(&self.config.secret)
            .map_err(|e| ServerError::Internal(e.to_string()))?;
        mac.update(payload.as_bytes());
        Ok(mac)
    }
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
