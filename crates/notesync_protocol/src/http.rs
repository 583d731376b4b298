//! Transport-neutral HTTP values.
//!
//! The server routes these and the client's HTTP transport produces them, so
//! both sides agree on paths, query encoding and status handling without
//! depending on a particular HTTP library.

use url::form_urlencoded;

/// Pull endpoint path.
pub const PULL_PATH: &str = "/sync/pull";

/// Push endpoint path.
pub const PUSH_PATH: &str = "/sync/push";

/// HTTP method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// GET.
    Get,
    /// POST.
    Post,
}

impl Method {
    /// Returns the method name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
        }
    }
}

/// An HTTP request.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    /// Method.
    pub method: Method,
    /// Path without query string.
    pub path: String,
    /// Decoded query parameters.
    pub query: Vec<(String, String)>,
    /// Bearer token from the `Authorization` header.
    pub bearer: Option<String>,
    /// Body bytes.
    pub body: Vec<u8>,
}

impl HttpRequest {
    /// Creates a GET request.
    pub fn get(path: impl Into<String>, query: Vec<(String, String)>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            query,
            bearer: None,
            body: Vec::new(),
        }
    }

    /// Creates a POST request.
    pub fn post(path: impl Into<String>, query: Vec<(String, String)>, body: Vec<u8>) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            query,
            bearer: None,
            body,
        }
    }

    /// Attaches a bearer token.
    pub fn with_bearer(mut self, token: impl Into<String>) -> Self {
        self.bearer = Some(token.into());
        self
    }

    /// Parses an `Authorization` header value into the bearer token.
    pub fn with_authorization_header(mut self, header: Option<&str>) -> Self {
        self.bearer = header
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(|token| token.trim().to_string())
            .filter(|token| !token.is_empty());
        self
    }

    /// Path plus encoded query string.
    pub fn path_and_query(&self) -> String {
        if self.query.is_empty() {
            self.path.clone()
        } else {
            format!("{}?{}", self.path, encode_query(&self.query))
        }
    }
}

/// An HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// JSON body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Creates a response.
    pub fn new(status: u16, body: Vec<u8>) -> Self {
        Self { status, body }
    }

    /// Returns true for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Encodes query parameters as `application/x-www-form-urlencoded`.
pub fn encode_query(pairs: &[(String, String)]) -> String {
    form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .finish()
}

/// Decodes a raw query string.
pub fn parse_query(raw: &str) -> Vec<(String, String)> {
    form_urlencoded::parse(raw.trim_start_matches('?').as_bytes())
        .into_owned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_round_trips_awkward_ids() {
        let pairs = vec![
            ("created_at".to_string(), "10".to_string()),
            ("last_id".to_string(), "a b&c=d".to_string()),
        ];
        let encoded = encode_query(&pairs);
        assert!(!encoded.contains(' '));
        assert_eq!(parse_query(&encoded), pairs);
        assert_eq!(parse_query(&format!("?{encoded}")), pairs);
    }

    #[test]
    fn authorization_header_parsing() {
        let request = HttpRequest::get(PULL_PATH, Vec::new());
        assert_eq!(
            request
                .clone()
                .with_authorization_header(Some("Bearer abc"))
                .bearer
                .as_deref(),
            Some("abc")
        );
        assert!(request
            .clone()
            .with_authorization_header(Some("Basic abc"))
            .bearer
            .is_none());
        assert!(request.with_authorization_header(Some("Bearer ")).bearer.is_none());
    }

    #[test]
    fn path_and_query() {
        let request = HttpRequest::get(PULL_PATH, vec![("last_id".into(), "p1".into())]);
        assert_eq!(request.path_and_query(), "/sync/pull?last_id=p1");
        assert_eq!(HttpRequest::post(PUSH_PATH, vec![], vec![]).path_and_query(), "/sync/push");
    }
}
