//! HTTP transport for the model API
//!
//! SBIO pattern: `Transport` is the I/O seam. The facade and the task poller
//! only ever see `ApiRequest`/`ApiResponse`, so tests swap in
//! [`mock::MockTransport`] and never touch the network.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

// ============================================================================
// Data structures (pure, no I/O)
// ============================================================================

/// HTTP methods used by the model API
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single authenticated request against the API
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: HttpMethod,
    pub url: String,
    pub bearer_token: String,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn new(method: HttpMethod, url: impl Into<String>, bearer_token: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            bearer_token: bearer_token.into(),
            body: None,
        }
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// Status and decoded body of a response.
///
/// Bodies that are not valid JSON are kept as a JSON string holding the raw
/// text; an empty body becomes `null`.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Parse a raw response body the way [`ApiResponse`] documents it
pub fn parse_body(text: &str) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Failed to build HTTP client: {0}")]
    Build(String),
}

// ============================================================================
// SBIO: Trait for abstraction (allows mocking in tests)
// ============================================================================

#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportError>;
}

// ============================================================================
// SBIO: I/O implementation (real HTTP client)
// ============================================================================

#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Build a transport. `verify_ssl = false` accepts any server certificate.
    pub fn new(verify_ssl: bool, timeout: Option<Duration>) -> Result<Self, TransportError> {
        let mut builder = reqwest::Client::builder().danger_accept_invalid_certs(!verify_ssl);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| TransportError::Build(e.to_string()))?;
        Ok(Self { client })
    }

    fn method(method: HttpMethod) -> reqwest::Method {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
        }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
        let mut req = self
            .client
            .request(Self::method(request.method), &request.url)
            .header("Authorization", format!("Bearer {}", request.bearer_token));

        if let Some(ref body) = request.body {
            req = req.json(body);
        }

        let response = req
            .send()
            .await
            .map_err(|e| TransportError::Http(e.to_string()))?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| TransportError::Http(e.to_string()))?;

        Ok(ApiResponse::new(status, parse_body(&text)))
    }
}

// ============================================================================
// SBIO: Mock implementation for testing (no I/O)
// ============================================================================

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;

    /// Scripted transport keyed by `"METHOD url"`.
    ///
    /// Each key holds a queue of responses; the last one repeats once the
    /// queue drains. Unknown keys answer 404.
    #[derive(Default)]
    pub struct MockTransport {
        routes: Mutex<HashMap<String, VecDeque<Result<ApiResponse, String>>>>,
        requests: Mutex<Vec<ApiRequest>>,
    }

    impl MockTransport {
        pub fn new() -> Self {
            Self::default()
        }

        fn key(method: HttpMethod, url: &str) -> String {
            format!("{} {}", method, url)
        }

        pub fn respond(self, method: HttpMethod, url: &str, status: u16, body: Value) -> Self {
            self.push(method, url, Ok(ApiResponse::new(status, body)));
            self
        }

        pub fn fail(self, method: HttpMethod, url: &str, message: &str) -> Self {
            self.push(method, url, Err(message.to_string()));
            self
        }

        fn push(&self, method: HttpMethod, url: &str, reply: Result<ApiResponse, String>) {
            self.routes
                .lock()
                .unwrap()
                .entry(Self::key(method, url))
                .or_default()
                .push_back(reply);
        }

        pub fn requests(&self) -> Vec<ApiRequest> {
            self.requests.lock().unwrap().clone()
        }

        pub fn call_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }

        pub fn calls_to(&self, method: HttpMethod, url: &str) -> usize {
            self.requests
                .lock()
                .unwrap()
                .iter()
                .filter(|r| r.method == method && r.url == url)
                .count()
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
            let key = Self::key(request.method, &request.url);
            self.requests.lock().unwrap().push(request);

            let mut routes = self.routes.lock().unwrap();
            let reply = match routes.get_mut(&key) {
                Some(queue) if queue.len() > 1 => queue.pop_front(),
                Some(queue) => queue.front().cloned(),
                None => None,
            };

            match reply {
                Some(Ok(response)) => Ok(response),
                Some(Err(message)) => Err(TransportError::Http(message)),
                None => Ok(ApiResponse::new(404, Value::Null)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_body_json() {
        assert_eq!(parse_body(r#"{"task_id": "t1"}"#), json!({"task_id": "t1"}));
    }

    #[test]
    fn test_parse_body_empty_and_plain_text() {
        assert_eq!(parse_body("  "), Value::Null);
        assert_eq!(
            parse_body("Internal Server Error"),
            Value::String("Internal Server Error".to_string())
        );
    }

    #[test]
    fn test_response_success_range() {
        assert!(ApiResponse::new(200, Value::Null).is_success());
        assert!(ApiResponse::new(204, Value::Null).is_success());
        assert!(!ApiResponse::new(302, Value::Null).is_success());
        assert!(!ApiResponse::new(404, Value::Null).is_success());
    }

    #[tokio::test]
    async fn test_mock_transport_queue_repeats_last() {
        let transport = mock::MockTransport::new()
            .respond(HttpMethod::Get, "http://api/x", 202, Value::Null)
            .respond(HttpMethod::Get, "http://api/x", 200, json!({"ok": true}));

        let req = ApiRequest::new(HttpMethod::Get, "http://api/x", "token");
        assert_eq!(transport.send(req.clone()).await.unwrap().status, 202);
        assert_eq!(transport.send(req.clone()).await.unwrap().status, 200);
        assert_eq!(transport.send(req).await.unwrap().status, 200);
        assert_eq!(transport.call_count(), 3);
    }

    #[tokio::test]
    async fn test_mock_transport_unknown_route() {
        let transport = mock::MockTransport::new();
        let req = ApiRequest::new(HttpMethod::Delete, "http://api/nothing", "token");
        assert_eq!(transport.send(req).await.unwrap().status, 404);
    }
}
