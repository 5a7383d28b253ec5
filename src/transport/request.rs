//! Outbound HTTP with timeout, retry and exponential backoff.

use crate::config::RetryConfig;
use crate::core::{truncate_chars, Error, Result};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

/// Error bodies are cut to this many characters.
pub const MAX_ERROR_BODY_CHARS: usize = 500;

/// Retry and timeout knobs for one backend.
#[derive(Clone, Debug, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Multiplier applied per attempt
    pub backoff_factor: f64,
    /// Delay before the first retry
    pub backoff_unit: Duration,
    /// Per-request timeout
    pub request_timeout: Duration,
}

impl RetryPolicy {
    /// Sleep before retrying after `attempt` failed: `unit × factor^(attempt−1)`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        self.backoff_unit.mul_f64(self.backoff_factor.powi(exponent))
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            backoff_factor: config.backoff_factor,
            backoff_unit: Duration::from_millis(config.backoff_unit_ms),
            request_timeout: Duration::from_millis(config.request_timeout_ms),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

/// How requests authenticate.
#[derive(Clone, Debug, Default)]
pub enum Auth {
    #[default]
    None,
    /// `Authorization: Bearer <token>`
    Bearer(String),
    /// Arbitrary header, e.g. `Api-Key` or `Authorization: Token ...`
    Header { name: String, value: String },
}

/// Query string and optional JSON body.
#[derive(Clone, Debug, Default)]
pub struct RequestPayload {
    pub query: Vec<(String, String)>,
    pub json: Option<Value>,
}

impl RequestPayload {
    pub fn new() -> Self {
        Self::default()
    }

    /// Payload with a JSON body.
    pub fn json(body: Value) -> Self {
        Self {
            query: Vec::new(),
            json: Some(body),
        }
    }

    /// Add a query parameter.
    pub fn with_query(mut self, key: &str, value: impl Into<String>) -> Self {
        self.query.push((key.to_string(), value.into()));
        self
    }
}

/// A successful response body.
#[derive(Clone, Debug, PartialEq)]
pub enum ResponseBody {
    Json(Value),
    /// Body that did not parse as JSON
    Text(String),
    Empty,
}

impl ResponseBody {
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            ResponseBody::Json(value) => Some(value),
            _ => None,
        }
    }

    /// JSON value, with `Null` for empty or non-JSON bodies.
    pub fn into_json(self) -> Value {
        match self {
            ResponseBody::Json(value) => value,
            _ => Value::Null,
        }
    }
}

/// HTTP client shared by an adapter's calls.
///
/// Holds no per-request state; clones share the connection pool.
#[derive(Clone, Debug)]
pub struct ResilientClient {
    http: reqwest::Client,
    base_url: String,
    auth: Auth,
    policy: RetryPolicy,
}

impl ResilientClient {
    /// Create a client rooted at `base_url`.
    pub fn new(base_url: &str, auth: Auth, policy: RetryPolicy) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(policy.request_timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            auth,
            policy,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    fn url(&self, target: &str) -> String {
        if target.starts_with("http://") || target.starts_with("https://") {
            target.to_string()
        } else if target.starts_with('/') {
            format!("{}{}", self.base_url, target)
        } else {
            format!("{}/{}", self.base_url, target)
        }
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.auth {
            Auth::None => builder,
            Auth::Bearer(token) => builder.bearer_auth(token),
            Auth::Header { name, value } => builder.header(name.as_str(), value.as_str()),
        }
    }

    async fn send_once(
        &self,
        method: &Method,
        url: &str,
        payload: &RequestPayload,
    ) -> std::result::Result<Response, reqwest::Error> {
        let mut builder = self.authorize(self.http.request(method.clone(), url));
        if !payload.query.is_empty() {
            builder = builder.query(&payload.query);
        }
        if let Some(body) = &payload.json {
            builder = builder.json(body);
        }
        builder.send().await
    }

    /// Send a request, retrying transport failures and 429/5xx responses.
    ///
    /// Other non-2xx statuses fail immediately with [`Error::Protocol`].
    pub async fn execute(
        &self,
        method: Method,
        target: &str,
        payload: &RequestPayload,
    ) -> Result<ResponseBody> {
        let url = self.url(target);
        let mut attempt: u32 = 1;

        loop {
            match self.send_once(&method, &url, payload).await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        debug!(%method, url = %url, status = status.as_u16(), attempt, "request succeeded");
                        return parse_body(response).await;
                    }

                    let body = truncate_chars(
                        &response.text().await.unwrap_or_default(),
                        MAX_ERROR_BODY_CHARS,
                    );

                    if !is_retryable_status(status) {
                        return Err(Error::Protocol {
                            status: status.as_u16(),
                            body,
                        });
                    }
                    if attempt > self.policy.max_retries {
                        warn!(%method, url = %url, status = status.as_u16(), attempts = attempt, "retries exhausted");
                        return Err(Error::RateLimited {
                            status: status.as_u16(),
                            attempts: attempt,
                            body,
                        });
                    }
                    warn!(%method, url = %url, status = status.as_u16(), attempt, "retryable status, backing off");
                }
                Err(err) => {
                    if attempt > self.policy.max_retries {
                        warn!(%method, url = %url, attempts = attempt, error = %err, "retries exhausted");
                        return Err(Error::Network(format!(
                            "{} failed after {} attempts: {}",
                            url, attempt, err
                        )));
                    }
                    warn!(%method, url = %url, attempt, error = %err, "transport failure, backing off");
                }
            }

            tokio::time::sleep(self.policy.delay_for(attempt)).await;
            attempt += 1;
        }
    }

    pub async fn get(&self, target: &str, payload: &RequestPayload) -> Result<ResponseBody> {
        self.execute(Method::GET, target, payload).await
    }

    pub async fn post(&self, target: &str, body: Value) -> Result<ResponseBody> {
        self.execute(Method::POST, target, &RequestPayload::json(body))
            .await
    }
}

fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

async fn parse_body(response: Response) -> Result<ResponseBody> {
    let text = response.text().await?;
    if text.trim().is_empty() {
        return Ok(ResponseBody::Empty);
    }
    Ok(match serde_json::from_str(&text) {
        Ok(value) => ResponseBody::Json(value),
        Err(_) => ResponseBody::Text(text),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::testing::FakeServer;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            backoff_factor: 1.5,
            backoff_unit: Duration::from_millis(1),
            request_timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_delay_for_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for(2), Duration::from_millis(1500));
        assert_eq!(policy.delay_for(3), Duration::from_millis(2250));
    }

    #[tokio::test]
    async fn test_success_parses_json() {
        let server = FakeServer::start(|_| (200, r#"{"ok":true}"#.to_string())).await;
        let client = ResilientClient::new(&server.url(), Auth::None, fast_policy(3)).unwrap();

        let body = client.get("/health", &RequestPayload::new()).await.unwrap();
        assert_eq!(body, ResponseBody::Json(json!({"ok": true})));
    }

    #[tokio::test]
    async fn test_non_json_body_is_text() {
        let server = FakeServer::start(|_| (200, "pong".to_string())).await;
        let client = ResilientClient::new(&server.url(), Auth::None, fast_policy(0)).unwrap();

        let body = client.get("ping", &RequestPayload::new()).await.unwrap();
        assert_eq!(body, ResponseBody::Text("pong".into()));
    }

    #[tokio::test]
    async fn test_empty_body() {
        let server = FakeServer::start(|_| (200, String::new())).await;
        let client = ResilientClient::new(&server.url(), Auth::None, fast_policy(0)).unwrap();

        let body = client.post("/x", json!({})).await.unwrap();
        assert_eq!(body, ResponseBody::Empty);
    }

    #[tokio::test]
    async fn test_retries_then_succeeds() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let server = FakeServer::start(move |_| {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                (503, "busy".to_string())
            } else {
                (200, "{}".to_string())
            }
        })
        .await;
        let client = ResilientClient::new(&server.url(), Auth::None, fast_policy(3)).unwrap();

        client.post("/v1/memories", json!({"content": "a"})).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_rate_limited_after_retries() {
        let server = FakeServer::start(|_| (429, "slow down".to_string())).await;
        let client = ResilientClient::new(&server.url(), Auth::None, fast_policy(3)).unwrap();

        let err = client.get("/x", &RequestPayload::new()).await.unwrap_err();
        match err {
            Error::RateLimited {
                status,
                attempts,
                body,
            } => {
                assert_eq!(status, 429);
                assert_eq!(attempts, 4);
                assert_eq!(body, "slow down");
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(server.requests().len(), 4);
    }

    #[tokio::test]
    async fn test_client_error_not_retried() {
        let long_body = "x".repeat(800);
        let server = FakeServer::start(move |_| (400, long_body.clone())).await;
        let client = ResilientClient::new(&server.url(), Auth::None, fast_policy(3)).unwrap();

        let err = client.get("/x", &RequestPayload::new()).await.unwrap_err();
        match err {
            Error::Protocol { status, body } => {
                assert_eq!(status, 400);
                assert_eq!(body.len(), MAX_ERROR_BODY_CHARS);
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(server.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_transport_failure_is_network_error() {
        let url = FakeServer::unused_url().await;
        let client = ResilientClient::new(&url, Auth::None, fast_policy(2)).unwrap();

        let err = client.get("/x", &RequestPayload::new()).await.unwrap_err();
        assert!(matches!(err, Error::Network(_)));
        assert!(err.to_string().contains("3 attempts"));
    }

    #[tokio::test]
    async fn test_auth_query_and_body_sent() {
        let server = FakeServer::start(|_| (200, "{}".to_string())).await;
        let client = ResilientClient::new(
            &format!("{}/", server.url()),
            Auth::Header {
                name: "Api-Key".into(),
                value: "secret".into(),
            },
            fast_policy(0),
        )
        .unwrap();

        let payload = RequestPayload::json(json!({"a": 1})).with_query("q", "evidence");
        client.execute(Method::PUT, "/items", &payload).await.unwrap();

        let requests = server.requests();
        assert_eq!(requests[0].method, "PUT");
        assert_eq!(requests[0].path(), "/items");
        assert_eq!(requests[0].query_param("q").as_deref(), Some("evidence"));
        assert_eq!(requests[0].header("api-key"), Some("secret"));
        assert_eq!(requests[0].json(), json!({"a": 1}));
    }

    #[tokio::test]
    async fn test_bearer_auth() {
        let server = FakeServer::start(|_| (200, "{}".to_string())).await;
        let client =
            ResilientClient::new(&server.url(), Auth::Bearer("tok".into()), fast_policy(0))
                .unwrap();

        client.get("/x", &RequestPayload::new()).await.unwrap();
        assert_eq!(server.requests()[0].header("authorization"), Some("Bearer tok"));
    }
}
