//! Abstract request/response exchange and the reqwest-backed transport
//!
//! The session core never talks to the network directly; everything goes
//! through [`ApiTransport`]. A completed HTTP exchange always yields an
//! [`ApiResponse`], whatever the status code, so callers can inspect 401/403
//! responses. `Err` is reserved for requests that never completed.

use async_trait::async_trait;
use backoffice_core::{BackofficeError, BackofficeResult, ErrorContext};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use tracing::debug;

/// HTTP method of an outbound call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

/// An outbound API call, described abstractly
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    /// Path relative to the API base URL, e.g. `/auth/login`
    pub path: String,
    /// JSON body, if any
    pub body: Option<serde_json::Value>,
    /// Bearer credential to attach; None sends the request unauthenticated
    pub bearer: Option<String>,
}

impl ApiRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            body: None,
            bearer: None,
        }
    }

    pub fn post(path: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            body: Some(body),
            bearer: None,
        }
    }

    pub fn with_bearer(mut self, token: Option<String>) -> Self {
        self.bearer = token;
        self
    }
}

/// The result of a completed exchange
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub body: serde_json::Value,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status == 401
    }

    pub fn is_forbidden(&self) -> bool {
        self.status == 403
    }

    /// Deserialize the body into a typed payload
    pub fn json<T: DeserializeOwned>(&self) -> BackofficeResult<T> {
        serde_json::from_value(self.body.clone()).map_err(BackofficeError::from)
    }
}

/// Abstract exchange the whole core is written against
#[async_trait]
pub trait ApiTransport: Send + Sync {
    async fn execute(&self, request: ApiRequest) -> BackofficeResult<ApiResponse>;
}

/// Configuration for the HTTP transport
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Base URL for the API
    pub base_url: String,
    /// Request timeout in seconds
    pub timeout_seconds: u64,
    /// User agent string
    pub user_agent: String,
    /// Additional headers
    pub headers: HashMap<String, String>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            timeout_seconds: 30,
            user_agent: "backoffice-console/0.1".to_string(),
            headers: HashMap::new(),
        }
    }
}

impl TransportConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    pub fn with_header(mut self, key: String, value: String) -> Self {
        self.headers.insert(key, value);
        self
    }

    pub fn with_timeout(mut self, timeout_seconds: u64) -> Self {
        self.timeout_seconds = timeout_seconds;
        self
    }
}

/// reqwest-backed transport
pub struct HttpTransport {
    client: reqwest::Client,
    config: TransportConfig,
}

impl HttpTransport {
    pub fn new(config: TransportConfig) -> BackofficeResult<Self> {
        let client = create_http_client(&config)?;
        Ok(Self { client, config })
    }

    fn url_for(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

#[async_trait]
impl ApiTransport for HttpTransport {
    async fn execute(&self, request: ApiRequest) -> BackofficeResult<ApiResponse> {
        let url = self.url_for(&request.path);
        debug!(method = ?request.method, url = %url, "Dispatching API request");

        let mut builder = match request.method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
            Method::Put => self.client.put(&url),
            Method::Delete => self.client.delete(&url),
        };

        if let Some(token) = &request.bearer {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| BackofficeError::Network {
            message: format!("Request to {} failed: {}", url, e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("http_transport")
                .with_operation("execute")
                .with_metadata("path", &request.path)
                .with_suggestion("Check network connectivity and API availability"),
        })?;

        let status = response.status().as_u16();
        let body = response
            .json::<serde_json::Value>()
            .await
            .unwrap_or(serde_json::Value::Null);

        Ok(ApiResponse { status, body })
    }
}

/// Helper to create an HTTP client with common configuration
fn create_http_client(config: &TransportConfig) -> BackofficeResult<reqwest::Client> {
    let mut headers = reqwest::header::HeaderMap::new();

    headers.insert(
        reqwest::header::USER_AGENT,
        reqwest::header::HeaderValue::from_str(&config.user_agent).map_err(|e| {
            BackofficeError::Config {
                message: format!("Invalid user agent: {}", e),
                source: Some(Box::new(e)),
                context: ErrorContext::new("http_transport").with_operation("create_client"),
            }
        })?,
    );

    for (key, value) in &config.headers {
        let name = reqwest::header::HeaderName::from_bytes(key.as_bytes()).map_err(|e| {
            BackofficeError::Config {
                message: format!("Invalid header name '{}': {}", key, e),
                source: Some(Box::new(e)),
                context: ErrorContext::new("http_transport").with_operation("create_client"),
            }
        })?;
        let value = reqwest::header::HeaderValue::from_str(value).map_err(|e| {
            BackofficeError::Config {
                message: format!("Invalid header value for '{}': {}", key, e),
                source: Some(Box::new(e)),
                context: ErrorContext::new("http_transport").with_operation("create_client"),
            }
        })?;
        headers.insert(name, value);
    }

    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(config.timeout_seconds))
        .default_headers(headers)
        .build()
        .map_err(|e| BackofficeError::Config {
            message: format!("Failed to create HTTP client: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("http_transport").with_operation("create_client"),
        })
}
