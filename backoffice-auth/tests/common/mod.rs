//! Shared test fixtures: a scriptable transport and payload builders
#![allow(dead_code)]

use async_trait::async_trait;
use backoffice_api::{ApiRequest, ApiResponse, ApiTransport, Method};
use backoffice_core::{AuthConfig, BackofficeResult};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

/// Scriptable [`ApiTransport`]: responses are queued or set as sticky
/// defaults per method/path, and every request is recorded.
#[derive(Default)]
pub struct MockTransport {
    queued: Mutex<HashMap<String, VecDeque<ApiResponse>>>,
    sticky: Mutex<HashMap<String, ApiResponse>>,
    delays_ms: Mutex<HashMap<String, u64>>,
    calls: Mutex<Vec<ApiRequest>>,
}

fn key(method: Method, path: &str) -> String {
    format!("{:?} {}", method, path)
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue a one-shot response; queued responses win over sticky ones
    pub fn enqueue(&self, method: Method, path: &str, status: u16, body: serde_json::Value) {
        self.queued
            .lock()
            .unwrap()
            .entry(key(method, path))
            .or_default()
            .push_back(ApiResponse { status, body });
    }

    /// Set the response returned for every remaining call
    pub fn respond(&self, method: Method, path: &str, status: u16, body: serde_json::Value) {
        self.sticky
            .lock()
            .unwrap()
            .insert(key(method, path), ApiResponse { status, body });
    }

    /// Delay every response on this method/path
    pub fn delay(&self, method: Method, path: &str, millis: u64) {
        self.delays_ms
            .lock()
            .unwrap()
            .insert(key(method, path), millis);
    }

    pub fn calls(&self) -> Vec<ApiRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, method: Method, path: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| call.method == method && call.path == path)
            .count()
    }
}

#[async_trait]
impl ApiTransport for MockTransport {
    async fn execute(&self, request: ApiRequest) -> BackofficeResult<ApiResponse> {
        self.calls.lock().unwrap().push(request.clone());
        let k = key(request.method, &request.path);

        let delay = self.delays_ms.lock().unwrap().get(&k).copied();
        if let Some(millis) = delay {
            tokio::time::sleep(std::time::Duration::from_millis(millis)).await;
        }

        if let Some(response) = self
            .queued
            .lock()
            .unwrap()
            .get_mut(&k)
            .and_then(|queue| queue.pop_front())
        {
            return Ok(response);
        }
        if let Some(response) = self.sticky.lock().unwrap().get(&k) {
            return Ok(response.clone());
        }
        Ok(ApiResponse {
            status: 404,
            body: serde_json::Value::Null,
        })
    }
}

/// A structurally valid JWT whose payload carries the given `exp`
pub fn token_with_exp(exp: i64) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(serde_json::json!({"exp": exp, "sub": "u1"}).to_string());
    format!("{}.{}.signature", header, payload)
}

/// A token expiring this many seconds from now
pub fn token_expiring_in(seconds: i64) -> String {
    token_with_exp(Utc::now().timestamp() + seconds)
}

pub fn user_body(roles: &[&str]) -> serde_json::Value {
    serde_json::json!({
        "id": "u1",
        "email": "a@b.com",
        "name": "Ada",
        "roles": roles,
    })
}

pub fn auth_body(access: &str, refresh: &str, roles: &[&str]) -> serde_json::Value {
    serde_json::json!({
        "token": access,
        "refreshToken": refresh,
        "user": user_body(roles),
    })
}

pub fn test_config() -> AuthConfig {
    AuthConfig {
        api_base_url: "http://api.test".to_string(),
        ..Default::default()
    }
}

/// Script the identity and permission endpoints for a happy-path session
pub fn script_context(mock: &MockTransport, roles: &[&str], permissions: serde_json::Value) {
    mock.respond(
        Method::Get,
        backoffice_api::ME_PATH,
        200,
        serde_json::json!({"user": user_body(roles)}),
    );
    mock.respond(
        Method::Get,
        backoffice_api::PERMISSIONS_PATH,
        200,
        serde_json::json!({"permissions": permissions}),
    );
}
