//! Best-effort JWT claims inspection
//!
//! Tokens are opaque credentials minted by the server; nothing here verifies
//! signatures. The payload segment is decoded only to learn `exp` so renewal
//! can be scheduled. A token that cannot be decoded simply has no known
//! expiry, and the session layer treats an unknown expiry as still valid.

use backoffice_core::{BackofficeError, BackofficeResult, ErrorContext};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use tracing::debug;

/// Claims the session core cares about. Anything else in the payload is
/// ignored during deserialization.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenClaims {
    /// Expiry, seconds since the Unix epoch
    pub exp: Option<i64>,
    /// Subject (user id), when the server includes one
    #[serde(default)]
    pub sub: Option<String>,
    /// Issued-at, seconds since the Unix epoch
    #[serde(default)]
    pub iat: Option<i64>,
}

impl TokenClaims {
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.exp.and_then(|secs| Utc.timestamp_opt(secs, 0).single())
    }
}

/// Decode the payload segment of a JWT without verifying it.
///
/// Returns None for anything that is not three dot-separated segments with a
/// base64url JSON payload.
pub fn decode_claims(token: &str) -> Option<TokenClaims> {
    let payload = token.split('.').nth(1)?;
    let bytes = match URL_SAFE_NO_PAD.decode(payload) {
        Ok(bytes) => bytes,
        Err(e) => {
            debug!(error = %e, "Token payload is not valid base64url");
            return None;
        }
    };
    match serde_json::from_slice(&bytes) {
        Ok(claims) => Some(claims),
        Err(e) => {
            debug!(error = %e, "Token payload is not valid JSON");
            None
        }
    }
}

/// Expiry of an access token, when one can be determined
pub fn access_expiry(token: &str) -> Option<DateTime<Utc>> {
    decode_claims(token)?.expires_at()
}

/// Like [`decode_claims`] but for callers that need the failure surfaced
/// instead of swallowed
pub fn require_claims(token: &str) -> BackofficeResult<TokenClaims> {
    decode_claims(token).ok_or_else(|| BackofficeError::MalformedToken {
        message: "Token payload could not be decoded".to_string(),
        context: ErrorContext::new("token_claims").with_operation("require_claims"),
    })
}
