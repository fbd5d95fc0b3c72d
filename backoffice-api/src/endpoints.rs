//! Typed payloads and path constants for the auth endpoints

use backoffice_core::UserRecord;
use serde::{Deserialize, Serialize};

pub const LOGIN_PATH: &str = "/auth/login";
pub const REFRESH_PATH: &str = "/auth/refresh";
pub const LOGOUT_PATH: &str = "/auth/logout";
pub const ME_PATH: &str = "/auth/me";
pub const PERMISSIONS_PATH: &str = "/permissions/me";

/// True for the endpoints whose 401 responses must never trigger the
/// refresh-and-retry flow (the recovery would loop on itself).
pub fn is_auth_endpoint(path: &str) -> bool {
    let path = path.trim_end_matches('/');
    path.ends_with(LOGIN_PATH) || path.ends_with(REFRESH_PATH)
}

/// Response body of `POST /auth/login` and `POST /auth/refresh`
#[derive(Debug, Clone, Deserialize)]
pub struct AuthPayload {
    #[serde(alias = "token", alias = "accessToken")]
    pub access_token: String,
    #[serde(alias = "refreshToken")]
    pub refresh_token: String,
    pub user: UserRecord,
}

/// Response body of `GET /auth/me`
#[derive(Debug, Clone, Deserialize)]
pub struct MePayload {
    pub user: UserRecord,
}

/// Request body of `POST /auth/refresh` and `POST /auth/logout`
#[derive(Debug, Clone, Serialize)]
pub struct RefreshRequest {
    #[serde(rename = "refreshToken")]
    pub refresh_token: String,
}

/// Raw permission grants as returned by `GET /permissions/me`.
///
/// The server sends either a flat list of dotted/colon-delimited paths or a
/// nested object; both normalize to the same permission tree downstream.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum PermissionsPayload {
    List(Vec<String>),
    Tree(serde_json::Map<String, serde_json::Value>),
}

/// Envelope of `GET /permissions/me`
#[derive(Debug, Clone, Deserialize)]
pub struct PermissionsEnvelope {
    pub permissions: PermissionsPayload,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_endpoint_detection() {
        assert!(is_auth_endpoint("/auth/login"));
        assert!(is_auth_endpoint("/api/auth/refresh"));
        assert!(!is_auth_endpoint("/auth/me"));
        assert!(!is_auth_endpoint("/products"));
    }

    #[test]
    fn auth_payload_accepts_both_token_spellings() {
        let body = serde_json::json!({
            "token": "abc",
            "refreshToken": "rtk",
            "user": {"id": "u1", "email": "a@b.com", "roles": ["admin"]},
        });
        let payload: AuthPayload = serde_json::from_value(body).unwrap();
        assert_eq!(payload.access_token, "abc");
        assert_eq!(payload.refresh_token, "rtk");
        assert_eq!(payload.user.roles, vec!["admin"]);
    }

    #[test]
    fn permissions_payload_accepts_list_or_tree() {
        let list: PermissionsPayload =
            serde_json::from_value(serde_json::json!(["product.create"])).unwrap();
        assert!(matches!(list, PermissionsPayload::List(_)));

        let tree: PermissionsPayload =
            serde_json::from_value(serde_json::json!({"product": {"create": true}})).unwrap();
        assert!(matches!(tree, PermissionsPayload::Tree(_)));
    }
}
