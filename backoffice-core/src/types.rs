//! Core data structures shared across the console crates

use serde::{Deserialize, Serialize};

/// Account record returned by the auth endpoints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
    /// Role names; the sentinel `admin` grants every permission
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

/// Login credentials
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

/// An access/refresh token pair as held by the client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionTokens {
    /// Short-lived bearer credential
    #[serde(alias = "token", alias = "accessToken")]
    pub access_token: String,
    /// Longer-lived credential exchanged for a new pair
    #[serde(alias = "refreshToken")]
    pub refresh_token: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_tokens_accept_both_wire_shapes() {
        let camel: SessionTokens =
            serde_json::from_str(r#"{"token":"abc","refreshToken":"rtk"}"#).unwrap();
        assert_eq!(camel.access_token, "abc");
        assert_eq!(camel.refresh_token, "rtk");

        let snake: SessionTokens =
            serde_json::from_str(r#"{"accessToken":"abc","refresh_token":"rtk"}"#).unwrap();
        assert_eq!(camel, snake);
    }

    #[test]
    fn user_record_defaults_optional_fields() {
        let user: UserRecord =
            serde_json::from_str(r#"{"id":"u1","email":"a@b.com"}"#).unwrap();
        assert!(user.roles.is_empty());
        assert!(user.name.is_none());
    }
}
