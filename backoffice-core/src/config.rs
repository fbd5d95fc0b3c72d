//! Configuration management

use crate::error::{BackofficeError, BackofficeResult, ErrorContext};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration for the session and authorization core
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Base URL of the console REST API
    pub api_base_url: String,
    /// Request timeout in seconds
    pub timeout_seconds: u64,
    /// How long before expiry a proactive refresh is triggered, in milliseconds
    pub refresh_lead_ms: u64,
    /// Lower bound on the renewal timer delay, in milliseconds
    pub min_refresh_delay_ms: u64,
    /// Path of the durable token storage file (None keeps tokens in memory only)
    pub storage_path: Option<String>,
    /// Route the UI should navigate to when the session ends
    pub login_route: String,
    /// Route the UI should navigate to on access denial
    pub denied_route: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8080/api".to_string(),
            timeout_seconds: 30,
            refresh_lead_ms: 60_000,
            min_refresh_delay_ms: 5_000,
            storage_path: None,
            login_route: "/login".to_string(),
            denied_route: "/denied".to_string(),
        }
    }
}

impl AuthConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> BackofficeResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| BackofficeError::Config {
            message: format!("Failed to read config file: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config")
                .with_operation("read_file")
                .with_suggestion("Check if the config file exists and is readable"),
        })?;

        let config: AuthConfig = toml::from_str(&content).map_err(|e| BackofficeError::Config {
            message: format!("Failed to parse config: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config")
                .with_operation("parse_toml")
                .with_suggestion("Check TOML syntax in config file"),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> BackofficeResult<()> {
        let content = toml::to_string_pretty(self).map_err(|e| BackofficeError::Config {
            message: format!("Failed to serialize config: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config").with_operation("serialize_toml"),
        })?;

        std::fs::write(path, content).map_err(|e| BackofficeError::Config {
            message: format!("Failed to write config file: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config").with_operation("write_file"),
        })?;

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> BackofficeResult<()> {
        if self.api_base_url.is_empty() {
            return Err(BackofficeError::Config {
                message: "api_base_url must not be empty".to_string(),
                source: None,
                context: ErrorContext::new("config").with_operation("validate"),
            });
        }

        if self.timeout_seconds == 0 {
            return Err(BackofficeError::Config {
                message: "timeout_seconds must be greater than 0".to_string(),
                source: None,
                context: ErrorContext::new("config").with_operation("validate"),
            });
        }

        if self.min_refresh_delay_ms > self.refresh_lead_ms {
            return Err(BackofficeError::Config {
                message: "min_refresh_delay_ms must not exceed refresh_lead_ms".to_string(),
                source: None,
                context: ErrorContext::new("config")
                    .with_operation("validate")
                    .with_suggestion("Lower min_refresh_delay_ms or raise refresh_lead_ms"),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(AuthConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_zero_timeout() {
        let config = AuthConfig {
            timeout_seconds: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn roundtrips_through_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("auth.toml");

        let config = AuthConfig {
            refresh_lead_ms: 30_000,
            ..Default::default()
        };
        config.save_to_file(&path).unwrap();

        let loaded = AuthConfig::from_file(&path).unwrap();
        assert_eq!(loaded.refresh_lead_ms, 30_000);
        assert_eq!(loaded.api_base_url, config.api_base_url);
    }
}
