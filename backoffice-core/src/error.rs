//! Unified error handling system
//!
//! Structured error types with context, recovery suggestions, and proper error chaining

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, warn};

pub type BackofficeResult<T> = Result<T, BackofficeError>;

/// Error context providing additional information for debugging and recovery
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorContext {
    /// Unique error ID for tracking
    pub error_id: String,
    /// Timestamp when error occurred
    pub timestamp: DateTime<Utc>,
    /// Component where error originated
    pub component: String,
    /// Operation being performed when error occurred
    pub operation: Option<String>,
    /// Additional metadata
    pub metadata: std::collections::HashMap<String, String>,
    /// Recovery suggestions
    pub recovery_suggestions: Vec<String>,
}

impl ErrorContext {
    pub fn new(component: &str) -> Self {
        Self {
            error_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            component: component.to_string(),
            operation: None,
            metadata: std::collections::HashMap::new(),
            recovery_suggestions: Vec::new(),
        }
    }

    pub fn with_operation(mut self, operation: &str) -> Self {
        self.operation = Some(operation.to_string());
        self
    }

    pub fn with_metadata(mut self, key: &str, value: &str) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_suggestion(mut self, suggestion: &str) -> Self {
        self.recovery_suggestions.push(suggestion.to_string());
        self
    }
}

/// Main error type for the backoffice console core
#[derive(Error, Debug)]
pub enum BackofficeError {
    #[error("Network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        context: ErrorContext,
    },

    #[error("Unauthorized: {message}")]
    Unauthorized {
        message: String,
        context: ErrorContext,
    },

    #[error("Forbidden: {message}")]
    Forbidden {
        message: String,
        context: ErrorContext,
    },

    #[error("Invalid credentials")]
    InvalidCredentials { context: ErrorContext },

    #[error("Token refresh failed: {message}")]
    RefreshExhausted {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        context: ErrorContext,
    },

    #[error("Malformed token: {message}")]
    MalformedToken {
        message: String,
        context: ErrorContext,
    },

    #[error("Storage error: {message}")]
    Storage {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        context: ErrorContext,
    },

    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        context: ErrorContext,
    },

    #[error("Unexpected response: {message}")]
    UnexpectedResponse {
        message: String,
        status: Option<u16>,
        context: ErrorContext,
    },

    /// Error observed through a shared in-flight operation; concurrent
    /// callers of a single-flight future all receive the same settled error.
    #[error("{0}")]
    Shared(std::sync::Arc<BackofficeError>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl BackofficeError {
    /// Get the error context
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            BackofficeError::Network { context, .. } => Some(context),
            BackofficeError::Unauthorized { context, .. } => Some(context),
            BackofficeError::Forbidden { context, .. } => Some(context),
            BackofficeError::InvalidCredentials { context } => Some(context),
            BackofficeError::RefreshExhausted { context, .. } => Some(context),
            BackofficeError::MalformedToken { context, .. } => Some(context),
            BackofficeError::Storage { context, .. } => Some(context),
            BackofficeError::Config { context, .. } => Some(context),
            BackofficeError::UnexpectedResponse { context, .. } => Some(context),
            BackofficeError::Shared(inner) => inner.context(),
            _ => None,
        }
    }

    /// Check if error is recoverable
    pub fn is_recoverable(&self) -> bool {
        match self {
            BackofficeError::Network { .. } => true,
            BackofficeError::Storage { .. } => true,
            BackofficeError::Unauthorized { .. } => false,
            BackofficeError::Forbidden { .. } => false,
            BackofficeError::InvalidCredentials { .. } => false,
            BackofficeError::RefreshExhausted { .. } => false,
            BackofficeError::Shared(inner) => inner.is_recoverable(),
            _ => false,
        }
    }

    /// True for errors produced by a 401 response
    pub fn is_unauthorized(&self) -> bool {
        match self {
            BackofficeError::Unauthorized { .. } => true,
            BackofficeError::Shared(inner) => inner.is_unauthorized(),
            _ => false,
        }
    }

    /// True for errors produced by a 403 response
    pub fn is_forbidden(&self) -> bool {
        match self {
            BackofficeError::Forbidden { .. } => true,
            BackofficeError::Shared(inner) => inner.is_forbidden(),
            _ => false,
        }
    }

    /// Log the error with appropriate level
    pub fn log(&self) {
        match self {
            BackofficeError::Network { .. } | BackofficeError::Storage { .. } => {
                warn!(
                    error_id = ?self.context().map(|c| &c.error_id),
                    error = %self,
                    "Recoverable error occurred"
                );
            }
            BackofficeError::Config { .. } => {
                error!(
                    error_id = ?self.context().map(|c| &c.error_id),
                    error = %self,
                    "Configuration error"
                );
            }
            _ => {
                error!(
                    error_id = ?self.context().map(|c| &c.error_id),
                    error = %self,
                    "Error occurred"
                );
            }
        }
    }
}

/// Convenience macros for creating errors with context
#[macro_export]
macro_rules! network_error {
    ($msg:expr, $component:expr) => {
        $crate::BackofficeError::Network {
            message: $msg.to_string(),
            source: None,
            context: $crate::ErrorContext::new($component),
        }
    };
    ($msg:expr, $component:expr, $source:expr) => {
        $crate::BackofficeError::Network {
            message: $msg.to_string(),
            source: Some(Box::new($source)),
            context: $crate::ErrorContext::new($component),
        }
    };
}

#[macro_export]
macro_rules! storage_error {
    ($msg:expr, $component:expr) => {
        $crate::BackofficeError::Storage {
            message: $msg.to_string(),
            source: None,
            context: $crate::ErrorContext::new($component)
                .with_suggestion("Check storage path permissions and free space"),
        }
    };
    ($msg:expr, $component:expr, $source:expr) => {
        $crate::BackofficeError::Storage {
            message: $msg.to_string(),
            source: Some(Box::new($source)),
            context: $crate::ErrorContext::new($component)
                .with_suggestion("Check storage path permissions and free space"),
        }
    };
}

#[macro_export]
macro_rules! config_error {
    ($msg:expr, $component:expr) => {
        $crate::BackofficeError::Config {
            message: $msg.to_string(),
            source: None,
            context: $crate::ErrorContext::new($component)
                .with_suggestion("Check your configuration file"),
        }
    };
}
