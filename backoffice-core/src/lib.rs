//! Backoffice Core - Shared types, errors, configuration and logging
//!
//! This crate defines the ambient foundation used by the console's session
//! and authorization crates: the unified error type, the configuration
//! surface, structured logging setup, and the data structures exchanged
//! with the REST API.

pub mod config;
pub mod error;
pub mod logging;
pub mod types;

pub use config::*;
pub use error::*;
pub use logging::*;
pub use types::*;

// Re-export commonly used external types
pub use tokio;
pub use tracing;
