//! Unified logging system
//!
//! Structured logging with configurable output format and filtering

use serde::{Deserialize, Serialize};
use std::io;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Output format (json, pretty, compact)
    pub format: LogFormat,
    /// Whether to include file and line information
    pub include_location: bool,
    /// Whether to log to file
    pub log_to_file: bool,
    /// Log file path (if log_to_file is true)
    pub log_file_path: Option<String>,
    /// Custom filter directives
    pub filter_directives: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LogFormat {
    Json,
    Pretty,
    Compact,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            include_location: false,
            log_to_file: false,
            log_file_path: None,
            filter_directives: vec![
                "backoffice_core=debug".to_string(),
                "backoffice_api=debug".to_string(),
                "backoffice_auth=debug".to_string(),
            ],
        }
    }
}

/// Initialize the logging system
pub fn init_logging(
    config: &LoggingConfig,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    for directive in &config.filter_directives {
        filter = filter.add_directive(directive.parse()?);
    }

    let registry = tracing_subscriber::registry().with(filter);

    macro_rules! install {
        ($layer:expr) => {{
            let layer = $layer
                .with_span_events(FmtSpan::NONE)
                .with_file(config.include_location)
                .with_line_number(config.include_location);

            if config.log_to_file {
                let log_path = config
                    .log_file_path
                    .as_ref()
                    .ok_or("log_file_path must be specified when log_to_file is true")?;
                let file = std::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(log_path)?;
                registry.with(layer.with_writer(file)).init();
            } else {
                registry.with(layer.with_writer(io::stdout)).init();
            }
        }};
    }

    match config.format {
        LogFormat::Json => install!(fmt::layer()),
        LogFormat::Pretty => install!(fmt::layer().pretty()),
        LogFormat::Compact => install!(fmt::layer().compact()),
    }

    Ok(())
}
