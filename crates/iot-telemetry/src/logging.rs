//! Structured logging.
//!
//! Logs are emitted through the `tracing` facade with consistent fields:
//! - `name`: event name (dispatcher, handlers)
//! - `pattern`: subscription pattern
//! - `correlation_ids`: when a log line concerns a specific event
//!
//! The subscriber itself (pretty or JSON) is installed by the tracing setup.

use crate::{TelemetryConfig, TelemetryError};

/// Structured logger handle
pub struct StructuredLogger {
    pub json: bool,
}

/// Record the logging configuration once the subscriber is installed.
pub fn init_logging(config: &TelemetryConfig) -> Result<StructuredLogger, TelemetryError> {
    tracing::debug!(
        json_logs = config.json_logs,
        log_level = %config.log_level,
        "Structured logging configured"
    );

    Ok(StructuredLogger {
        json: config.json_logs,
    })
}
