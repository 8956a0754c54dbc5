//! # IoT Telemetry
//!
//! Observability for the in-process event bus.
//!
//! ## Components
//!
//! - **Logs**: `tracing` with an `EnvFilter`, pretty or JSON output
//! - **Traces**: OpenTelemetry OTLP export, plus a serializable trace context
//!   that can ride along with events
//! - **Metrics**: Prometheus counters and gauges for publishes, subscriptions
//!   and channel drops, labelled by event name
//!
//! ## Usage
//!
//! ```rust,ignore
//! use iot_telemetry::{init_telemetry, TelemetryConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = TelemetryConfig::from_env();
//!     let _guard = init_telemetry(config).await.expect("Failed to init telemetry");
//!
//!     // Events published from here on are logged, traced and counted.
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `OTEL_EXPORTER_OTLP_ENDPOINT` | `http://localhost:4317` | OTLP endpoint |
//! | `OTEL_SERVICE_NAME` | `iot-events` | Service name in traces |
//! | `IOT_LOG_LEVEL` | `info` | Log level filter |
//! | `IOT_JSON_LOGS` | `false` (`true` in containers) | JSON log output |

mod config;
mod context;
mod logging;
pub mod metrics;
mod tracing_setup;

pub use config::TelemetryConfig;
pub use context::{PropagatedContext, TraceContext};
pub use logging::StructuredLogger;
pub use metrics::{
    encode_metrics, init_event_series, register_metrics, HistogramTimer, MetricsHandle,
    EVENTS_CHANNEL_DROPPED, EVENTS_DELIVERY_DURATION, EVENTS_HANDLER_PANICS, EVENTS_PUBLISHED,
    EVENTS_SUBSCRIPTIONS, REGISTRY,
};
pub use tracing_setup::TracingGuard;

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to initialize OpenTelemetry tracer: {0}")]
    TracerInit(String),

    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Initialize logging, tracing and metrics.
///
/// Returns a guard that must be held for the lifetime of the application.
/// When dropped, it flushes pending traces.
pub async fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    config.validate()?;

    // Metrics first (synchronous)
    let metrics_handle = register_metrics()?;

    let tracing_guard = tracing_setup::init_tracing(&config).await?;

    let _logging = logging::init_logging(&config)?;

    Ok(TelemetryGuard {
        _tracing: tracing_guard,
        _metrics: metrics_handle,
    })
}

/// Guard that keeps telemetry active. Drop to flush and shutdown.
pub struct TelemetryGuard {
    _tracing: TracingGuard,
    _metrics: MetricsHandle,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        tracing::info!("Shutting down telemetry...");
    }
}

/// Increment a counter, optionally selecting label values first.
#[macro_export]
macro_rules! metric_inc {
    ($metric:expr) => {
        $metric.inc()
    };
    ($metric:expr, $labels:expr) => {
        $metric.with_label_values($labels).inc()
    };
}

/// Decrement a gauge, optionally selecting label values first.
#[macro_export]
macro_rules! metric_dec {
    ($metric:expr) => {
        $metric.dec()
    };
    ($metric:expr, $labels:expr) => {
        $metric.with_label_values($labels).dec()
    };
}
