//! Prometheus metrics for the event bus.
//!
//! All metrics follow the naming convention: `iot_events_<metric>_<unit>`
//! and are labelled by event name (or, for subscriptions, by pattern).
//!
//! ## Metric Types
//!
//! - **Counter**: publishes, channel drops, handler panics
//! - **Gauge**: active subscriptions
//! - **Histogram**: time spent delivering one event to all handlers

use lazy_static::lazy_static;
use prometheus::{
    exponential_buckets, CounterVec, Encoder, GaugeVec, Histogram, HistogramOpts, Opts,
    Registry, TextEncoder,
};
use std::sync::Arc;

use crate::TelemetryError;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    /// Events published, by event name
    pub static ref EVENTS_PUBLISHED: CounterVec = CounterVec::new(
        Opts::new("iot_events_publishes_total", "Number of events published"),
        &["name"]
    ).expect("metric creation failed");

    /// Active subscriptions, by subscribed name or pattern
    pub static ref EVENTS_SUBSCRIPTIONS: GaugeVec = GaugeVec::new(
        Opts::new("iot_events_subscriptions", "Number of active event subscriptions"),
        &["name"]
    ).expect("metric creation failed");

    /// Events dropped by channel handlers that were full
    pub static ref EVENTS_CHANNEL_DROPPED: CounterVec = CounterVec::new(
        Opts::new(
            "iot_events_channel_dropped_total",
            "Number of events dropped because a subscriber channel was full"
        ),
        &["name"]
    ).expect("metric creation failed");

    /// Handler panics recovered by the dispatcher
    pub static ref EVENTS_HANDLER_PANICS: CounterVec = CounterVec::new(
        Opts::new(
            "iot_events_handler_panics_total",
            "Number of handler panics recovered during dispatch"
        ),
        &["name"]
    ).expect("metric creation failed");

    /// Time to deliver one event to all matching handlers
    pub static ref EVENTS_DELIVERY_DURATION: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "iot_events_delivery_duration_seconds",
            "Time spent delivering an event to its handlers"
        ).buckets(exponential_buckets(0.00001, 2.0, 16).expect("valid buckets"))
    ).expect("metric creation failed");
}

/// Handle for the registered metrics
pub struct MetricsHandle {
    _registry: Arc<Registry>,
}

/// Register all metrics with the global registry.
///
/// Safe to call more than once; metrics that are already registered are kept.
pub fn register_metrics() -> Result<MetricsHandle, TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(EVENTS_PUBLISHED.clone()),
        Box::new(EVENTS_SUBSCRIPTIONS.clone()),
        Box::new(EVENTS_CHANNEL_DROPPED.clone()),
        Box::new(EVENTS_HANDLER_PANICS.clone()),
        Box::new(EVENTS_DELIVERY_DURATION.clone()),
    ];

    for metric in metrics {
        match REGISTRY.register(metric) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(TelemetryError::MetricsInit(e.to_string())),
        }
    }

    Ok(MetricsHandle {
        _registry: Arc::new(REGISTRY.clone()),
    })
}

/// Initialize the per-name series so they are exported at zero before the
/// first publish.
pub fn init_event_series(name: &str) {
    EVENTS_PUBLISHED.with_label_values(&[name]);
    EVENTS_SUBSCRIPTIONS.with_label_values(&[name]);
    EVENTS_CHANNEL_DROPPED.with_label_values(&[name]);
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}

/// Timer guard for automatic histogram observation.
pub struct HistogramTimer {
    histogram: Histogram,
    start: std::time::Instant,
}

impl HistogramTimer {
    /// Start a new timer for the given histogram.
    pub fn new(histogram: &Histogram) -> Self {
        Self {
            histogram: histogram.clone(),
            start: std::time::Instant::now(),
        }
    }
}

impl Drop for HistogramTimer {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        self.histogram.observe(duration);
    }
}
