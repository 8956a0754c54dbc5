//! Bus configuration.
//!
//! The queue size is per dispatcher. Caller capture is a process-wide switch.

use serde::{Deserialize, Serialize};
use std::env;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::BusError;
use crate::DEFAULT_QUEUE_SIZE;

static INCLUDE_CALLER: AtomicBool = AtomicBool::new(false);

/// Whether `publish` records the caller's source location on events.
pub fn include_caller() -> bool {
    INCLUDE_CALLER.load(Ordering::Relaxed)
}

/// Toggle caller capture for the whole process.
pub fn set_include_caller(enabled: bool) {
    INCLUDE_CALLER.store(enabled, Ordering::Relaxed);
}

/// Dispatcher configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Capacity of the dispatcher queue. `publish` blocks when it is full.
    pub queue_size: usize,
    /// Record `file:line` of the publishing call site on each event.
    pub include_caller: bool,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            queue_size: DEFAULT_QUEUE_SIZE,
            include_caller: false,
        }
    }
}

impl BusConfig {
    /// Create configuration from environment variables.
    ///
    /// - `IOT_EVENTS_QUEUE_SIZE`: dispatcher queue capacity (default: 64)
    /// - `IOT_EVENTS_INCLUDE_CALLER`: record caller locations (default: false)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            queue_size: env::var("IOT_EVENTS_QUEUE_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.queue_size),
            include_caller: env::var("IOT_EVENTS_INCLUDE_CALLER")
                .map(|v| v.to_lowercase() == "true" || v == "1")
                .unwrap_or(defaults.include_caller),
        }
    }

    pub fn validate(&self) -> Result<(), BusError> {
        if self.queue_size == 0 {
            return Err(BusError::InvalidConfig("queue_size cannot be 0".into()));
        }
        Ok(())
    }

    /// Write the process-wide settings carried by this configuration.
    pub fn apply_process_settings(&self) {
        set_include_caller(self.include_caller);
    }
}
