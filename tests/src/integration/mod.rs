//! # Integration Tests
//!
//! Every test defines its own event names: definitions, correlation prefixes
//! and metric series are process-wide, so tests assert metric deltas only.

pub mod producers;
pub mod properties;
pub mod scenarios;

use std::sync::Arc;
use std::time::Duration;

use shared_bus::{Event, EventReceiver};

/// Time allowed for the dispatcher to drain its queue.
pub const SETTLE: Duration = Duration::from_millis(100);

/// Receive events until none arrives within [`SETTLE`].
pub async fn collect(rx: &mut EventReceiver) -> Vec<Arc<Event>> {
    let mut events = Vec::new();
    while let Some(event) = rx.receive_with_timeout(SETTLE).await {
        events.push(event);
    }
    events
}

/// Names of `events`, in order.
pub fn names(events: &[Arc<Event>]) -> Vec<String> {
    events.iter().map(|e| e.name().to_string()).collect()
}
