//! # Dispatcher
//!
//! [`PubSub`] is the in-process event bus. Published events go into one
//! bounded FIFO queue; a dedicated thread drains it and calls every handler
//! whose pattern matches the event name, in subscription order.
//!
//! - `publish` blocks only while the queue is full
//! - a single consumer keeps per-producer order for every handler
//! - a panicking handler is logged and counted; dispatch continues

use std::panic::{catch_unwind, AssertUnwindSafe, Location};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{bounded, Receiver, Sender};
use iot_telemetry::{
    metric_dec, metric_inc, HistogramTimer, EVENTS_DELIVERY_DURATION, EVENTS_HANDLER_PANICS,
    EVENTS_PUBLISHED, EVENTS_SUBSCRIPTIONS,
};
use parking_lot::RwLock;
use tracing::{debug, debug_span, error, warn, Span};

use crate::config::{include_caller, BusConfig};
use crate::error::BusError;
use crate::event::Event;
use crate::pattern::Pattern;
use crate::subscriber::{same_handler, Handler, Subscriber};

/// Path segment after which caller locations are reported.
const CALLER_ANCHOR: &str = "crates/";

/// Publishing side of the bus.
pub trait Publisher: Send + Sync {
    /// Publish an event. Never fails; may block while the queue is full.
    #[track_caller]
    fn publish(&self, event: Event);
}

struct Subscription {
    pattern: Pattern,
    handler: Arc<dyn Handler>,
}

struct Queued {
    event: Arc<Event>,
    span: Span,
}

/// In-memory publish/subscribe dispatcher.
pub struct PubSub {
    sender: Sender<Queued>,
    subscriptions: Arc<RwLock<Vec<Subscription>>>,
    events_published: AtomicU64,
    capacity: usize,
}

impl PubSub {
    /// Create a dispatcher with the default queue size.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(crate::DEFAULT_QUEUE_SIZE)
    }

    /// Create a dispatcher from configuration.
    pub fn from_config(config: &BusConfig) -> Result<Self, BusError> {
        config.validate()?;
        Ok(Self::with_capacity(config.queue_size))
    }

    /// Create a dispatcher whose queue holds `capacity` events.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, receiver) = bounded(capacity);
        let subscriptions = Arc::new(RwLock::new(Vec::new()));

        let worker_subscriptions = Arc::clone(&subscriptions);
        if let Err(e) = thread::Builder::new()
            .name("event-dispatcher".into())
            .spawn(move || dispatch_loop(receiver, worker_subscriptions))
        {
            error!(error = %e, "Failed to start event dispatcher");
        }

        Self {
            sender,
            subscriptions,
            events_published: AtomicU64::new(0),
            capacity,
        }
    }

    /// Queue capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of `(pattern, handler)` pairs.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.read().len()
    }

    /// Total events published through this dispatcher.
    #[must_use]
    pub fn events_published(&self) -> u64 {
        self.events_published.load(Ordering::Relaxed)
    }
}

impl Default for PubSub {
    fn default() -> Self {
        Self::new()
    }
}

/// Format a caller location as a path relative to the crates directory.
fn caller_location(location: &Location<'_>) -> String {
    let file = location.file().replace('\\', "/");
    let relative = match file.rfind(CALLER_ANCHOR) {
        Some(idx) => &file[idx + CALLER_ANCHOR.len()..],
        None => file.as_str(),
    };
    format!("{}:{}", relative, location.line())
}

impl Publisher for PubSub {
    #[track_caller]
    fn publish(&self, mut event: Event) {
        if include_caller() && event.caller().is_none() {
            event.set_caller(caller_location(Location::caller()));
        }

        self.events_published.fetch_add(1, Ordering::Relaxed);
        metric_inc!(EVENTS_PUBLISHED, &[event.name()]);

        let queued = Queued {
            event: Arc::new(event),
            span: Span::current(),
        };
        if let Err(e) = self.sender.send(queued) {
            warn!(name = %e.0.event.name(), "Event dropped (dispatcher stopped)");
        }
    }
}

impl Subscriber for PubSub {
    fn subscribe(&self, pattern: &str, handler: Arc<dyn Handler>) -> Result<(), BusError> {
        let pattern = Pattern::parse(pattern)?;
        let mut subscriptions = self.subscriptions.write();
        if subscriptions
            .iter()
            .any(|s| s.pattern == pattern && same_handler(&s.handler, &handler))
        {
            return Ok(());
        }
        metric_inc!(EVENTS_SUBSCRIPTIONS, &[pattern.as_str()]);
        debug!(pattern = %pattern, "New subscription created");
        subscriptions.push(Subscription { pattern, handler });
        Ok(())
    }

    fn unsubscribe(&self, pattern: &str, handler: Arc<dyn Handler>) {
        let mut subscriptions = self.subscriptions.write();
        let before = subscriptions.len();
        subscriptions.retain(|s| !(s.pattern.as_str() == pattern && same_handler(&s.handler, &handler)));
        if subscriptions.len() < before {
            metric_dec!(EVENTS_SUBSCRIPTIONS, &[pattern]);
            debug!(pattern, "Subscription removed");
        }
    }
}

fn dispatch_loop(receiver: Receiver<Queued>, subscriptions: Arc<RwLock<Vec<Subscription>>>) {
    for Queued { event, span } in receiver.iter() {
        let _timer = HistogramTimer::new(&EVENTS_DELIVERY_DURATION);
        let deliver = debug_span!(parent: &span, "deliver_event", name = %event.name());
        let _entered = deliver.enter();

        let handlers: Vec<Arc<dyn Handler>> = subscriptions
            .read()
            .iter()
            .filter(|s| s.pattern.matches(event.name()))
            .map(|s| Arc::clone(&s.handler))
            .collect();

        for handler in handlers {
            let delivery = catch_unwind(AssertUnwindSafe(|| handler.notify(Arc::clone(&event))));
            if let Err(panic) = delivery {
                metric_inc!(EVENTS_HANDLER_PANICS, &[event.name()]);
                error!(
                    name = %event.name(),
                    correlation_ids = ?event.correlation_ids(),
                    panic = panic_message(panic.as_ref()),
                    "Event handler panicked"
                );
            }
        }
    }
    debug!("Event dispatcher stopped");
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}
