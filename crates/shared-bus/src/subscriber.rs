//! # Event Subscriber
//!
//! The subscription side of the bus: the [`Subscriber`] and [`Handler`]
//! capabilities, and the handler adapters.
//!
//! Handlers are called synchronously on the dispatcher thread and must not
//! block. [`ChannelHandler`] moves events onto a bounded channel for async
//! consumers, dropping (and counting) events when the consumer falls behind.
//!
//! Subscriptions are keyed by handler identity: the same `Arc` must be
//! passed to `unsubscribe` as was passed to `subscribe`.

use std::sync::Arc;
use std::time::Duration;

use iot_telemetry::{metric_inc, EVENTS_CHANNEL_DROPPED};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::debug;

use crate::context::Context;
use crate::error::BusError;
use crate::event::Event;

/// Receives events.
pub trait Handler: Send + Sync {
    fn notify(&self, event: Arc<Event>);
}

/// Registers handlers by event name pattern.
pub trait Subscriber: Send + Sync {
    /// Subscribe `handler` to events whose name matches `pattern`.
    /// Subscribing the same pair twice has no effect.
    fn subscribe(&self, pattern: &str, handler: Arc<dyn Handler>) -> Result<(), BusError>;

    /// Remove the `(pattern, handler)` pair. Events already queued may still
    /// be delivered.
    fn unsubscribe(&self, pattern: &str, handler: Arc<dyn Handler>);
}

/// Whether two handles refer to the same handler.
pub fn same_handler(a: &Arc<dyn Handler>, b: &Arc<dyn Handler>) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}

/// Handler that calls a function.
pub struct FuncHandler<F> {
    f: F,
}

impl<F> FuncHandler<F>
where
    F: Fn(Arc<Event>) + Send + Sync + 'static,
{
    pub fn new(f: F) -> Arc<Self> {
        Arc::new(Self { f })
    }
}

impl<F> Handler for FuncHandler<F>
where
    F: Fn(Arc<Event>) + Send + Sync,
{
    fn notify(&self, event: Arc<Event>) {
        (self.f)(event)
    }
}

/// Handler that forwards events to a bounded channel.
pub struct ChannelHandler {
    sender: mpsc::Sender<Arc<Event>>,
}

impl ChannelHandler {
    /// Create a handler and the receiving end of its channel.
    pub fn new(capacity: usize) -> (Arc<Self>, EventReceiver) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Arc::new(Self { sender }), EventReceiver { receiver })
    }
}

impl Handler for ChannelHandler {
    fn notify(&self, event: Arc<Event>) {
        match self.sender.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                metric_inc!(EVENTS_CHANNEL_DROPPED, &[event.name()]);
                debug!(
                    name = %event.name(),
                    correlation_ids = ?event.correlation_ids(),
                    "Event dropped (channel full)"
                );
            }
            Err(TrySendError::Closed(event)) => {
                debug!(name = %event.name(), "Event dropped (receiver closed)");
            }
        }
    }
}

/// Receiving end of a [`ChannelHandler`].
pub struct EventReceiver {
    receiver: mpsc::Receiver<Arc<Event>>,
}

impl EventReceiver {
    /// The next event, or `None` once every handler is dropped.
    pub async fn recv(&mut self) -> Option<Arc<Event>> {
        self.receiver.recv().await
    }

    /// The next event if one is already queued.
    pub fn try_recv(&mut self) -> Option<Arc<Event>> {
        self.receiver.try_recv().ok()
    }

    /// The next event, or `None` after `timeout`.
    pub async fn receive_with_timeout(&mut self, timeout: Duration) -> Option<Arc<Event>> {
        tokio::time::timeout(timeout, self.receiver.recv())
            .await
            .ok()
            .flatten()
    }

    /// The next event, or `None` once `ctx` is done.
    pub async fn receive_with_context(&mut self, ctx: &Context) -> Option<Arc<Event>> {
        if ctx.is_done() {
            return None;
        }
        tokio::select! {
            event = self.receiver.recv() => event,
            _ = ctx.done() => None,
        }
    }
}

/// Handler that stops delivering once its context is done.
///
/// The dispatcher is not told; unsubscribe the handler explicitly.
pub struct ContextHandler {
    ctx: Context,
    inner: Arc<dyn Handler>,
}

impl ContextHandler {
    pub fn new(ctx: Context, inner: Arc<dyn Handler>) -> Arc<Self> {
        Arc::new(Self { ctx, inner })
    }
}

impl Handler for ContextHandler {
    fn notify(&self, event: Arc<Event>) {
        if self.ctx.is_done() {
            return;
        }
        self.inner.notify(event)
    }
}
