//! # Request Context
//!
//! An immutable, cheaply cloneable bag that travels with every operation:
//!
//! - the sorted, deduplicated correlation IDs
//! - typed values keyed by their Rust type (request metadata, trace context)
//! - cancellation signals and deadlines
//!
//! Every `with_*` method returns a new context; the receiver is never
//! modified, so a context may be shared freely across threads and tasks.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::future::{select_all, BoxFuture, FutureExt};
use tokio::sync::watch;
use tokio::time::Instant;

type AnyValue = Arc<dyn Any + Send + Sync>;

#[derive(Clone)]
enum Signal {
    Cancel(watch::Receiver<bool>),
    Deadline(Instant),
}

impl Signal {
    fn fired(&self) -> bool {
        match self {
            // A dropped handle counts as cancelled.
            Signal::Cancel(rx) => *rx.borrow() || rx.has_changed().is_err(),
            Signal::Deadline(at) => Instant::now() >= *at,
        }
    }

    fn wait(&self) -> BoxFuture<'static, ()> {
        match self {
            Signal::Cancel(rx) => {
                let mut rx = rx.clone();
                async move {
                    loop {
                        let cancelled = *rx.borrow_and_update();
                        if cancelled || rx.changed().await.is_err() {
                            return;
                        }
                    }
                }
                .boxed()
            }
            Signal::Deadline(at) => tokio::time::sleep_until(*at).boxed(),
        }
    }
}

/// Request-scoped context.
#[derive(Clone, Default)]
pub struct Context {
    correlation_ids: Arc<[String]>,
    values: Arc<HashMap<TypeId, AnyValue>>,
    signals: Arc<[Signal]>,
}

impl Context {
    /// An empty context that is never done.
    pub fn background() -> Self {
        Self::default()
    }

    /// Sorted, deduplicated correlation IDs carried by this context.
    pub fn correlation_ids(&self) -> &[String] {
        &self.correlation_ids
    }

    /// Replace the correlation IDs. Callers guarantee `ids` is sorted and
    /// free of duplicates.
    pub(crate) fn with_sorted_correlation_ids(&self, ids: Vec<String>) -> Self {
        Self {
            correlation_ids: ids.into(),
            values: Arc::clone(&self.values),
            signals: Arc::clone(&self.signals),
        }
    }

    /// Attach a value. A previous value of the same type is shadowed.
    pub fn with_value<T: Any + Send + Sync>(&self, value: T) -> Self {
        let mut values = (*self.values).clone();
        values.insert(TypeId::of::<T>(), Arc::new(value));
        Self {
            correlation_ids: Arc::clone(&self.correlation_ids),
            values: Arc::new(values),
            signals: Arc::clone(&self.signals),
        }
    }

    /// Look up a value by type.
    pub fn value<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.values
            .get(&TypeId::of::<T>())
            .and_then(|v| v.downcast_ref::<T>())
    }

    fn with_signal(&self, signal: Signal) -> Self {
        let mut signals = self.signals.to_vec();
        signals.push(signal);
        Self {
            correlation_ids: Arc::clone(&self.correlation_ids),
            values: Arc::clone(&self.values),
            signals: signals.into(),
        }
    }

    /// Derive a context that is done once the returned handle is cancelled
    /// or dropped, or once this context is done.
    pub fn with_cancel(&self) -> (Self, CancelHandle) {
        let (tx, rx) = watch::channel(false);
        (self.with_signal(Signal::Cancel(rx)), CancelHandle { tx })
    }

    /// Derive a context that is done after `timeout`.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_signal(Signal::Deadline(Instant::now() + timeout))
    }

    /// The earliest deadline on this context, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.signals
            .iter()
            .filter_map(|s| match s {
                Signal::Deadline(at) => Some(*at),
                Signal::Cancel(_) => None,
            })
            .min()
    }

    /// Whether this context was cancelled or its deadline passed.
    pub fn is_done(&self) -> bool {
        self.signals.iter().any(Signal::fired)
    }

    /// Resolve once the context is done. Never resolves for a background
    /// context.
    pub async fn done(&self) {
        if self.signals.is_empty() {
            return futures::future::pending().await;
        }
        let waits: Vec<_> = self.signals.iter().map(Signal::wait).collect();
        select_all(waits).await;
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("correlation_ids", &self.correlation_ids)
            .field("values", &self.values.len())
            .field("done", &self.is_done())
            .finish()
    }
}

/// Cancels the context it was created with. Dropping the handle also
/// cancels.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}
