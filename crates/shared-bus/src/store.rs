//! # Event Store
//!
//! The contract for storage-backed buses that keep event history. The
//! in-memory [`PubSub`](crate::PubSub) does not implement it.
//!
//! Implementations get the shared pieces from here:
//! - [`HistoryQuery`] validates and evaluates history filters
//! - [`CutoverHandler`] keeps delivery at-most-once while switching from
//!   history to live events

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use shared_types::EntityIdentifiers;

use crate::context::Context;
use crate::definition::names_from_patterns;
use crate::error::BusError;
use crate::event::Event;
use crate::subscriber::{Handler, Subscriber};

/// A subscriber that can also replay history.
#[async_trait]
pub trait Store: Subscriber {
    /// Events carrying `correlation_id`.
    async fn find_related(&self, ctx: &Context, correlation_id: &str) -> Result<Vec<Arc<Event>>, BusError>;

    /// Stored events matching the query, oldest first.
    async fn fetch_history(&self, ctx: &Context, query: &HistoryQuery) -> Result<Vec<Arc<Event>>, BusError>;

    /// Deliver matching history, then live events until `ctx` is done.
    async fn subscribe_with_history(
        &self,
        ctx: &Context,
        query: &HistoryQuery,
        handler: Arc<dyn Handler>,
    ) -> Result<(), BusError>;
}

/// Filter for history operations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoryQuery {
    names: Vec<String>,
    identifiers: Vec<EntityIdentifiers>,
    after: Option<DateTime<Utc>>,
    tail: Option<usize>,
}

impl HistoryQuery {
    pub fn new<I>(identifiers: impl IntoIterator<Item = I>) -> Self
    where
        I: Into<EntityIdentifiers>,
    {
        Self {
            identifiers: identifiers.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Restrict to events whose names match any of `patterns`.
    pub fn with_name_patterns<S: AsRef<str>>(mut self, patterns: &[S]) -> Result<Self, BusError> {
        self.names = names_from_patterns(patterns)?;
        Ok(self)
    }

    /// Only events strictly after `time`.
    pub fn after(mut self, time: DateTime<Utc>) -> Self {
        self.after = Some(time);
        self
    }

    /// At most the last `count` events.
    pub fn tail(mut self, count: usize) -> Self {
        self.tail = Some(count);
        self
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn identifiers(&self) -> &[EntityIdentifiers] {
        &self.identifiers
    }

    pub fn validate(&self) -> Result<(), BusError> {
        if self.identifiers.is_empty() {
            return Err(BusError::InvalidQuery("identifiers are required".into()));
        }
        Ok(())
    }

    /// Whether the event passes the name, identifier and time filters.
    pub fn matches(&self, event: &Event) -> bool {
        if !self.names.is_empty() && !self.names.iter().any(|n| n == event.name()) {
            return false;
        }
        if let Some(after) = self.after {
            if event.time() <= after {
                return false;
            }
        }
        event.identifiers().iter().any(|id| {
            self.identifiers.contains(id)
                || id
                    .parent()
                    .map(|parent| self.identifiers.contains(&parent))
                    .unwrap_or(false)
        })
    }

    /// Apply the filters and the tail to events in chronological order.
    pub fn select(&self, events: impl IntoIterator<Item = Arc<Event>>) -> Vec<Arc<Event>> {
        let mut selected: Vec<_> = events.into_iter().filter(|e| self.matches(e)).collect();
        if let Some(tail) = self.tail {
            let skip = selected.len().saturating_sub(tail);
            selected.drain(..skip);
        }
        selected
    }
}

/// Stable identity of an event across history and live delivery.
///
/// Events carry a unique ID; the name, time and correlation IDs only tell
/// apart decoded events that were encoded without one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EventKey {
    pub unique_id: String,
    pub name: String,
    pub time: DateTime<Utc>,
    pub correlation_ids: Vec<String>,
}

impl From<&Event> for EventKey {
    fn from(event: &Event) -> Self {
        Self {
            unique_id: event.unique_id().to_string(),
            name: event.name().to_string(),
            time: event.time(),
            correlation_ids: event.correlation_ids().to_vec(),
        }
    }
}

#[derive(Default)]
struct Cutover {
    /// Live keys seen before history was delivered, then history keys not
    /// yet seen live.
    seen: HashSet<EventKey>,
    history_delivered: bool,
    /// Time of the newest history event.
    replayed_until: Option<DateTime<Utc>>,
}

/// Delivers history and live events to one handler, each event at most once.
///
/// Subscribe it for live events first, then pass the complete history to
/// [`CutoverHandler::deliver_history`] once: whichever copy of an event
/// arrives first is delivered. Keys are released once live events are newer
/// than the newest history event.
pub struct CutoverHandler {
    query: HistoryQuery,
    inner: Arc<dyn Handler>,
    state: Mutex<Cutover>,
}

impl CutoverHandler {
    pub fn new(query: HistoryQuery, inner: Arc<dyn Handler>) -> Arc<Self> {
        Arc::new(Self {
            query,
            inner,
            state: Mutex::new(Cutover::default()),
        })
    }

    pub fn deliver_history(&self, events: impl IntoIterator<Item = Arc<Event>>) {
        for event in events {
            let first = {
                let mut state = self.state.lock();
                state.replayed_until = state.replayed_until.max(Some(event.time()));
                state.seen.insert(EventKey::from(event.as_ref()))
            };
            if first {
                self.inner.notify(event);
            }
        }

        let mut state = self.state.lock();
        state.history_delivered = true;
        if state.replayed_until.is_none() {
            state.seen.clear();
        }
    }

    fn deliver_live(&self, event: Arc<Event>) {
        let first = {
            let mut state = self.state.lock();
            if !state.history_delivered {
                state.seen.insert(EventKey::from(event.as_ref()))
            } else if state.seen.is_empty() {
                true
            } else {
                let repeated = state.seen.remove(&EventKey::from(event.as_ref()));
                if state.replayed_until.map_or(true, |until| event.time() > until) {
                    state.seen.clear();
                }
                !repeated
            }
        };
        if first {
            self.inner.notify(event);
        }
    }

    /// Keys held for deduplication.
    pub fn pending_keys(&self) -> usize {
        self.state.lock().seen.len()
    }
}

impl Handler for CutoverHandler {
    fn notify(&self, event: Arc<Event>) {
        if self.query.matches(&event) {
            self.deliver_live(event);
        }
    }
}
