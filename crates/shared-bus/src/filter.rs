//! # Filters
//!
//! Handlers that route events onward based on what the event concerns.
//!
//! [`IdentifierFilter`] keeps one index per entity type, mapping an entity's
//! unique ID to the handlers interested in it. Events about an end device are
//! also delivered to handlers of the device's application. Each handler
//! receives an event at most once, however many of its identifiers match.
//!
//! [`VisibilityFilter`] only passes events whose visibility the subscriber's
//! rights cover.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use shared_types::{EntityIdentifiers, EntityType, Rights};
use tracing::trace;

use crate::context::Context;
use crate::event::Event;
use crate::subscriber::{same_handler, Handler};

type Index = HashMap<String, Vec<Arc<dyn Handler>>>;

/// Handler that fans events out by entity identifiers.
#[derive(Default)]
pub struct IdentifierFilter {
    indices: RwLock<HashMap<EntityType, Index>>,
}

impl IdentifierFilter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Deliver events concerning any of `ids` to `handler`.
    pub fn subscribe(&self, ctx: &Context, ids: &[EntityIdentifiers], handler: Arc<dyn Handler>) {
        let mut indices = self.indices.write();
        for id in ids {
            let handlers = indices
                .entry(id.entity_type())
                .or_default()
                .entry(id.unique_id())
                .or_default();
            if !handlers.iter().any(|h| same_handler(h, &handler)) {
                handlers.push(Arc::clone(&handler));
            }
        }
        trace!(ids = ids.len(), correlation_ids = ?ctx.correlation_ids(), "Identifier subscription added");
    }

    pub fn unsubscribe(&self, ctx: &Context, ids: &[EntityIdentifiers], handler: Arc<dyn Handler>) {
        let mut indices = self.indices.write();
        for id in ids {
            let entity_type = id.entity_type();
            let Some(index) = indices.get_mut(&entity_type) else {
                continue;
            };
            let key = id.unique_id();
            if let Some(handlers) = index.get_mut(&key) {
                handlers.retain(|h| !same_handler(h, &handler));
                if handlers.is_empty() {
                    index.remove(&key);
                }
            }
            if index.is_empty() {
                indices.remove(&entity_type);
            }
        }
        trace!(ids = ids.len(), correlation_ids = ?ctx.correlation_ids(), "Identifier subscription removed");
    }

    /// Number of entities with at least one handler.
    pub fn entity_count(&self) -> usize {
        self.indices.read().values().map(HashMap::len).sum()
    }

    fn matches(&self, event: &Event) -> Vec<Arc<dyn Handler>> {
        let indices = self.indices.read();
        let mut matched: Vec<Arc<dyn Handler>> = Vec::new();
        let mut collect = |id: &EntityIdentifiers| {
            let handlers = indices
                .get(&id.entity_type())
                .and_then(|index| index.get(&id.unique_id()));
            for handler in handlers.into_iter().flatten() {
                if !matched.iter().any(|m| same_handler(m, handler)) {
                    matched.push(Arc::clone(handler));
                }
            }
        };
        for id in event.identifiers() {
            collect(id);
            if let EntityIdentifiers::EndDevice(_) = id {
                if let Some(application) = id.parent() {
                    collect(&application);
                }
            }
        }
        matched
    }
}

impl Handler for IdentifierFilter {
    fn notify(&self, event: Arc<Event>) {
        // The read lock is released before delivery.
        let handlers = self.matches(&event);
        for handler in handlers {
            handler.notify(Arc::clone(&event));
        }
    }
}

/// Handler that passes only events visible with the held rights.
///
/// Events without visibility requirements are public.
pub struct VisibilityFilter {
    rights: Rights,
    inner: Arc<dyn Handler>,
}

impl VisibilityFilter {
    pub fn new(rights: impl Into<Rights>, inner: Arc<dyn Handler>) -> Arc<Self> {
        Arc::new(Self {
            rights: rights.into(),
            inner,
        })
    }
}

impl Handler for VisibilityFilter {
    fn notify(&self, event: Arc<Event>) {
        if self.rights.includes_all(event.visibility()) {
            self.inner.notify(event);
        }
    }
}
