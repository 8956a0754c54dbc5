//! # Shared Bus - In-Process Event Bus
//!
//! Producers emit named, correlated events; consumers subscribe by name
//! pattern and by the identifiers of the entities an event concerns.
//!
//! ## Flow
//!
//! ```text
//! ┌──────────────┐  define()   ┌──────────────┐
//! │  Component   │ ──────────▶ │   Builder    │
//! │              │             └──────┬───────┘
//! │              │  publish()         │ new_event(ctx)
//! │              │ ◀──────────────────┘
//! └──────┬───────┘
//!        ▼
//! ┌──────────────┐  pattern   ┌──────────────────┐  identifiers  ┌─────────┐
//! │    PubSub    │ ─────────▶ │ IdentifierFilter │ ────────────▶ │ Handler │
//! │ (queue + 1   │            └──────────────────┘               └─────────┘
//! │  consumer)   │ ─────────────────────────────────────────────▶ Handler
//! └──────────────┘
//! ```
//!
//! ## Guarantees
//!
//! - **Correlation:** every event snapshots the sorted, deduplicated
//!   correlation IDs of the context it was created from
//! - **Ordering:** one producer, one handler: delivery order is publish order
//! - **Isolation:** a panicking handler does not stop dispatch
//! - **Backpressure:** `publish` blocks only while the queue is full; channel
//!   handlers drop and count instead of blocking

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod codec;
pub mod config;
pub mod context;
pub mod correlation;
pub mod definition;
pub mod error;
pub mod event;
pub mod filter;
pub mod marshaler;
pub mod options;
pub mod pattern;
pub mod payload;
pub mod publisher;
pub mod rpc;
pub mod store;
pub mod subscriber;

// Re-export main types
pub use codec::{decode, encode};
pub use config::{include_caller, set_include_caller, BusConfig};
pub use context::{CancelHandle, Context};
pub use correlation::{
    context_with_correlation_id, correlation_class, correlation_ids_from_context,
    correlation_prefixes, new_correlation_id, register_correlation_prefix, CorrelationPrefix,
};
pub use definition::{
    define, definitions, descriptions, lookup, names_from_patterns, try_define, Builder,
    Definition,
};
pub use error::{BusError, CodecError};
pub use event::{local_origin, Authentication, Event};
pub use filter::{IdentifierFilter, VisibilityFilter};
pub use marshaler::{
    context_with_current_trace, register_context_marshaler, register_trace_context_marshaler,
    ContextMarshaler, MarshalError,
};
pub use options::{
    with_auth_from_context, with_client_info_from_context, with_data, with_data_type,
    with_error_data_type, with_identifiers, with_propagate_to_parent,
    with_updated_fields_data_type, with_visibility, EventOption,
};
pub use pattern::{is_valid_name, Pattern};
pub use payload::{register_message_type, DetailedError, ErrorDetails, Message, Payload};
pub use publisher::{PubSub, Publisher};
pub use rpc::{CorrelationLayer, RequestMetadata};
pub use store::{CutoverHandler, EventKey, HistoryQuery, Store};
pub use subscriber::{ChannelHandler, ContextHandler, EventReceiver, FuncHandler, Handler, Subscriber};

/// Default capacity of the dispatcher queue.
pub const DEFAULT_QUEUE_SIZE: usize = 64;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_queue_size() {
        assert_eq!(DEFAULT_QUEUE_SIZE, 64);
        assert_eq!(PubSub::new().capacity(), DEFAULT_QUEUE_SIZE);
    }
}
