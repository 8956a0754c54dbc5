//! Context marshalers.
//!
//! Parts of a [`Context`] that should survive serialization are written into
//! an event's context map by named marshalers. The decoder runs the same
//! marshalers in reverse to rebuild a context for the receiving side.
//!
//! Marshalers register once per process. Entries whose name has no
//! registered marshaler are kept as opaque bytes.

use std::collections::BTreeMap;
use std::sync::{Arc, Once};

use iot_telemetry::{PropagatedContext, TraceContext};
use lazy_static::lazy_static;
use parking_lot::RwLock;

use crate::context::Context;

/// Error returned by a marshaler's `unmarshal`.
pub type MarshalError = Box<dyn std::error::Error + Send + Sync>;

pub trait ContextMarshaler: Send + Sync {
    /// Bytes to store for this context, or `None` if there is nothing to carry.
    fn marshal(&self, ctx: &Context) -> Option<Vec<u8>>;

    /// Restore the stored bytes onto `ctx`.
    fn unmarshal(&self, ctx: Context, data: &[u8]) -> Result<Context, MarshalError>;
}

lazy_static! {
    static ref MARSHALERS: RwLock<BTreeMap<String, Arc<dyn ContextMarshaler>>> =
        RwLock::new(BTreeMap::new());
}

/// Register a marshaler under `name`.
///
/// # Panics
///
/// Panics if a marshaler is already registered under `name`.
pub fn register_context_marshaler(name: &str, marshaler: impl ContextMarshaler + 'static) {
    let mut marshalers = MARSHALERS.write();
    if marshalers.contains_key(name) {
        panic!("context marshaler `{name}` is already registered");
    }
    marshalers.insert(name.to_string(), Arc::new(marshaler));
}

pub(crate) fn marshaler(name: &str) -> Option<Arc<dyn ContextMarshaler>> {
    MARSHALERS.read().get(name).cloned()
}

pub(crate) fn marshalers() -> Vec<(String, Arc<dyn ContextMarshaler>)> {
    MARSHALERS
        .read()
        .iter()
        .map(|(name, m)| (name.clone(), Arc::clone(m)))
        .collect()
}

/// Name of the trace context entry.
pub const TRACE_CONTEXT_KEY: &str = "trace";

struct TraceContextMarshaler;

impl ContextMarshaler for TraceContextMarshaler {
    fn marshal(&self, ctx: &Context) -> Option<Vec<u8>> {
        let propagated = ctx.value::<PropagatedContext>()?;
        if !propagated.is_valid() {
            return None;
        }
        serde_json::to_vec(propagated).ok()
    }

    fn unmarshal(&self, ctx: Context, data: &[u8]) -> Result<Context, MarshalError> {
        let propagated: PropagatedContext = serde_json::from_slice(data)?;
        Ok(ctx.with_value(propagated))
    }
}

static TRACE_MARSHALER: Once = Once::new();

/// Carry the trace context across encode/decode. Safe to call repeatedly.
pub fn register_trace_context_marshaler() {
    TRACE_MARSHALER.call_once(|| register_context_marshaler(TRACE_CONTEXT_KEY, TraceContextMarshaler));
}

/// Attach the trace context of the current span, if there is one.
pub fn context_with_current_trace(ctx: &Context) -> Context {
    let trace = TraceContext::extract_current();
    if !trace.is_valid() {
        return ctx.clone();
    }
    ctx.with_value(trace.to_propagated())
}
