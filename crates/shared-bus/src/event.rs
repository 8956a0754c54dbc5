//! # Events
//!
//! An [`Event`] is an immutable record of something that happened: its
//! name, when and where it was created, which entities it concerns, who may
//! see it, and an optional payload.
//!
//! Events are created through a definition's [`Builder`](crate::Builder) or
//! [`Event::new`], and are shared with handlers as `Arc<Event>`.

use std::collections::BTreeMap;
use std::fs;

use chrono::{DateTime, Timelike, Utc};
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use shared_types::{EntityIdentifiers, Rights};

use crate::context::Context;
use crate::correlation::{context_with_correlation_id, merge_sorted, new_correlation_id, normalize};
use crate::definition::{builder_for, lookup, Definition};
use crate::error::BusError;
use crate::options::with_identifiers;
use crate::payload::Payload;

lazy_static! {
    static ref ORIGIN: String = resolve_origin();
}

fn resolve_origin() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .or_else(|| fs::read_to_string("/proc/sys/kernel/hostname").ok())
        .or_else(|| fs::read_to_string("/etc/hostname").ok())
        .map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}

/// The host name recorded as the origin of locally created events.
pub fn local_origin() -> &'static str {
    &ORIGIN
}

/// Current time truncated to millisecond precision.
pub(crate) fn now_millis() -> DateTime<Utc> {
    truncate_millis(Utc::now())
}

pub(crate) fn truncate_millis(t: DateTime<Utc>) -> DateTime<Utc> {
    let nanos = t.nanosecond() / 1_000_000 * 1_000_000;
    t.with_nanosecond(nanos).unwrap_or(t)
}

/// Authentication of the caller that caused the event.
///
/// Never holds the secret part of a token.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authentication {
    /// Authorization scheme, e.g. `Bearer`.
    #[serde(rename = "type", default, skip_serializing_if = "String::is_empty")]
    pub auth_type: String,
    /// `APIKey`, `AccessToken` or `SessionToken`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub token_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub token_id: String,
}

impl Authentication {
    pub fn is_empty(&self) -> bool {
        self.auth_type.is_empty() && self.token_type.is_empty() && self.token_id.is_empty()
    }
}

/// An event.
#[derive(Debug, Clone)]
pub struct Event {
    pub(crate) unique_id: String,
    pub(crate) name: String,
    pub(crate) time: DateTime<Utc>,
    pub(crate) origin: String,
    pub(crate) correlation_ids: Vec<String>,
    pub(crate) identifiers: Vec<EntityIdentifiers>,
    pub(crate) visibility: Rights,
    pub(crate) authentication: Option<Authentication>,
    pub(crate) remote_ip: Option<String>,
    pub(crate) user_agent: Option<String>,
    pub(crate) caller: Option<String>,
    pub(crate) data: Option<Payload>,
    pub(crate) context_map: BTreeMap<String, Vec<u8>>,
    pub(crate) unknown_fields: Map<String, Value>,
    pub(crate) ctx: Context,
}

impl Event {
    /// Create an event of a defined name.
    ///
    /// Equivalent to building the event with the [`Builder`](crate::Builder)
    /// returned by `define`, then adding `identifiers` and `data`. The event
    /// snapshots the context's correlation IDs, plus any carried by `data`.
    pub fn new(
        ctx: &Context,
        name: &str,
        identifiers: impl IntoIterator<Item = EntityIdentifiers>,
        data: Option<Payload>,
    ) -> Result<Self, BusError> {
        let builder = builder_for(name).ok_or_else(|| BusError::UnknownEventName(name.to_string()))?;
        let mut event = builder.new_event(ctx, [with_identifiers(identifiers)]);
        if let Some(data) = data {
            event.set_data(data);
        }
        Ok(event)
    }

    pub(crate) fn from_definition(ctx: &Context, definition: &Definition) -> Self {
        Self {
            unique_id: new_correlation_id(),
            name: definition.name().to_string(),
            time: now_millis(),
            origin: local_origin().to_string(),
            correlation_ids: ctx.correlation_ids().to_vec(),
            identifiers: Vec::new(),
            visibility: definition.default_visibility().clone(),
            authentication: None,
            remote_ip: None,
            user_agent: None,
            caller: None,
            data: None,
            context_map: BTreeMap::new(),
            unknown_fields: Map::new(),
            ctx: ctx.clone(),
        }
    }

    /// ULID minted when the event was created. Empty for decoded events
    /// that were encoded without one.
    pub fn unique_id(&self) -> &str {
        &self.unique_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn time(&self) -> DateTime<Utc> {
        self.time
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Sorted, deduplicated correlation IDs.
    pub fn correlation_ids(&self) -> &[String] {
        &self.correlation_ids
    }

    pub fn identifiers(&self) -> &[EntityIdentifiers] {
        &self.identifiers
    }

    pub fn visibility(&self) -> &Rights {
        &self.visibility
    }

    pub fn authentication(&self) -> Option<&Authentication> {
        self.authentication.as_ref()
    }

    pub fn remote_ip(&self) -> Option<&str> {
        self.remote_ip.as_deref()
    }

    pub fn user_agent(&self) -> Option<&str> {
        self.user_agent.as_deref()
    }

    /// `file:line` of the publishing call site, when caller capture is on.
    pub fn caller(&self) -> Option<&str> {
        self.caller.as_deref()
    }

    pub fn data(&self) -> Option<&Payload> {
        self.data.as_ref()
    }

    /// Serialized context entries, keyed by marshaler name.
    pub fn context_map(&self) -> &BTreeMap<String, Vec<u8>> {
        &self.context_map
    }

    /// The context the event was created with, or the context rebuilt by
    /// the decoder.
    pub fn context(&self) -> &Context {
        &self.ctx
    }

    /// Identifiers under which the event can be observed: its own, plus
    /// their parents when the definition propagates to parents.
    ///
    /// Informational: [`IdentifierFilter`](crate::IdentifierFilter) and
    /// [`HistoryQuery`](crate::HistoryQuery) escalate end devices to their
    /// application for every event, whatever the definition says.
    pub fn observable_identifiers(&self) -> Vec<EntityIdentifiers> {
        let propagate = lookup(&self.name)
            .map(|d| d.propagate_to_parent())
            .unwrap_or(false);
        let mut ids = self.identifiers.clone();
        if propagate {
            for parent in self.identifiers.iter().filter_map(EntityIdentifiers::parent) {
                if !ids.contains(&parent) {
                    ids.push(parent);
                }
            }
        }
        ids
    }

    pub(crate) fn set_data(&mut self, data: Payload) {
        if data.is_null() {
            self.data = None;
            return;
        }
        let ids = data.correlation_ids();
        if !ids.is_empty() {
            self.correlation_ids = merge_sorted(&self.correlation_ids, &normalize(&ids));
            self.ctx = context_with_correlation_id(&self.ctx, &ids);
        }
        self.data = Some(data);
    }

    pub(crate) fn set_caller(&mut self, caller: String) {
        self.caller = Some(caller);
    }
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.unique_id == other.unique_id
            && self.name == other.name
            && self.time == other.time
            && self.origin == other.origin
            && self.correlation_ids == other.correlation_ids
            && self.identifiers == other.identifiers
            && self.visibility == other.visibility
            && self.authentication == other.authentication
            && self.remote_ip == other.remote_ip
            && self.user_agent == other.user_agent
            && self.caller == other.caller
            && self.data == other.data
            && self.context_map == other.context_map
            && self.unknown_fields == other.unknown_fields
    }
}
