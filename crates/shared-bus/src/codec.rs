//! # Event Codec
//!
//! JSON wire form of an [`Event`]:
//!
//! ```json
//! {
//!   "unique_id": "01HWXK3V5J8Q2Z7M4N6P9R0S1T",
//!   "name": "gs.up.receive",
//!   "time": "2024-05-01T12:00:00.123Z",
//!   "identifiers": [{"gateway_ids": {"gateway_id": "gtw-1"}}],
//!   "data": {"@type": "value", "value": {"rssi": -42}},
//!   "correlation_ids": ["rpc:/svc/Method:01HX..."],
//!   "origin": "host-1",
//!   "context": {"trace": "eyJ0cmFjZV9pZCI6..."},
//!   "visibility": ["RIGHT_GATEWAY_INFO"]
//! }
//! ```
//!
//! Context entries are base64. Fields this version does not know are kept
//! and written back unchanged.

use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use shared_types::{EntityIdentifiers, Rights};

use crate::context::Context;
use crate::correlation::{context_with_correlation_id, normalize};
use crate::error::CodecError;
use crate::event::{truncate_millis, Authentication, Event};
use crate::marshaler::{marshaler, marshalers};
use crate::pattern::is_valid_name;
use crate::payload::{is_message_type_registered, ErrorDetails, Payload};

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "@type", rename_all = "snake_case")]
enum WirePayload {
    Message { type_url: String, value: String },
    Error(ErrorDetails),
    Value { value: Value },
}

#[derive(Debug, Serialize, Deserialize)]
struct WireEvent {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    unique_id: String,
    name: String,
    #[serde(with = "wire_time")]
    time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    identifiers: Vec<EntityIdentifiers>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<WirePayload>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    correlation_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    origin: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    context: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Rights::is_empty")]
    visibility: Rights,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    authentication: Option<Authentication>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    remote_ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    user_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    caller: Option<String>,
    #[serde(flatten)]
    unknown: Map<String, Value>,
}

mod wire_time {
    use super::*;

    pub fn serialize<S: Serializer>(time: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&time.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let s = String::deserialize(d)?;
        DateTime::parse_from_rfc3339(&s)
            .map(|t| t.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

fn encode_payload(payload: &Payload) -> Result<WirePayload, CodecError> {
    Ok(match payload {
        Payload::Message { type_url, value } if is_message_type_registered(type_url) => {
            WirePayload::Message {
                type_url: type_url.clone(),
                value: BASE64.encode(value),
            }
        }
        // Unregistered messages travel as their structural form.
        Payload::Message { value, .. } => WirePayload::Value {
            value: serde_json::from_slice(value)
                .map_err(|e| CodecError::PayloadEncoding(e.to_string()))?,
        },
        Payload::Error(details) => WirePayload::Error(details.clone()),
        Payload::Value(value) => WirePayload::Value {
            value: value.clone(),
        },
    })
}

fn decode_payload(payload: WirePayload) -> Result<Payload, CodecError> {
    Ok(match payload {
        WirePayload::Message { type_url, value } => {
            if !is_message_type_registered(&type_url) {
                return Err(CodecError::UnknownPayloadType(type_url));
            }
            let value = BASE64
                .decode(value)
                .map_err(|e| CodecError::MalformedEvent(format!("payload value: {e}")))?;
            Payload::Message { type_url, value }
        }
        WirePayload::Error(details) => Payload::Error(details),
        WirePayload::Value { value } => Payload::Value(value),
    })
}

/// Serialize an event.
///
/// The context map is the event's stored entries overlaid with the output of
/// every registered marshaler for the event's context.
pub fn encode(event: &Event) -> Result<Vec<u8>, CodecError> {
    let mut context: BTreeMap<String, String> = event
        .context_map
        .iter()
        .map(|(name, bytes)| (name.clone(), BASE64.encode(bytes)))
        .collect();
    for (name, m) in marshalers() {
        if let Some(bytes) = m.marshal(&event.ctx) {
            context.insert(name, BASE64.encode(bytes));
        }
    }

    let wire = WireEvent {
        unique_id: event.unique_id.clone(),
        name: event.name.clone(),
        time: event.time,
        identifiers: event.identifiers.clone(),
        data: event.data.as_ref().map(encode_payload).transpose()?,
        correlation_ids: event.correlation_ids.clone(),
        origin: event.origin.clone(),
        context,
        visibility: event.visibility.clone(),
        authentication: event.authentication.clone().filter(|a| !a.is_empty()),
        remote_ip: event.remote_ip.clone(),
        user_agent: event.user_agent.clone(),
        caller: event.caller.clone(),
        unknown: event.unknown_fields.clone(),
    };
    Ok(serde_json::to_vec(&wire)?)
}

/// Deserialize an event.
///
/// The event's context starts from the background context; every context
/// entry with a registered marshaler is applied to it, and the event's
/// correlation IDs are attached.
pub fn decode(bytes: &[u8]) -> Result<Event, CodecError> {
    let wire: WireEvent = serde_json::from_slice(bytes)?;
    if !is_valid_name(&wire.name) {
        return Err(CodecError::MalformedEvent(format!(
            "invalid event name `{}`",
            wire.name
        )));
    }

    let mut context_map = BTreeMap::new();
    for (name, encoded) in wire.context {
        let bytes = BASE64
            .decode(encoded)
            .map_err(|e| CodecError::MalformedEvent(format!("context `{name}`: {e}")))?;
        context_map.insert(name, bytes);
    }

    let mut ctx = Context::background();
    for (name, bytes) in &context_map {
        if let Some(m) = marshaler(name) {
            ctx = m
                .unmarshal(ctx, bytes)
                .map_err(|e| CodecError::ContextUnmarshal {
                    name: name.clone(),
                    reason: e.to_string(),
                })?;
        }
    }
    let correlation_ids = normalize(&wire.correlation_ids);
    let ctx = context_with_correlation_id(&ctx, &correlation_ids);

    Ok(Event {
        unique_id: wire.unique_id,
        name: wire.name,
        time: truncate_millis(wire.time),
        origin: wire.origin,
        correlation_ids,
        identifiers: wire.identifiers,
        visibility: wire.visibility,
        authentication: wire.authentication,
        remote_ip: wire.remote_ip,
        user_agent: wire.user_agent,
        caller: wire.caller,
        data: wire.data.map(decode_payload).transpose()?,
        context_map,
        unknown_fields: wire.unknown,
        ctx,
    })
}
