//! Event payloads.
//!
//! A payload is one of:
//! - a typed [`Message`], serialized to bytes and tagged with its type URL
//! - structured error details ([`ErrorDetails`])
//! - a generic JSON value
//!
//! Message types must be registered before events carrying them can be
//! decoded.

use std::collections::BTreeSet;
use std::error::Error as StdError;
use std::fmt;

use lazy_static::lazy_static;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::CodecError;

lazy_static! {
    static ref MESSAGE_TYPES: RwLock<BTreeSet<String>> = RwLock::new(BTreeSet::new());
}

/// A typed payload with a stable type URL.
pub trait Message: Serialize + DeserializeOwned + Send + Sync + 'static {
    const TYPE_URL: &'static str;
}

/// Register `M` so that typed payloads carrying it can be decoded.
///
/// # Panics
///
/// Panics if the type URL is already registered.
pub fn register_message_type<M: Message>() {
    let mut types = MESSAGE_TYPES.write();
    if !types.insert(M::TYPE_URL.to_string()) {
        panic!("message type `{}` is already registered", M::TYPE_URL);
    }
}

pub fn is_message_type_registered(type_url: &str) -> bool {
    MESSAGE_TYPES.read().contains(type_url)
}

/// Structured error details.
///
/// `message_format` may reference attributes as `{name}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub namespace: String,
    pub name: String,
    pub message_format: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub attributes: Map<String, Value>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub correlation_id: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub code: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<Box<ErrorDetails>>,
}

fn is_zero(code: &u32) -> bool {
    *code == 0
}

impl ErrorDetails {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>, message_format: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            message_format: message_format.into(),
            ..Default::default()
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = id.into();
        self
    }

    pub fn with_code(mut self, code: u32) -> Self {
        self.code = code;
        self
    }

    pub fn with_cause(mut self, cause: ErrorDetails) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// The message format with attributes substituted.
    pub fn message(&self) -> String {
        let mut message = self.message_format.clone();
        for (key, value) in &self.attributes {
            let rendered = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            message = message.replace(&format!("{{{key}}}"), &rendered);
        }
        message
    }
}

/// An error that carries [`ErrorDetails`].
#[derive(Debug, Clone, PartialEq)]
pub struct DetailedError(pub ErrorDetails);

impl fmt::Display for DetailedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "error:{}:{} ({})", self.0.namespace, self.0.name, self.0.message())
    }
}

impl StdError for DetailedError {}

/// Event payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Message { type_url: String, value: Vec<u8> },
    Error(ErrorDetails),
    Value(Value),
}

impl Payload {
    /// Serialize a typed message.
    pub fn message<M: Message>(message: &M) -> Result<Self, CodecError> {
        let value =
            serde_json::to_vec(message).map_err(|e| CodecError::PayloadEncoding(e.to_string()))?;
        Ok(Payload::Message {
            type_url: M::TYPE_URL.to_string(),
            value,
        })
    }

    /// Convert an error. Errors carrying details keep them; anything else is
    /// recorded as its display string.
    pub fn from_error(err: &(dyn StdError + 'static)) -> Self {
        match err.downcast_ref::<DetailedError>() {
            Some(detailed) => Payload::Error(detailed.0.clone()),
            None => Payload::Value(Value::String(err.to_string())),
        }
    }

    /// Deserialize the typed message, if this payload holds an `M`.
    pub fn decode_message<M: Message>(&self) -> Result<Option<M>, CodecError> {
        match self {
            Payload::Message { type_url, value } if type_url == M::TYPE_URL => {
                let message = serde_json::from_slice(value)
                    .map_err(|e| CodecError::PayloadEncoding(e.to_string()))?;
                Ok(Some(message))
            }
            _ => Ok(None),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Payload::Value(Value::Null))
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Payload::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_error(&self) -> Option<&ErrorDetails> {
        match self {
            Payload::Error(details) => Some(details),
            _ => None,
        }
    }

    /// Structural JSON view of the payload.
    pub fn to_value(&self) -> Value {
        match self {
            Payload::Message { value, .. } => serde_json::from_slice(value).unwrap_or(Value::Null),
            Payload::Error(details) => serde_json::to_value(details).unwrap_or(Value::Null),
            Payload::Value(v) => v.clone(),
        }
    }

    /// Correlation IDs the payload itself carries: the error's correlation
    /// ID, or a `correlation_ids` string array on an object.
    pub fn correlation_ids(&self) -> Vec<String> {
        match self {
            Payload::Error(details) => {
                let mut ids = Vec::new();
                let mut current = Some(details);
                while let Some(d) = current {
                    if !d.correlation_id.is_empty() {
                        ids.push(d.correlation_id.clone());
                    }
                    current = d.cause.as_deref();
                }
                ids
            }
            Payload::Value(v) => ids_from_value(v),
            Payload::Message { value, .. } => serde_json::from_slice::<Value>(value)
                .map(|v| ids_from_value(&v))
                .unwrap_or_default(),
        }
    }
}

fn ids_from_value(value: &Value) -> Vec<String> {
    value
        .get("correlation_ids")
        .and_then(Value::as_array)
        .map(|ids| {
            ids.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Payload::Value(value)
    }
}

impl From<String> for Payload {
    fn from(value: String) -> Self {
        Payload::Value(Value::String(value))
    }
}

impl From<&str> for Payload {
    fn from(value: &str) -> Self {
        Payload::Value(Value::String(value.to_string()))
    }
}

impl From<ErrorDetails> for Payload {
    fn from(details: ErrorDetails) -> Self {
        Payload::Error(details)
    }
}

impl From<DetailedError> for Payload {
    fn from(err: DetailedError) -> Self {
        Payload::Error(err.0)
    }
}
