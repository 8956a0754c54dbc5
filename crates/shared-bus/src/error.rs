//! # Error Types
//!
//! Registration and subscription errors ([`BusError`]) and codec errors
//! ([`CodecError`]).
//!
//! Registration errors are programmer errors: the panicking entry points
//! (`define`, `register_*`) format a `BusError` into the panic message.

use thiserror::Error;

/// Errors from definition, subscription and query operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BusError {
    /// An event with this name was already defined.
    #[error("event `{0}` is already defined")]
    DuplicateDefinition(String),

    /// The event name does not match `[a-z0-9_]+(\.[a-z0-9_]+)*`.
    #[error("invalid event name `{0}`")]
    InvalidName(String),

    /// The subscription pattern is not a valid dotted glob.
    #[error("invalid pattern `{pattern}`: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// None of the given patterns match a defined event.
    #[error("no events match patterns {0:?}")]
    NoMatchingEvents(Vec<String>),

    /// The event name was never defined.
    #[error("event `{0}` is not defined")]
    UnknownEventName(String),

    /// A history query is missing required fields.
    #[error("invalid history query: {0}")]
    InvalidQuery(String),

    /// Bus configuration is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Errors from encoding and decoding events.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The envelope is not a well-formed event.
    #[error("malformed event: {0}")]
    MalformedEvent(String),

    /// A typed payload references a message type that is not registered.
    #[error("unknown payload type `{0}`")]
    UnknownPayloadType(String),

    /// A registered context marshaler rejected its bytes.
    #[error("context marshaler `{name}` failed: {reason}")]
    ContextUnmarshal { name: String, reason: String },

    /// A typed message could not be serialized or deserialized.
    #[error("payload encoding: {0}")]
    PayloadEncoding(String),
}

impl From<serde_json::Error> for CodecError {
    fn from(err: serde_json::Error) -> Self {
        CodecError::MalformedEvent(err.to_string())
    }
}
