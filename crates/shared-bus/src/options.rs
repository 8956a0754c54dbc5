//! Event options.
//!
//! Options are applied in order when an event is built. Some options only
//! make sense on a definition (data type, parent propagation); passed to a
//! single event they have no effect.

use serde_json::{json, Value};
use shared_types::{EntityIdentifiers, Rights};

use crate::context::Context;
use crate::event::Event;
use crate::payload::{ErrorDetails, Payload};
use crate::rpc::{authentication_from_metadata, client_info_from_metadata, RequestMetadata};

#[derive(Debug, Clone)]
pub enum EventOption {
    /// Append identifiers.
    Identifiers(Vec<EntityIdentifiers>),
    /// Set the payload and merge its correlation IDs.
    Data(Payload),
    /// Rights required to observe the event. On a definition these add to
    /// the default visibility; on an event they replace it.
    Visibility(Rights),
    /// Record the authentication of the request in the context.
    AuthFromContext,
    /// Record the remote address and user agent of the request in the context.
    ClientInfoFromContext,
    /// Document the shape of the payload with an example.
    DataType(Value),
    /// Mark the event as observable under the parents of its identifiers
    /// (see [`Event::observable_identifiers`]). Informational: routing
    /// always escalates end devices to their application.
    PropagateToParent,
}

pub fn with_identifiers<I>(ids: impl IntoIterator<Item = I>) -> EventOption
where
    I: Into<EntityIdentifiers>,
{
    EventOption::Identifiers(ids.into_iter().map(Into::into).collect())
}

pub fn with_data(data: impl Into<Payload>) -> EventOption {
    EventOption::Data(data.into())
}

pub fn with_visibility(rights: impl Into<Rights>) -> EventOption {
    EventOption::Visibility(rights.into())
}

pub fn with_auth_from_context() -> EventOption {
    EventOption::AuthFromContext
}

pub fn with_client_info_from_context() -> EventOption {
    EventOption::ClientInfoFromContext
}

pub fn with_data_type(example: Value) -> EventOption {
    EventOption::DataType(example)
}

/// The payload is an [`ErrorDetails`].
pub fn with_error_data_type() -> EventOption {
    let example = ErrorDetails::new("pkg/example", "example_error", "example error `{value}`")
        .with_attribute("value", "foo");
    EventOption::DataType(serde_json::to_value(example).unwrap_or(Value::Null))
}

/// The payload is the list of updated field paths.
pub fn with_updated_fields_data_type() -> EventOption {
    EventOption::DataType(json!(["ids.device_id", "name", "locations"]))
}

pub fn with_propagate_to_parent() -> EventOption {
    EventOption::PropagateToParent
}

impl EventOption {
    pub fn is_definition_only(&self) -> bool {
        matches!(self, EventOption::DataType(_) | EventOption::PropagateToParent)
    }

    pub(crate) fn apply(&self, ctx: &Context, event: &mut Event) {
        match self {
            EventOption::Identifiers(ids) => event.identifiers.extend(ids.iter().cloned()),
            EventOption::Data(data) => event.set_data(data.clone()),
            EventOption::Visibility(rights) => event.visibility = rights.clone(),
            EventOption::AuthFromContext => {
                if let Some(auth) = ctx
                    .value::<RequestMetadata>()
                    .and_then(authentication_from_metadata)
                {
                    event.authentication = Some(auth);
                }
            }
            EventOption::ClientInfoFromContext => {
                if let Some(metadata) = ctx.value::<RequestMetadata>() {
                    let (remote_ip, user_agent) = client_info_from_metadata(metadata);
                    event.remote_ip = remote_ip;
                    event.user_agent = user_agent;
                }
            }
            EventOption::DataType(_) | EventOption::PropagateToParent => {}
        }
    }
}
