//! # Event Definitions
//!
//! Every event name must be defined once, at startup, before events of that
//! name can be created. Defining returns a [`Builder`] that stamps out events
//! with the definition's defaults.
//!
//! ```rust,ignore
//! lazy_static! {
//!     static ref EVT_UPLINK: Builder = define(
//!         "gs.up.receive",
//!         "receive uplink message",
//!         [with_visibility(Right::RightGatewayTrafficRead)],
//!     );
//! }
//!
//! bus.publish(EVT_UPLINK.new_with_ids_and_data(&ctx, [gtw_ids], uplink));
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use iot_telemetry::init_event_series;
use lazy_static::lazy_static;
use parking_lot::RwLock;
use serde_json::Value;
use shared_types::{EntityIdentifiers, Rights};
use tracing::debug;

use crate::context::Context;
use crate::error::BusError;
use crate::event::Event;
use crate::options::{with_data, with_identifiers, EventOption};
use crate::pattern::{is_valid_name, Pattern};
use crate::payload::Payload;

lazy_static! {
    static ref DEFINITIONS: RwLock<BTreeMap<String, Builder>> = RwLock::new(BTreeMap::new());
    static ref CATALOG: RwLock<BTreeMap<String, String>> = RwLock::new(BTreeMap::new());
}

/// A defined event name with its defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct Definition {
    name: String,
    description: String,
    default_visibility: Rights,
    data_type: Option<Value>,
    propagate_to_parent: bool,
}

impl Definition {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn default_visibility(&self) -> &Rights {
        &self.default_visibility
    }

    /// An example payload, if one was declared.
    pub fn data_type(&self) -> Option<&Value> {
        self.data_type.as_ref()
    }

    pub fn propagate_to_parent(&self) -> bool {
        self.propagate_to_parent
    }
}

/// Define an event.
///
/// # Panics
///
/// Panics if the name is invalid or already defined. Definitions are made at
/// startup; either case is a programming error.
pub fn define(
    name: &str,
    description: &str,
    options: impl IntoIterator<Item = EventOption>,
) -> Builder {
    match try_define(name, description, options) {
        Ok(builder) => builder,
        Err(err) => panic!("{err}"),
    }
}

/// Define an event, returning an error instead of panicking.
pub fn try_define(
    name: &str,
    description: &str,
    options: impl IntoIterator<Item = EventOption>,
) -> Result<Builder, BusError> {
    if !is_valid_name(name) {
        return Err(BusError::InvalidName(name.to_string()));
    }

    let mut definition = Definition {
        name: name.to_string(),
        description: description.to_string(),
        default_visibility: Rights::new(),
        data_type: None,
        propagate_to_parent: false,
    };
    let mut defaults = Vec::new();
    for option in options {
        match option {
            EventOption::Visibility(rights) => {
                definition.default_visibility = definition
                    .default_visibility
                    .iter()
                    .chain(rights.iter())
                    .collect();
            }
            EventOption::DataType(example) => definition.data_type = Some(example),
            EventOption::PropagateToParent => definition.propagate_to_parent = true,
            other => defaults.push(other),
        }
    }

    let builder = Builder {
        definition: Arc::new(definition),
        options: defaults.into(),
    };
    {
        let mut definitions = DEFINITIONS.write();
        if definitions.contains_key(name) {
            return Err(BusError::DuplicateDefinition(name.to_string()));
        }
        definitions.insert(name.to_string(), builder.clone());
    }
    CATALOG
        .write()
        .insert(format!("event:{name}"), description.to_string());
    init_event_series(name);

    debug!(name, "Defined event");

    Ok(builder)
}

/// Look up a definition by exact name.
pub fn lookup(name: &str) -> Option<Arc<Definition>> {
    DEFINITIONS
        .read()
        .get(name)
        .map(|builder| Arc::clone(&builder.definition))
}

/// The builder returned when `name` was defined.
pub(crate) fn builder_for(name: &str) -> Option<Builder> {
    DEFINITIONS.read().get(name).cloned()
}

/// All definitions, ordered by name.
pub fn definitions() -> Vec<Arc<Definition>> {
    DEFINITIONS
        .read()
        .values()
        .map(|builder| Arc::clone(&builder.definition))
        .collect()
}

/// Human-readable descriptions keyed by `event:<name>`.
pub fn descriptions() -> BTreeMap<String, String> {
    CATALOG.read().clone()
}

/// Resolve patterns to the sorted names of all matching definitions.
pub fn names_from_patterns<S: AsRef<str>>(patterns: &[S]) -> Result<Vec<String>, BusError> {
    let parsed = patterns
        .iter()
        .map(|p| Pattern::parse(p.as_ref()))
        .collect::<Result<Vec<_>, _>>()?;
    let names: Vec<String> = DEFINITIONS
        .read()
        .keys()
        .filter(|name| parsed.iter().any(|p| p.matches(name)))
        .cloned()
        .collect();
    if names.is_empty() {
        return Err(BusError::NoMatchingEvents(
            patterns.iter().map(|p| p.as_ref().to_string()).collect(),
        ));
    }
    Ok(names)
}

/// Creates events of one definition.
///
/// Builders are immutable; [`Builder::with`] returns a new builder.
#[derive(Debug, Clone)]
pub struct Builder {
    definition: Arc<Definition>,
    options: Arc<[EventOption]>,
}

impl Builder {
    pub fn definition(&self) -> &Definition {
        &self.definition
    }

    pub fn name(&self) -> &str {
        self.definition.name()
    }

    /// Derive a builder with extra default options. Definition-only options
    /// are ignored.
    pub fn with(&self, options: impl IntoIterator<Item = EventOption>) -> Builder {
        let mut merged = self.options.to_vec();
        merged.extend(options.into_iter().filter(|o| !o.is_definition_only()));
        Builder {
            definition: Arc::clone(&self.definition),
            options: merged.into(),
        }
    }

    /// Derive a builder that attaches `data` to every event.
    pub fn bind_data(&self, data: impl Into<Payload>) -> Builder {
        self.with([with_data(data)])
    }

    /// Build an event. Options apply after the builder's own.
    pub fn new_event(&self, ctx: &Context, options: impl IntoIterator<Item = EventOption>) -> Event {
        let mut event = Event::from_definition(ctx, &self.definition);
        for option in self.options.iter() {
            option.apply(ctx, &mut event);
        }
        for option in options {
            option.apply(ctx, &mut event);
        }
        event
    }

    pub fn new_with_ids_and_data<I>(
        &self,
        ctx: &Context,
        ids: impl IntoIterator<Item = I>,
        data: impl Into<Payload>,
    ) -> Event
    where
        I: Into<EntityIdentifiers>,
    {
        self.new_event(ctx, [with_identifiers(ids), with_data(data)])
    }
}
