//! # Shared Types Crate
//!
//! Domain types shared by the event bus and its producers: the identifiers of
//! the entities an event concerns, and the rights that gate who may observe it.
//!
//! ## Design Principles
//!
//! - **Typed identifiers**: each entity type has its own identifier struct, so
//!   an application ID can never be mistaken for a gateway ID.
//! - **Canonical keys**: every identifier has a unique key within its entity
//!   type; end devices are scoped by their application.
//! - **Explicit hierarchy**: the only parent relation is end device → application.

pub mod identifiers;
pub mod rights;

pub use identifiers::*;
pub use rights::{Right, Rights};
