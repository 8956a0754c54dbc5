//! # IoT Adapters
//!
//! Producers that turn outside signals into bus events.
//!
//! - [`fswatch`]: filesystem changes on watched paths become `fs.*` events
//! - [`gcs_managed`]: records streamed by the managed gateway service become
//!   `gcs.managed.*` events about the gateway

pub mod fswatch;
pub mod gcs_managed;

pub use fswatch::{FsWatcher, WatchError};
pub use gcs_managed::{
    LinkState, ManagedGatewayAdapter, ManagedGatewayClient, ManagedGatewayError,
    ManagedGatewayRecord, RecordStream, WifiState,
};
