//! # Managed Gateway Client
//!
//! Bridges the managed gateway service into the bus. For each gateway the
//! adapter opens one upstream stream of [`ManagedGatewayRecord`]s and
//! publishes one `gcs.managed.*` event per record, identified by the gateway
//! and visible to holders of the gateway info right.
//!
//! A stream runs until the upstream ends it, fails, or the context passed to
//! [`ManagedGatewayAdapter::run`] is done.
//!
//! Publishing blocks while the bus queue is full, so events are handed to
//! the bus from tokio's blocking pool rather than from the stream's task.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use shared_bus::{
    define, register_correlation_prefix, with_data_type, with_visibility, Builder, Context,
    CorrelationPrefix, Publisher,
};
use shared_types::{GatewayIdentifiers, Right};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

lazy_static! {
    static ref GCS_CORRELATION: CorrelationPrefix = register_correlation_prefix("gcs_managed", "gcs");

    static ref MANAGED_UPDATE: Builder =
        define_managed("gcs.managed.update", "update managed gateway", json!({"version": "1.2.0"}));
    static ref LOCATION_UPDATE: Builder = define_managed(
        "gcs.managed.location.update",
        "update managed gateway location",
        json!({"latitude": 52.37, "longitude": 4.89, "altitude": 2}),
    );
    static ref SYSTEM_STATUS_RECEIVE: Builder = define_managed(
        "gcs.managed.system_status.receive",
        "receive managed gateway system status",
        json!({"cpu_temperature": 48.5, "memory_free": 131072}),
    );
    static ref CONTROLLER_UP: Builder =
        define_managed("gcs.managed.controller.up", "managed gateway connected to controller", link_example());
    static ref CONTROLLER_DOWN: Builder =
        define_managed("gcs.managed.controller.down", "managed gateway disconnected from controller", link_example());
    static ref GS_UP: Builder =
        define_managed("gcs.managed.gs.up", "managed gateway connected to Gateway Server", link_example());
    static ref GS_DOWN: Builder =
        define_managed("gcs.managed.gs.down", "managed gateway disconnected from Gateway Server", link_example());
    static ref CELLULAR_UP: Builder =
        define_managed("gcs.managed.cellular.up", "cellular backhaul up", link_example());
    static ref CELLULAR_DOWN: Builder =
        define_managed("gcs.managed.cellular.down", "cellular backhaul down", link_example());
    static ref WIFI_UP: Builder = define_managed("gcs.managed.wifi.up", "WiFi backhaul up", link_example());
    static ref WIFI_DOWN: Builder = define_managed("gcs.managed.wifi.down", "WiFi backhaul down", link_example());
    static ref WIFI_FAIL: Builder =
        define_managed("gcs.managed.wifi.fail", "WiFi backhaul connection failed", link_example());
    static ref ETHERNET_UP: Builder =
        define_managed("gcs.managed.ethernet.up", "ethernet backhaul up", link_example());
    static ref ETHERNET_DOWN: Builder =
        define_managed("gcs.managed.ethernet.down", "ethernet backhaul down", link_example());
}

fn define_managed(name: &str, description: &str, example: Value) -> Builder {
    define(
        name,
        description,
        [with_visibility(Right::RightGatewayInfo), with_data_type(example)],
    )
}

fn link_example() -> Value {
    json!({"network_interface_type": "wifi", "addresses": ["192.168.1.12"]})
}

/// State of a backhaul or server connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkState {
    Up,
    Down,
}

/// WiFi additionally reports failed connection attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WifiState {
    Up,
    Down,
    Fail,
}

/// One record streamed by the managed gateway service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "details", rename_all = "snake_case")]
pub enum ManagedGatewayRecord {
    Update(Value),
    LocationUpdate(Value),
    SystemStatus(Value),
    Controller(LinkState, Value),
    GatewayServer(LinkState, Value),
    Cellular(LinkState, Value),
    Wifi(WifiState, Value),
    Ethernet(LinkState, Value),
}

impl ManagedGatewayRecord {
    fn builder(&self) -> &'static Builder {
        use LinkState::{Down, Up};
        match self {
            Self::Update(_) => &*MANAGED_UPDATE,
            Self::LocationUpdate(_) => &*LOCATION_UPDATE,
            Self::SystemStatus(_) => &*SYSTEM_STATUS_RECEIVE,
            Self::Controller(Up, _) => &*CONTROLLER_UP,
            Self::Controller(Down, _) => &*CONTROLLER_DOWN,
            Self::GatewayServer(Up, _) => &*GS_UP,
            Self::GatewayServer(Down, _) => &*GS_DOWN,
            Self::Cellular(Up, _) => &*CELLULAR_UP,
            Self::Cellular(Down, _) => &*CELLULAR_DOWN,
            Self::Wifi(WifiState::Up, _) => &*WIFI_UP,
            Self::Wifi(WifiState::Down, _) => &*WIFI_DOWN,
            Self::Wifi(WifiState::Fail, _) => &*WIFI_FAIL,
            Self::Ethernet(Up, _) => &*ETHERNET_UP,
            Self::Ethernet(Down, _) => &*ETHERNET_DOWN,
        }
    }

    /// Name of the event this record is published as.
    pub fn event_name(&self) -> &'static str {
        self.builder().name()
    }

    fn into_details(self) -> Value {
        match self {
            Self::Update(v) | Self::LocationUpdate(v) | Self::SystemStatus(v) => v,
            Self::Controller(_, v)
            | Self::GatewayServer(_, v)
            | Self::Cellular(_, v)
            | Self::Wifi(_, v)
            | Self::Ethernet(_, v) => v,
        }
    }
}

#[derive(Debug, Error)]
pub enum ManagedGatewayError {
    #[error("failed to open event stream for gateway {gateway_id}: {reason}")]
    Connect { gateway_id: String, reason: String },
    #[error("event stream for gateway {gateway_id} failed: {reason}")]
    Stream { gateway_id: String, reason: String },
    #[error("failed to publish event of gateway {gateway_id}: {reason}")]
    Publish { gateway_id: String, reason: String },
}

/// Stream of upstream records for one gateway.
pub type RecordStream = BoxStream<'static, Result<ManagedGatewayRecord, ManagedGatewayError>>;

/// Client of the managed gateway service's event stream.
#[async_trait]
pub trait ManagedGatewayClient: Send + Sync {
    async fn stream_events(
        &self,
        ctx: &Context,
        gateway: &GatewayIdentifiers,
    ) -> Result<RecordStream, ManagedGatewayError>;
}

/// Publishes the events of managed gateways.
pub struct ManagedGatewayAdapter {
    client: Arc<dyn ManagedGatewayClient>,
    publisher: Arc<dyn Publisher>,
}

impl ManagedGatewayAdapter {
    pub fn new(client: Arc<dyn ManagedGatewayClient>, publisher: Arc<dyn Publisher>) -> Arc<Self> {
        Arc::new(Self { client, publisher })
    }

    /// Stream and publish the events of `gateway` until the stream ends or
    /// `ctx` is done. Every event of one stream shares a correlation ID.
    pub async fn run(&self, ctx: &Context, gateway: GatewayIdentifiers) -> Result<(), ManagedGatewayError> {
        let ctx = GCS_CORRELATION.attach(ctx, &[]);
        let mut records = self.client.stream_events(&ctx, &gateway).await?;
        info!(gateway_id = %gateway.gateway_id, "Managed gateway event stream opened");

        loop {
            let next = tokio::select! {
                next = records.next() => next,
                _ = ctx.done() => {
                    debug!(gateway_id = %gateway.gateway_id, "Managed gateway event stream cancelled");
                    return Ok(());
                }
            };
            match next {
                Some(Ok(record)) => {
                    let event = record
                        .builder()
                        .new_with_ids_and_data(&ctx, [gateway.clone()], record.into_details());
                    let publisher = Arc::clone(&self.publisher);
                    tokio::task::spawn_blocking(move || publisher.publish(event))
                        .await
                        .map_err(|e| ManagedGatewayError::Publish {
                            gateway_id: gateway.gateway_id.clone(),
                            reason: e.to_string(),
                        })?;
                }
                Some(Err(e)) => {
                    warn!(gateway_id = %gateway.gateway_id, error = %e, "Managed gateway event stream failed");
                    return Err(e);
                }
                None => {
                    info!(gateway_id = %gateway.gateway_id, "Managed gateway event stream closed");
                    return Ok(());
                }
            }
        }
    }

    /// Run the stream of `gateway` on a background task.
    pub fn spawn(
        self: &Arc<Self>,
        ctx: &Context,
        gateway: GatewayIdentifiers,
    ) -> JoinHandle<Result<(), ManagedGatewayError>> {
        let adapter = Arc::clone(self);
        let ctx = ctx.clone();
        tokio::spawn(async move { adapter.run(&ctx, gateway).await })
    }
}
