//! # Producer Flows
//!
//! Adapters publishing onto a shared bus, consumed through the identifier
//! and visibility filters, and carried over the wire codec.

#[cfg(test)]
mod tests {
    use std::fs;
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use futures::stream::{self, StreamExt};
    use iot_adapters::{
        FsWatcher, LinkState, ManagedGatewayAdapter, ManagedGatewayClient, ManagedGatewayError,
        ManagedGatewayRecord, RecordStream, WifiState,
    };
    use serde_json::json;
    use shared_bus::{
        decode, encode, ChannelHandler, Context, IdentifierFilter, Payload, PubSub, Subscriber,
        VisibilityFilter,
    };
    use shared_types::{EntityIdentifiers, GatewayIdentifiers, Right, Rights};

    use crate::integration::{collect, names};

    /// Streams the same records for every gateway.
    struct ScriptedClient(Vec<ManagedGatewayRecord>);

    #[async_trait]
    impl ManagedGatewayClient for ScriptedClient {
        async fn stream_events(
            &self,
            _ctx: &Context,
            _gateway: &GatewayIdentifiers,
        ) -> Result<RecordStream, ManagedGatewayError> {
            Ok(stream::iter(self.0.clone().into_iter().map(Ok)).boxed())
        }
    }

    fn gateway(id: &str) -> EntityIdentifiers {
        GatewayIdentifiers::new(id).into()
    }

    #[tokio::test]
    async fn test_managed_gateway_events_reach_gateway_subscribers() {
        let bus = Arc::new(PubSub::new());
        let filter = IdentifierFilter::new();
        bus.subscribe("gcs.managed.**", filter.clone()).unwrap();

        let (watched, mut watched_rx) = ChannelHandler::new(32);
        filter.subscribe(&Context::background(), &[gateway("gtw-a")], watched);

        let (unprivileged, mut unprivileged_rx) = ChannelHandler::new(32);
        filter.subscribe(
            &Context::background(),
            &[gateway("gtw-a")],
            VisibilityFilter::new(Rights::new(), unprivileged),
        );

        let adapter = ManagedGatewayAdapter::new(
            Arc::new(ScriptedClient(vec![
                ManagedGatewayRecord::Wifi(WifiState::Fail, json!({"ssid": "warehouse"})),
                ManagedGatewayRecord::GatewayServer(LinkState::Up, json!({"address": "eu1"})),
            ])),
            bus.clone(),
        );
        let ctx = Context::background();
        let a = adapter.spawn(&ctx, GatewayIdentifiers::new("gtw-a"));
        let b = adapter.spawn(&ctx, GatewayIdentifiers::new("gtw-b"));
        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        let events = collect(&mut watched_rx).await;
        assert_eq!(names(&events), vec!["gcs.managed.wifi.fail", "gcs.managed.gs.up"]);
        assert!(events.iter().all(|e| e.identifiers() == [gateway("gtw-a")]));
        assert!(collect(&mut unprivileged_rx).await.is_empty());
    }

    #[tokio::test]
    async fn test_managed_gateway_event_over_the_wire() {
        let bus = Arc::new(PubSub::new());
        let (handler, mut rx) = ChannelHandler::new(8);
        bus.subscribe(
            "gcs.managed.location.update",
            VisibilityFilter::new(Right::RightGatewayInfo, handler),
        )
        .unwrap();

        let location = json!({"latitude": 52.37, "longitude": 4.89});
        let adapter = ManagedGatewayAdapter::new(
            Arc::new(ScriptedClient(vec![ManagedGatewayRecord::LocationUpdate(location.clone())])),
            bus.clone(),
        );
        adapter
            .run(&Context::background(), GatewayIdentifiers::new("gtw-wire"))
            .await
            .unwrap();

        let events = collect(&mut rx).await;
        assert_eq!(events.len(), 1);
        let published = &events[0];

        let decoded = decode(&encode(published).unwrap()).unwrap();
        assert_eq!(&decoded, published.as_ref());
        assert!(decoded.visibility().contains(Right::RightGatewayInfo));
        assert_eq!(decoded.data().and_then(Payload::as_value), Some(&location));
        assert_eq!(decoded.context().correlation_ids(), published.correlation_ids());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_filesystem_changes_are_published() {
        let dir = tempfile::TempDir::new().unwrap();
        let root = fs::canonicalize(dir.path()).unwrap();

        let bus = Arc::new(PubSub::new());
        let (handler, mut rx) = ChannelHandler::new(64);
        bus.subscribe("fs.*", handler).unwrap();

        let watcher = FsWatcher::new(&Context::background(), bus.clone()).unwrap();
        watcher.watch(&root).unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        let file = root.join("lorawan.toml");
        fs::write(&file, b"band = \"EU_863_870\"").unwrap();

        let expected = json!(file.to_string_lossy());
        let mut created = None;
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while created.is_none() && tokio::time::Instant::now() < deadline {
            if let Some(event) = rx.receive_with_timeout(Duration::from_millis(250)).await {
                if event.name() == "fs.create" && event.data().and_then(Payload::as_value) == Some(&expected) {
                    created = Some(event);
                }
            }
        }

        let created = created.unwrap();
        assert!(created.identifiers().is_empty());
        assert!(created.visibility().is_empty());
    }
}
