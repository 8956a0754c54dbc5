//! # End-to-End Scenarios
//!
//! The reference flows through context, dispatcher, identifier filter, codec
//! and channel handler.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;
    use shared_bus::{
        context_with_correlation_id, correlation_ids_from_context, decode, define, encode,
        ChannelHandler, Context, Event, IdentifierFilter, Payload, PubSub, Publisher, Subscriber,
    };
    use shared_types::{ApplicationIdentifiers, EndDeviceIdentifiers, EntityIdentifiers};
    use iot_telemetry::EVENTS_CHANNEL_DROPPED;

    use crate::integration::{collect, names, SETTLE};

    fn app(id: &str) -> EntityIdentifiers {
        ApplicationIdentifiers::new(id).into()
    }

    // =========================================================================
    // S1: CORRELATION PROPAGATION
    // =========================================================================

    #[test]
    fn s1_correlation_propagation() {
        let ctx = Context::background();
        let ctx = context_with_correlation_id(&ctx, &["foo"]);
        let ctx = context_with_correlation_id(&ctx, &["baz"]);
        let ctx = context_with_correlation_id(&ctx, &["bar", "foo"]);

        assert_eq!(correlation_ids_from_context(&ctx), vec!["bar", "baz", "foo"]);
    }

    // =========================================================================
    // S2: PATTERN AND FILTER
    // =========================================================================

    #[tokio::test]
    async fn s2_pattern_subscription() {
        let evt1 = define("test.evt1", "test event one", []);
        let bus = PubSub::new();
        let (handler, mut rx) = ChannelHandler::new(16);
        bus.subscribe("test.*", handler).unwrap();

        let ctx = context_with_correlation_id(&Context::background(), &["test:s2"]);
        bus.publish(evt1.new_with_ids_and_data(&ctx, [app("foo")], "hello"));

        let events = collect(&mut rx).await;
        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.name(), "test.evt1");
        assert!(event.correlation_ids().iter().any(|id| id == "test:s2"));
        assert!(event.identifiers().contains(&app("foo")));
        assert_eq!(event.data().and_then(Payload::as_value), Some(&json!("hello")));
    }

    // =========================================================================
    // S3: IDENTIFIER ESCALATION
    // =========================================================================

    #[tokio::test]
    async fn s3_identifier_escalation() {
        let uplink = define("test.s3.uplink", "identifier escalation", []);
        let bus = PubSub::new();
        let filter = IdentifierFilter::new();
        bus.subscribe("test.s3.*", filter.clone()).unwrap();

        let (handler, mut rx) = ChannelHandler::new(16);
        filter.subscribe(&Context::background(), &[app("foo")], handler);

        let ctx = Context::background();
        let device: EntityIdentifiers = EndDeviceIdentifiers::new("foo", "d1").into();
        bus.publish(uplink.new_with_ids_and_data(&ctx, [app("foo")], json!(1)));
        bus.publish(uplink.new_with_ids_and_data(&ctx, [app("bar")], json!(2)));
        bus.publish(uplink.new_with_ids_and_data(&ctx, [device.clone()], json!(3)));

        let events = collect(&mut rx).await;
        let received: Vec<_> = events.iter().map(|e| e.identifiers().to_vec()).collect();
        assert_eq!(received, vec![vec![app("foo")], vec![device]]);
    }

    // =========================================================================
    // S4: JSON ROUND-TRIP
    // =========================================================================

    #[test]
    fn s4_json_round_trip() {
        define("name", "round-trip scenario", []);
        let ctx = context_with_correlation_id(&Context::background(), &["test:s4"]);
        let event = Event::new(&ctx, "name", [app("application_id")], Some(Payload::from("data"))).unwrap();

        let decoded = decode(&encode(&event).unwrap()).unwrap();

        assert_eq!(decoded, event);
        assert_eq!(decoded.name(), "name");
        assert_eq!(decoded.time(), event.time());
        assert_eq!(decoded.identifiers(), &[app("application_id")]);
        assert_eq!(decoded.correlation_ids(), &["test:s4".to_string()]);
        assert_eq!(decoded.data().and_then(Payload::as_value), Some(&json!("data")));
        assert_eq!(decoded.context().correlation_ids(), event.correlation_ids());
    }

    // =========================================================================
    // S5: CHANNEL DROP ACCOUNTING
    // =========================================================================

    #[tokio::test]
    async fn s5_channel_drop_accounting() {
        let dropped = define("test.s5.drop", "channel drop accounting", []);
        let series = EVENTS_CHANNEL_DROPPED.with_label_values(&["test.s5.drop"]);
        let before = series.get();

        let bus = PubSub::new();
        let (handler, mut rx) = ChannelHandler::new(2);
        bus.subscribe("test.s5.drop", handler).unwrap();

        for n in 0..3 {
            bus.publish(dropped.new_with_ids_and_data(&Context::background(), [app("foo")], json!(n)));
        }
        tokio::time::sleep(SETTLE).await;

        let events = collect(&mut rx).await;
        let payloads: Vec<_> = events
            .iter()
            .map(|e| e.data().and_then(Payload::as_value).cloned())
            .collect();
        assert_eq!(payloads, vec![Some(json!(0)), Some(json!(1))]);
        assert_eq!(series.get(), before + 1.0);
    }

    // =========================================================================
    // S6: UNSUBSCRIBE IS BEST-EFFORT
    // =========================================================================

    #[tokio::test]
    async fn s6_unsubscribe_best_effort() {
        let evt2 = define("test.evt2", "test event two", []);
        let bus = PubSub::new();
        let (handler, mut rx) = ChannelHandler::new(16);
        let handler: Arc<dyn shared_bus::Handler> = handler;
        bus.subscribe("test.*", Arc::clone(&handler)).unwrap();

        bus.publish(evt2.new_with_ids_and_data(&Context::background(), [app("foo")], "before"));
        tokio::time::sleep(SETTLE).await;
        assert_eq!(names(&collect(&mut rx).await), vec!["test.evt2"]);

        bus.unsubscribe("test.*", handler);
        bus.publish(evt2.new_with_ids_and_data(&Context::background(), [app("foo")], "racing"));
        tokio::time::sleep(SETTLE).await;
        bus.publish(evt2.new_with_ids_and_data(&Context::background(), [app("foo")], "after"));

        let late = collect(&mut rx).await;
        assert!(late.len() <= 1);
        assert!(late
            .iter()
            .all(|e| e.data().and_then(Payload::as_value) == Some(&json!("racing"))));
        assert_eq!(bus.subscription_count(), 0);
    }
}
