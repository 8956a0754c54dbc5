//! # Bus Properties
//!
//! Invariants checked across crates: fan-out exclusivity, escalation,
//! ordering, metric accounting, prefix idempotence, registry errors, panic
//! isolation, cut-over deduplication and visibility.

#[cfg(test)]
mod tests {
    use std::panic::{catch_unwind, AssertUnwindSafe};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Once};

    use iot_telemetry::{EVENTS_HANDLER_PANICS, EVENTS_PUBLISHED};
    use proptest::prelude::*;
    use serde_json::json;
    use shared_bus::{
        context_with_correlation_id, define, names_from_patterns, register_correlation_prefix,
        try_define, with_identifiers, with_visibility, BusError, ChannelHandler, Context,
        CutoverHandler, Event, FuncHandler, Handler, HistoryQuery, IdentifierFilter, Payload,
        PubSub, Publisher, Subscriber, VisibilityFilter,
    };
    use shared_types::{
        ApplicationIdentifiers, EndDeviceIdentifiers, EntityIdentifiers, GatewayIdentifiers, Right,
    };

    use crate::integration::collect;

    fn counting_handler() -> (Arc<dyn Handler>, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let handler: Arc<dyn Handler> = FuncHandler::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        (handler, count)
    }

    fn identifier_strategy() -> impl Strategy<Value = EntityIdentifiers> {
        prop_oneof![
            "[a-c]".prop_map(|a| EntityIdentifiers::from(ApplicationIdentifiers::new(a))),
            ("[a-c]", "d[0-2]").prop_map(|(a, d)| EntityIdentifiers::from(EndDeviceIdentifiers::new(a, d))),
            "g[0-2]".prop_map(|g| EntityIdentifiers::from(GatewayIdentifiers::new(g))),
        ]
    }

    /// Names used by the proptest bodies, defined once per process.
    fn define_property_events() {
        static DEFINED: Once = Once::new();
        DEFINED.call_once(|| {
            define("props.fan_out", "fan-out exclusivity", []);
            define("props.escalation", "identifier escalation", []);
        });
    }

    proptest! {
        /// A handler registered for any identifier of an event receives it
        /// exactly once.
        #[test]
        fn prop_fan_out_exclusive(
            subscribed in prop::collection::vec(identifier_strategy(), 1..6),
            published in prop::collection::vec(identifier_strategy(), 1..6),
        ) {
            define_property_events();
            let filter = IdentifierFilter::new();
            let (handler, count) = counting_handler();
            filter.subscribe(&Context::background(), &subscribed, handler);

            let event = Event::new(&Context::background(), "props.fan_out", published.clone(), None).unwrap();
            filter.notify(Arc::new(event));

            let interested = published.iter().any(|id| {
                subscribed.contains(id)
                    || id.parent().map(|p| subscribed.contains(&p)).unwrap_or(false)
            });
            prop_assert_eq!(count.load(Ordering::SeqCst), usize::from(interested));
        }

        /// Handlers of an application see every event about its devices.
        #[test]
        fn prop_escalation_to_application(app in "[a-z]{1,8}", devices in prop::collection::vec("[a-z0-9]{1,8}", 1..8)) {
            define_property_events();
            let filter = IdentifierFilter::new();
            let (handler, count) = counting_handler();
            filter.subscribe(
                &Context::background(),
                &[ApplicationIdentifiers::new(app.clone()).into()],
                handler,
            );

            for device in &devices {
                let ids = [EntityIdentifiers::from(EndDeviceIdentifiers::new(app.clone(), device.clone()))];
                filter.notify(Arc::new(Event::new(&Context::background(), "props.escalation", ids, None).unwrap()));
            }
            prop_assert_eq!(count.load(Ordering::SeqCst), devices.len());
        }

        /// Attaching under a prefix the context already carries is a no-op.
        #[test]
        fn prop_prefix_attach_idempotent(suffix in "[a-z0-9]{1,12}", other in "[a-z0-9]{1,12}") {
            let prefix = props_prefix();
            let ctx = prefix.attach(&Context::background(), &[suffix.as_str()]);
            let again = prefix.attach(&ctx, &[other.as_str()]);
            prop_assert_eq!(again.correlation_ids(), ctx.correlation_ids());
            let without_suffix = prefix.attach(&again, &[]);
            prop_assert_eq!(without_suffix.correlation_ids(), ctx.correlation_ids());
        }
    }

    fn props_prefix() -> shared_bus::CorrelationPrefix {
        use std::sync::OnceLock;
        static PREFIX: OnceLock<shared_bus::CorrelationPrefix> = OnceLock::new();
        PREFIX
            .get_or_init(|| register_correlation_prefix("props", "props"))
            .clone()
    }

    // =========================================================================
    // DISPATCHER
    // =========================================================================

    #[tokio::test]
    async fn test_order_per_producer_and_handler() {
        let sequence = define("props.order", "ordering", []);
        let bus = Arc::new(PubSub::with_capacity(4));
        let (handler, mut rx) = ChannelHandler::new(256);
        bus.subscribe("props.order", handler).unwrap();

        let publisher = Arc::clone(&bus);
        let producer = std::thread::spawn(move || {
            for n in 0..200 {
                publisher.publish(sequence.bind_data(json!(n)).new_event(&Context::background(), []));
            }
        });
        producer.join().unwrap();

        let events = collect(&mut rx).await;
        let received: Vec<_> = events
            .iter()
            .filter_map(|e| e.data().and_then(Payload::as_value).and_then(|v| v.as_i64()))
            .collect();
        assert_eq!(received, (0..200).collect::<Vec<i64>>());
        assert_eq!(bus.events_published(), 200);
    }

    #[test]
    fn test_publish_counter_advances_by_publish_count() {
        let counted = define("props.publish_count", "publish accounting", []);
        let series = EVENTS_PUBLISHED.with_label_values(&["props.publish_count"]);
        let before = series.get();

        let bus = PubSub::new();
        for _ in 0..7 {
            bus.publish(counted.new_event(&Context::background(), []));
        }
        assert_eq!(series.get(), before + 7.0);
    }

    #[tokio::test]
    async fn test_panicking_handler_is_isolated() {
        let fragile = define("props.panic", "panic isolation", []);
        let panics = EVENTS_HANDLER_PANICS.with_label_values(&["props.panic"]);
        let before = panics.get();

        let bus = PubSub::new();
        bus.subscribe("props.panic", FuncHandler::new(|_| panic!("handler failure")))
            .unwrap();
        let (handler, mut rx) = ChannelHandler::new(16);
        bus.subscribe("props.*", handler).unwrap();

        bus.publish(fragile.new_event(&Context::background(), []));
        bus.publish(fragile.new_event(&Context::background(), []));

        assert_eq!(collect(&mut rx).await.len(), 2);
        assert_eq!(panics.get(), before + 2.0);
    }

    // =========================================================================
    // REGISTRIES
    // =========================================================================

    #[test]
    fn test_duplicate_definition() {
        define("props.duplicate", "first", []);
        assert_eq!(
            try_define("props.duplicate", "second", []).unwrap_err(),
            BusError::DuplicateDefinition("props.duplicate".into())
        );
        let panicked = catch_unwind(AssertUnwindSafe(|| define("props.duplicate", "third", [])));
        assert!(panicked.is_err());
    }

    #[test]
    fn test_patterns_without_definitions() {
        assert!(matches!(
            names_from_patterns(&["nothing.*"]),
            Err(BusError::NoMatchingEvents(_))
        ));
    }

    // =========================================================================
    // HANDLER ADAPTERS
    // =========================================================================

    #[test]
    fn test_cutover_never_repeats_an_event() {
        let builder = define("props.cutover", "cutover", []);
        let gateway = GatewayIdentifiers::new("gtw-props");
        let ctx = context_with_correlation_id(&Context::background(), &["props:cutover"]);
        let history: Vec<_> = (0..3)
            .map(|n| {
                Arc::new(builder.new_event(
                    &ctx,
                    [with_identifiers([gateway.clone()]), shared_bus::with_data(json!(n))],
                ))
            })
            .collect();

        let (handler, count) = counting_handler();
        let cutover = CutoverHandler::new(HistoryQuery::new([gateway.clone()]), handler);

        cutover.notify(Arc::clone(&history[2]));
        cutover.deliver_history(history.iter().cloned());
        cutover.notify(Arc::clone(&history[0]));

        let distinct: std::collections::HashSet<_> =
            history.iter().map(|e| shared_bus::EventKey::from(e.as_ref())).collect();
        assert_eq!(count.load(Ordering::SeqCst), distinct.len());
    }

    #[test]
    fn test_visibility_filter_requires_every_right() {
        let both = define(
            "props.visibility.both",
            "needs two rights",
            [with_visibility([Right::RightGatewayInfo, Right::RightGatewayLocationRead])],
        );
        let one = define("props.visibility.one", "needs one right", [with_visibility(Right::RightGatewayInfo)]);
        let public = define("props.visibility.public", "public", []);

        let (handler, mut rx) = ChannelHandler::new(8);
        let filter = VisibilityFilter::new(Right::RightGatewayInfo, handler);
        for builder in [&both, &one, &public] {
            filter.notify(Arc::new(builder.new_event(&Context::background(), [])));
        }

        let received: Vec<_> = std::iter::from_fn(|| rx.try_recv())
            .map(|e| e.name().to_string())
            .collect();
        assert_eq!(received, vec!["props.visibility.one", "props.visibility.public"]);
    }
}
