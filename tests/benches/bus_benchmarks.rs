//! # Event Bus Benchmarks
//!
//! | Path | Measures |
//! |------|----------|
//! | publish | building and queueing one event |
//! | dispatch | pattern matching plus identifier filter fan-out |
//! | codec | JSON encode and decode of one event |
//! | correlation | merging correlation IDs into a context |

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde_json::json;
use shared_bus::{
    context_with_correlation_id, decode, define, encode, Context, FuncHandler, Handler,
    IdentifierFilter, PubSub, Publisher, Subscriber,
};
use shared_types::{ApplicationIdentifiers, EndDeviceIdentifiers, EntityIdentifiers};

fn bench_publish(c: &mut Criterion) {
    let mut group = c.benchmark_group("publish");
    group.measurement_time(Duration::from_secs(5));

    let uplink = define("bench.publish.uplink", "publish benchmark", []);
    let bus = PubSub::with_capacity(1024);
    let delivered = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&delivered);
    bus.subscribe(
        "bench.publish.*",
        FuncHandler::new(move |_| {
            counter.fetch_add(1, Ordering::Relaxed);
        }),
    )
    .expect("valid pattern");

    let ctx = context_with_correlation_id(&Context::background(), &["bench:publish"]);
    let device: EntityIdentifiers = EndDeviceIdentifiers::new("bench-app", "bench-dev").into();

    group.throughput(Throughput::Elements(1));
    group.bench_function("new_event_and_publish", |b| {
        b.iter(|| {
            bus.publish(uplink.new_with_ids_and_data(&ctx, [device.clone()], json!({"f_cnt": 42})))
        })
    });
    group.finish();
}

fn bench_identifier_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch");
    define("bench.dispatch.uplink", "dispatch benchmark", []);

    for subscribers in [10usize, 100, 1000] {
        let filter = IdentifierFilter::new();
        for n in 0..subscribers {
            let handler: Arc<dyn Handler> = FuncHandler::new(|event| {
                black_box(event);
            });
            let ids = [EntityIdentifiers::from(ApplicationIdentifiers::new(format!("app-{n}")))];
            filter.subscribe(&Context::background(), &ids, handler);
        }

        let event = Arc::new(
            shared_bus::Event::new(
                &Context::background(),
                "bench.dispatch.uplink",
                [EntityIdentifiers::from(EndDeviceIdentifiers::new("app-7", "dev-1"))],
                None,
            )
            .expect("valid name"),
        );

        group.bench_with_input(
            BenchmarkId::new("identifier_filter", subscribers),
            &subscribers,
            |b, _| b.iter(|| filter.notify(Arc::clone(&event))),
        );
    }
    group.finish();
}

fn bench_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec");
    define("bench.codec.uplink", "codec benchmark", []);

    let ctx = context_with_correlation_id(&Context::background(), &["bench:codec:1", "bench:codec:2"]);
    let event = shared_bus::Event::new(
        &ctx,
        "bench.codec.uplink",
        [EntityIdentifiers::from(EndDeviceIdentifiers::new("app", "dev"))],
        Some(json!({"frm_payload": "AQID", "rssi": -97, "snr": 7.5}).into()),
    )
    .expect("valid name");
    let bytes = encode(&event).expect("encodable");

    group.throughput(Throughput::Bytes(bytes.len() as u64));
    group.bench_function("encode", |b| b.iter(|| encode(black_box(&event))));
    group.bench_function("decode", |b| b.iter(|| decode(black_box(&bytes))));
    group.finish();
}

fn bench_correlation(c: &mut Criterion) {
    let mut group = c.benchmark_group("correlation");

    for existing in [1usize, 8, 64] {
        let ids: Vec<String> = (0..existing).map(|n| format!("bench:{n:04}")).collect();
        let ctx = context_with_correlation_id(&Context::background(), &ids);
        group.bench_with_input(BenchmarkId::new("merge", existing), &ctx, |b, ctx| {
            b.iter(|| context_with_correlation_id(ctx, &["bench:0002", "bench:9999"]))
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_publish,
    bench_identifier_fan_out,
    bench_codec,
    bench_correlation
);
criterion_main!(benches);
