//! # mqtt-rr Dispatch Benchmarks
//!
//! | Area | Operation | Target |
//! |------|-----------|--------|
//! | Registry | register + take_first | < 1µs |
//! | Resolver chain | JSON field fallthrough to topic | < 5µs |
//! | Dispatcher | submit + inbound match, batch | < 20µs per call |

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::unbounded_channel;

use mqtt_rr_core::domain::{PendingRegistry, PendingTask};
use mqtt_rr_core::{
    CallId, Callback, CorrelationResolver, DispatchResult, Dispatcher, DispatcherConfig, JsonFieldResolver,
    MemoryTransport, Request, ResolverChain, Response, ResponseBody, TopicResolver, Transport,
};

fn noop() -> Arc<dyn Callback> {
    Arc::new(|_: DispatchResult<Response>| {})
}

// ============================================================================
// Registry
// ============================================================================

fn bench_registry(c: &mut Criterion) {
    let mut group = c.benchmark_group("pending-registry");
    let registry = PendingRegistry::new();
    let callback = noop();

    group.bench_function("register_take_first", |b| {
        b.iter(|| {
            let now = tokio::time::Instant::now();
            let task = PendingTask::new(
                CallId::new(),
                "key".to_string(),
                now,
                now + Duration::from_secs(30),
                callback.clone(),
            );
            let _ = registry.register(task);
            black_box(registry.take_first("key"))
        })
    });

    group.finish();
}

// ============================================================================
// Resolver chain
// ============================================================================

fn bench_resolver_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolver-chain");
    let resolvers: Vec<Arc<dyn CorrelationResolver>> =
        vec![Arc::new(JsonFieldResolver::new("type")), Arc::new(TopicResolver)];
    let chain = ResolverChain::new(resolvers).unwrap();

    let json = r#"{"type":"get_list","items":[1,2,3]}"#;
    let json_body = ResponseBody::new("dev/1/reply", json.as_bytes().to_vec(), json.to_string());
    let plain_body = ResponseBody::new("sensor/1", b"23.5".to_vec(), "23.5".to_string());

    group.bench_function("json_field_hit", |b| {
        b.iter(|| black_box(chain.resolve(&json_body)))
    });
    group.bench_function("fallthrough_to_topic", |b| {
        b.iter(|| black_box(chain.resolve(&plain_body)))
    });

    group.finish();
}

// ============================================================================
// Dispatcher round trip
// ============================================================================

fn bench_dispatch_round_trip(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatcher");
    group.measurement_time(Duration::from_secs(10));
    let runtime = tokio::runtime::Runtime::new().unwrap();

    let dispatcher = runtime.block_on(async {
        let (transport, events) = MemoryTransport::new();
        transport.connect().await.unwrap();
        Dispatcher::builder(DispatcherConfig::default())
            .resolver(TopicResolver)
            .build(transport, events)
            .unwrap()
    });

    for batch in [1usize, 10, 100] {
        group.throughput(Throughput::Elements(batch as u64));
        group.bench_with_input(BenchmarkId::new("submit_match", batch), &batch, |b, &batch| {
            b.iter(|| {
                runtime.block_on(async {
                    let (tx, mut rx) = unbounded_channel();
                    for _ in 0..batch {
                        let tx = tx.clone();
                        let request = Request::builder()
                            .topic("cmd")
                            .back_name("bench")
                            .build();
                        dispatcher.submit(
                            request,
                            Some(Arc::new(move |outcome: DispatchResult<Response>| {
                                let _ = tx.send(outcome.is_ok());
                            })),
                        );
                    }
                    for _ in 0..batch {
                        let _ = dispatcher.on_inbound_message("bench", b"ok".to_vec());
                    }
                    for _ in 0..batch {
                        black_box(rx.recv().await);
                    }
                })
            })
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_registry,
    bench_resolver_chain,
    bench_dispatch_round_trip
);
criterion_main!(benches);
