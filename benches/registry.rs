//! Registry benchmark suite.
//!
//! Benchmarks the hot paths of the registry:
//! - `socket_for` on a cached key (exact and variant spellings)
//! - Event fan-out to 1, 10 and 100 subscribers
//!
//! Run with: cargo bench --bench registry
//! Results saved to: target/criterion/

use std::hint::black_box;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use tokio::runtime::Runtime;
use websocket_registry::{EventEmitter, EventKind, MockNetwork, SocketEvent, SocketRegistry};

// ============================================================================
// Benchmark Parameters
// ============================================================================

const TARGET: &str = "ws://example.com:7000";
const SUBSCRIBER_COUNTS: &[usize] = &[1, 10, 100];

// ============================================================================
// Benchmark: Cache Hit
// ============================================================================

fn bench_socket_for_hit(c: &mut Criterion) {
    let rt = Runtime::new().expect("runtime");
    let _guard = rt.enter();

    let network = MockNetwork::new();
    let _server = network.bind(TARGET).expect("bind");
    let registry = SocketRegistry::new(network);
    let _socket = registry.socket_for(TARGET).expect("socket");

    let mut group = c.benchmark_group("socket_for");

    group.bench_function("hit_exact", |b| {
        b.iter(|| registry.socket_for(black_box(TARGET)).expect("socket"));
    });

    group.bench_function("hit_variant", |b| {
        b.iter(|| {
            registry
                .socket_for(black_box(" WS://Example.com:7000/ "))
                .expect("socket")
        });
    });

    group.finish();
}

// ============================================================================
// Benchmark: Fan-out
// ============================================================================

fn bench_emit_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("emit");
    let event = SocketEvent::Message("SampleData".into());

    for &count in SUBSCRIBER_COUNTS {
        let emitter = EventEmitter::<EventKind, SocketEvent>::new();
        let hits = Arc::new(AtomicUsize::new(0));

        for _ in 0..count {
            let hits = Arc::clone(&hits);
            emitter.on_fn(EventKind::Message, move |_: &SocketEvent| {
                hits.fetch_add(1, Ordering::Relaxed);
            });
        }

        group.bench_with_input(BenchmarkId::new("subscribers", count), &count, |b, _| {
            b.iter(|| emitter.emit(black_box(&EventKind::Message), black_box(&event)));
        });
    }

    group.finish();
}

// ============================================================================
// Benchmark: Open Round Trip
// ============================================================================

fn bench_open_round_trip(c: &mut Criterion) {
    let rt = Runtime::new().expect("runtime");

    let network = MockNetwork::new();
    let _server = network.bind(TARGET).expect("bind");
    let registry = SocketRegistry::new(network);

    c.bench_function("open_close_round_trip", |b| {
        b.to_async(&rt).iter(|| async {
            let socket = registry.socket_for(TARGET).expect("socket");
            socket.opened().await.expect("open");
            registry.close_socket_for(TARGET);
            socket.closed().await;
        });
    });
}

criterion_group!(
    benches,
    bench_socket_for_hit,
    bench_emit_fan_out,
    bench_open_round_trip
);
criterion_main!(benches);
