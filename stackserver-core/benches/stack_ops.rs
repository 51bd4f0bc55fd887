//! Stack and coordinator throughput micro-benchmark.
//!
//! Measures the uncontended cost of a push/pop pair through the bare
//! `BoundedStack` and through the `Coordinator` (occupancy claim included).
//!
//! # Usage
//! ```bash
//! cargo bench --bench stack_ops
//! ```

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use stackserver_core::{BoundedStack, Coordinator, MAX_PAYLOAD_LEN, Payload};
use tokio_util::sync::CancellationToken;

fn payload_of(len: usize) -> Payload {
    Payload::new(vec![0xAB; len]).expect("bench payload within limit")
}

fn bench_stack(c: &mut Criterion) {
    let mut group = c.benchmark_group("bounded_stack");
    for len in [0usize, 16, MAX_PAYLOAD_LEN] {
        let stack = BoundedStack::new(128);
        let payload = payload_of(len);
        group.bench_with_input(BenchmarkId::new("push_pop", len), &payload, |b, p| {
            b.iter(|| {
                stack.push(p.clone()).expect("stack has room");
                stack.pop().expect("stack has an entry")
            });
        });
    }
    group.finish();
}

fn bench_coordinator(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("runtime");
    let coordinator = &Coordinator::new(128);
    let token = &CancellationToken::new();
    let payload = &payload_of(16);

    c.bench_function("coordinator/push_pop", |b| {
        b.to_async(&runtime).iter(|| async move {
            coordinator
                .blocking_push(token, payload.clone())
                .await
                .expect("push");
            coordinator.blocking_pop(token).await.expect("pop")
        });
    });
}

criterion_group!(benches, bench_stack, bench_coordinator);
criterion_main!(benches);
