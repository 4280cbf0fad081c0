//! Dispatch throughput benchmarks for the subscription engine.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use crossbeam_channel::unbounded;
use opfeed::{
    Envelope, EventType, NullTransport, OperationId, RawMessage, SubscriptionConfig,
    SubscriptionManager,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn bench_envelope_parse(c: &mut Criterion) {
    let raw = RawMessage::new(
        json!({
            "type": "task_output",
            "operation_id": 1,
            "callback_id": 7,
            "output": "x".repeat(256),
        })
        .to_string(),
    );

    c.bench_function("envelope_parse", |b| {
        b.iter(|| Envelope::parse(black_box(&raw)).unwrap())
    });
}

/// One message fanned out to a varying number of matching subscribers.
fn bench_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("fan_out");

    for subscribers in [1, 10, 100] {
        group.bench_with_input(
            BenchmarkId::new("subscribers", subscribers),
            &subscribers,
            |b, &count| {
                let (tx, rx) = unbounded();
                let manager = SubscriptionManager::with_operation(
                    Arc::new(NullTransport),
                    rx,
                    OperationId(1),
                );
                let handles: Vec<_> = (0..count)
                    .map(|_| {
                        manager
                            .subscribe(
                                SubscriptionConfig::new(EventType::TaskOutput)
                                    .with_buffer_size(1024),
                            )
                            .unwrap()
                    })
                    .collect();
                let msg = json!({"type": "task_output", "output": "ok"}).to_string();

                b.iter(|| {
                    tx.send(RawMessage::new(msg.clone())).unwrap();
                    for handle in &handles {
                        handle.recv_timeout(Duration::from_secs(1)).unwrap();
                    }
                });

                manager.close().unwrap();
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_envelope_parse, bench_fan_out);
criterion_main!(benches);
