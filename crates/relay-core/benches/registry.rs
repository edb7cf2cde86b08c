//! Registry benchmarks for relay-core.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use relay_core::{ConnectionId, Registry};

fn populated(members: usize) -> (Registry, Vec<ConnectionId>) {
    let registry = Registry::new();
    let ids: Vec<_> = (0..members)
        .map(|i| ConnectionId::new(format!("conn_{i}")))
        .collect();
    for id in &ids {
        registry.join(id, "room");
    }
    (registry, ids)
}

fn bench_broadcast_targets(c: &mut Criterion) {
    let mut group = c.benchmark_group("broadcast_targets");

    for members in [2, 8, 64] {
        let (registry, ids) = populated(members);
        group.bench_with_input(BenchmarkId::from_parameter(members), &ids[0], |b, id| {
            b.iter(|| registry.broadcast_targets(black_box(id)))
        });
    }

    group.finish();
}

fn bench_join_leave(c: &mut Criterion) {
    let (registry, _ids) = populated(8);
    let id = ConnectionId::new("churn");

    c.bench_function("join_leave", |b| {
        b.iter(|| {
            registry.join(black_box(&id), "room");
            registry.leave(black_box(&id))
        })
    });
}

criterion_group!(benches, bench_broadcast_targets, bench_join_leave);
criterion_main!(benches);
