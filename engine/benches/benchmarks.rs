//! Performance benchmarks for replikit-engine: the hot paths named by
//! the module budget (vector-clock comparison, put).

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use replikit_engine::backend::MemoryBackend;
use replikit_engine::clock::VectorClock;
use replikit_engine::state_machine;
use serde_json::json;

fn bench_clock_comparison(c: &mut Criterion) {
    let mut group = c.benchmark_group("vector_clock");

    group.bench_function("parse", |b| {
        b.iter(|| VectorClock::parse(black_box("A:3|B:7|C:1|D:12")))
    });

    for size in [2, 10, 50].iter() {
        let left = build_clock(*size, 1);
        let right = build_clock(*size, 1);
        group.bench_with_input(BenchmarkId::new("compare_equal", size), size, |b, _| {
            b.iter(|| black_box(&left).compare(black_box(&right)))
        });

        let right_concurrent = build_clock(*size, 2);
        group.bench_with_input(BenchmarkId::new("compare_concurrent", size), size, |b, _| {
            b.iter(|| black_box(&left).compare(black_box(&right_concurrent)))
        });

        group.bench_with_input(BenchmarkId::new("maximize", size), size, |b, _| {
            b.iter(|| black_box(&left).maximize(black_box(&right_concurrent)))
        });
    }

    group.finish();
}

fn build_clock(replicas: usize, base_gen: u64) -> VectorClock {
    let serialized = (0..replicas)
        .map(|i| format!("R{i:03}:{}", base_gen + i as u64))
        .collect::<Vec<_>>()
        .join("|");
    VectorClock::parse(&serialized).unwrap()
}

fn bench_put(c: &mut Criterion) {
    let mut group = c.benchmark_group("put");

    group.bench_function("insert_into_empty", |b| {
        b.iter(|| {
            let backend = MemoryBackend::new();
            backend
                .transaction(|txn| {
                    state_machine::put(
                        txn,
                        "A",
                        "doc-1",
                        VectorClock::parse("A:1").unwrap(),
                        Some(json!({"x": 1})),
                        false,
                        None,
                    )
                })
                .unwrap()
        })
    });

    for conflict_count in [1, 10, 50].iter() {
        group.bench_with_input(
            BenchmarkId::new("with_existing_conflicts", conflict_count),
            conflict_count,
            |b, &conflict_count| {
                b.iter(|| {
                    let backend = MemoryBackend::new();
                    backend
                        .transaction(|txn| {
                            state_machine::put(
                                txn,
                                "A",
                                "doc-1",
                                VectorClock::parse("A:1").unwrap(),
                                Some(json!({"x": 0})),
                                false,
                                None,
                            )
                        })
                        .unwrap();
                    for i in 0..conflict_count {
                        let replica = format!("R{i}");
                        let _ = backend.transaction(|txn| {
                            state_machine::put(
                                txn,
                                &replica,
                                "doc-1",
                                VectorClock::parse(&format!("{replica}:1")).unwrap(),
                                Some(json!({"x": i})),
                                true,
                                None,
                            )
                        });
                    }
                    backend
                        .transaction(|txn| {
                            state_machine::put(
                                txn,
                                "A",
                                "doc-1",
                                VectorClock::parse("A:2").unwrap(),
                                Some(json!({"x": 999})),
                                true,
                                None,
                            )
                        })
                        .unwrap()
                })
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_clock_comparison, bench_put);
criterion_main!(benches);
