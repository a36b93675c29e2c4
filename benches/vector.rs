//! Benchmark for `PersistentVector` vs standard `Vec`.
//!
//! Compares persistent-vector operations against `Vec` for common workloads.

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use keepsake::persistent::PersistentVector;
use std::hint::black_box;

fn benchmark_push_back(criterion: &mut Criterion) {
    let mut group = criterion.benchmark_group("push_back");

    for size in [100, 1000, 10000] {
        group.bench_with_input(
            BenchmarkId::new("PersistentVector", size),
            &size,
            |bencher, &size| {
                bencher.iter(|| {
                    let mut vector = PersistentVector::new();
                    for index in 0..size {
                        vector = vector.push_back(black_box(index));
                    }
                    black_box(vector)
                });
            },
        );

        group.bench_with_input(BenchmarkId::new("Vec", size), &size, |bencher, &size| {
            bencher.iter(|| {
                let mut vector = Vec::new();
                for index in 0..size {
                    vector.push(black_box(index));
                }
                black_box(vector)
            });
        });
    }

    group.finish();
}

fn benchmark_get(criterion: &mut Criterion) {
    let mut group = criterion.benchmark_group("get");

    for size in [100, 1000, 10000] {
        let persistent_vector: PersistentVector<i32> = (0..size).collect();
        let standard_vector: Vec<i32> = (0..size).collect();

        group.bench_with_input(
            BenchmarkId::new("PersistentVector", size),
            &size,
            |bencher, &size| {
                bencher.iter(|| {
                    for index in 0..size as usize {
                        black_box(persistent_vector.get(black_box(index)));
                    }
                });
            },
        );

        group.bench_with_input(BenchmarkId::new("Vec", size), &size, |bencher, &size| {
            bencher.iter(|| {
                for index in 0..size as usize {
                    black_box(standard_vector.get(black_box(index)));
                }
            });
        });
    }

    group.finish();
}

fn benchmark_pop_front(criterion: &mut Criterion) {
    let mut group = criterion.benchmark_group("pop_front");

    for size in [100, 1000] {
        let persistent_vector: PersistentVector<i32> = (0..size).collect();

        group.bench_with_input(
            BenchmarkId::new("PersistentVector", size),
            &size,
            |bencher, _| {
                bencher.iter(|| {
                    let mut vector = persistent_vector.clone();
                    while let Some((rest, element)) = vector.pop_front() {
                        black_box(element);
                        vector = rest;
                    }
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, benchmark_push_back, benchmark_get, benchmark_pop_front);
criterion_main!(benches);
