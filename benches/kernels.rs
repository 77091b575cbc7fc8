//! Statistic-kernel benchmarks
//!
//! Row-group reduction dominates reducer CPU time; these benches track it
//! across kernel families and run counts.

use std::sync::Arc;

use arrow::array::{ArrayRef, Float64Array};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sweepstat::kernel::{box_whisker_kernel, conf95_kernel, mean_kernel};

fn run_tables(runs: usize, rows: usize) -> Vec<RecordBatch> {
    let mut rng = StdRng::seed_from_u64(42);
    let schema = Arc::new(Schema::new(vec![Field::new(
        "v",
        DataType::Float64,
        false,
    )]));
    (0..runs)
        .map(|_| {
            let values: Vec<f64> = (0..rows).map(|_| rng.gen_range(-100.0..100.0)).collect();
            RecordBatch::try_new(
                schema.clone(),
                vec![Arc::new(Float64Array::from(values)) as ArrayRef],
            )
            .unwrap()
        })
        .collect()
}

fn bench_kernels(c: &mut Criterion) {
    let mut group = c.benchmark_group("kernels");
    for runs in [8, 32, 128] {
        let tables = run_tables(runs, 1000);
        let refs: Vec<&RecordBatch> = tables.iter().collect();

        group.bench_with_input(BenchmarkId::new("mean", runs), &refs, |b, refs| {
            b.iter(|| mean_kernel(black_box(refs)).unwrap());
        });
        group.bench_with_input(BenchmarkId::new("conf95", runs), &refs, |b, refs| {
            b.iter(|| conf95_kernel(black_box(refs)).unwrap());
        });
        group.bench_with_input(BenchmarkId::new("box_whisker", runs), &refs, |b, refs| {
            b.iter(|| box_whisker_kernel(black_box(refs)).unwrap());
        });
    }
    group.finish();
}

criterion_group!(benches, bench_kernels);
criterion_main!(benches);
