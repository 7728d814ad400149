//! End-to-end fit/transform benchmarks over synthetic frames.
//!
//! Run with: `cargo bench --bench feature_build`

use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

use relprop::config::Hyperparameters;
use relprop::engine::{AggKind, FeatureEngine};
use relprop::frame::{DataFrame, FloatColumn, IntColumn};
use relprop::placeholder::SchemaTree;

fn synthetic_frames(
    population_rows: usize,
    peripheral_rows: usize,
) -> (Arc<DataFrame>, Arc<DataFrame>) {
    let keys: Vec<i64> = (0..population_rows as i64).collect();
    let targets: Vec<f64> = (0..population_rows).map(|i| (i % 13) as f64).collect();

    let mut pop = DataFrame::new("population");
    pop.add_join_key(IntColumn::new("jk", "", keys)).unwrap();
    pop.add_target(FloatColumn::new("y", "", targets)).unwrap();

    let peri_keys: Vec<i64> = (0..peripheral_rows)
        .map(|i| (i % population_rows) as i64)
        .collect();
    let values: Vec<f64> = (0..peripheral_rows)
        .map(|i| ((i * 2_654_435_761) % 1000) as f64 / 10.0)
        .collect();

    let mut peri = DataFrame::new("orders");
    peri.add_join_key(IntColumn::new("jk", "", peri_keys)).unwrap();
    peri.add_numerical(FloatColumn::new("value", "", values)).unwrap();

    (Arc::new(pop), Arc::new(peri))
}

fn fitted_engine(pop: &Arc<DataFrame>, peri: &Arc<DataFrame>, threads: i64) -> FeatureEngine {
    let mut tree = SchemaTree::new("population");
    tree.join_on(tree.root(), "orders", "jk", "jk");
    let mut engine = FeatureEngine::new(
        Hyperparameters {
            aggregations: vec![
                AggKind::Count,
                AggKind::Avg,
                AggKind::Sum,
                AggKind::Min,
                AggKind::Max,
                AggKind::Median,
                AggKind::Stddev,
            ],
            num_threads: threads,
            ..Default::default()
        },
        vec!["orders".to_string()],
        tree,
    )
    .unwrap();
    engine.fit(pop, std::slice::from_ref(peri)).unwrap();
    engine
}

fn bench_transform(c: &mut Criterion) {
    let mut group = c.benchmark_group("transform");
    group.sample_size(20);

    for &threads in &[1i64, 4] {
        let (pop, peri) = synthetic_frames(2_000, 20_000);
        let engine = fitted_engine(&pop, &peri, threads);
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{threads}_threads")),
            &threads,
            |b, _| {
                b.iter(|| {
                    let matrix = engine
                        .transform(&pop, std::slice::from_ref(&peri))
                        .unwrap();
                    black_box(matrix.get(0, 0))
                });
            },
        );
    }
    group.finish();
}

fn bench_fit(c: &mut Criterion) {
    let mut group = c.benchmark_group("fit");
    group.sample_size(10);

    let (pop, peri) = synthetic_frames(1_000, 10_000);
    group.bench_function("single_edge", |b| {
        b.iter(|| {
            let engine = fitted_engine(&pop, &peri, 2);
            black_box(engine.num_features())
        });
    });
    group.finish();
}

criterion_group!(benches, bench_transform, bench_fit);
criterion_main!(benches);
