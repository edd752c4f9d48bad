use std::hint::black_box;
use std::sync::Arc;

use criterion::{criterion_group, criterion_main, Criterion};

use aquad::benchmark::integrands::{LogOverSqrt, Oscillatory};
use aquad::{
    AdaptiveTree, ParamCollection, ParamMap, QuadratureTables, SharedIntegrand, TreeBatch,
    TreeConfig,
};

fn tree_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("Adaptive tree");
    let tables = QuadratureTables::generated(&[5, 10]);

    let singular: SharedIntegrand = Arc::new(LogOverSqrt);
    let singular_config = TreeConfig::new(0.0, 1.0, 1e-10).singular_lower(0.5);
    group.bench_function("ln(t)/sqrt(t), singular lower bound", |b| {
        b.iter(|| {
            AdaptiveTree::new(
                black_box(singular_config.clone()),
                tables.clone(),
                singular.clone(),
                ParamMap::new(),
            )
        })
    });

    let oscillatory: SharedIntegrand = Arc::new(Oscillatory);
    let params = ParamMap::new().with("k", 50.0);
    let config = TreeConfig::new(0.0, 1.0, 1e-10).with_depths(0, 16);
    group.bench_function("cos(50 t)", |b| {
        b.iter(|| {
            AdaptiveTree::new(
                black_box(config.clone()),
                tables.clone(),
                oscillatory.clone(),
                params.clone(),
            )
        })
    });
    group.finish();

    let mut group2 = c.benchmark_group("Tree batch");
    let grid = ParamCollection::new().with("k", (1..=64).map(f64::from).collect::<Vec<_>>());
    group2.bench_function("64 x cos(k t) (Rayon)", |b| {
        b.iter(|| {
            TreeBatch::new(
                config.clone(),
                tables.clone(),
                oscillatory.clone(),
                black_box(grid.clone()),
            )
        })
    });

    let batch = TreeBatch::new(config, tables, oscillatory, grid).unwrap();
    group2.bench_function("64 x cos(k t) to JSON", |b| {
        b.iter(|| black_box(&batch).to_json_string(true, true))
    });
    group2.finish();
}

criterion_group!(benches, tree_benchmark);
criterion_main!(benches);
