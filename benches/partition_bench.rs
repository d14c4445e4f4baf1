//! Benchmarks for the equilibrium partition.
//!
//! Run with: `cargo bench --bench partition_bench`

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use wq_rs::biology::{GroupConfig, PartitionConfig, PhytoplanktonArray, equilibrium_split};
use wq_rs::chemistry::Species;
use wq_rs::state::Field;

/// Single root search on a two-group saturating residual.
fn bench_split(c: &mut Criterion) {
    let mut group = c.benchmark_group("equilibrium_split");

    for steps in [5, 10, 50] {
        let config = PartitionConfig::default().with_steps(steps).with_threshold(1e-12);
        group.bench_with_input(BenchmarkId::new("steps", steps), &config, |b, config| {
            b.iter(|| {
                let total = black_box(0.08);
                equilibrium_split(total, config, |x| {
                    x - total + 1.0 / (40.0 + 60.0 * (-100.0 * x).exp())
                        + 0.5 / (45.0 + 50.0 * (-100.0 * x).exp())
                })
            });
        });
    }

    group.finish();
}

/// Quota assignment over every cell of a grid.
fn bench_stoichiometry(c: &mut Criterion) {
    let mut group = c.benchmark_group("stoichiometry");
    let config = PartitionConfig::default();

    for (n_nodes, n_layers) in [(100, 5), (1000, 10)] {
        let mut array = PhytoplanktonArray::new(
            vec![
                GroupConfig::diatom(0).with_initial_carbon(1.0),
                GroupConfig::flagellate(1).with_initial_carbon(0.5),
            ],
            n_nodes,
            n_layers,
        )
        .unwrap();
        let inorganic = Field::from_fn(n_nodes, n_layers, |node, k| 0.02 + 1e-4 * ((node * 7 + k) % 50) as f64);
        let solids = Field::constant(n_nodes, n_layers, 10.0);

        group.bench_with_input(
            BenchmarkId::new("phosphorus", format!("{}_cells", n_nodes * n_layers)),
            &n_nodes,
            |b, _| {
                b.iter(|| {
                    array
                        .stoichiometry(Species::Phosphorus, black_box(&inorganic), 6.0, &solids, &config)
                        .unwrap()
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_split, bench_stoichiometry);
criterion_main!(benches);
