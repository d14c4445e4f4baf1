//! Benchmarks for tracer transport.
//!
//! Run with: `cargo bench --bench transport_bench`
//!
//! Benchmarks limited horizontal advection and implicit vertical mixing.

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use wq_rs::mesh::TriangularMesh;
use wq_rs::state::Field;
use wq_rs::transport::{ElementVelocity, FluxLimiter, HorizontalAdvection, VerticalDiffusion};
use wq_rs::types::NodeIndex;
use wq_rs::vertical::Layers;

/// Square basin with a rotating flow and a Gaussian tracer blob.
fn setup_problem(n: usize, levels: usize) -> (TriangularMesh, Layers, ElementVelocity, Field) {
    let mesh = TriangularMesh::rectangle_with_depth(n, n, 1000.0, 1000.0, |x, y| {
        8.0 + 2.0 * (x / 300.0).sin() * (y / 300.0).cos()
    })
    .unwrap();
    let layers = Layers::uniform(levels).unwrap();
    let velocity = ElementVelocity::from_fn(&mesh, layers.n_layers(), |x, y, _| {
        (-1e-3 * (y - 500.0), 1e-3 * (x - 500.0))
    });
    let field = Field::from_fn(mesh.n_nodes(), layers.n_layers(), |node, _| {
        let (x, y) = mesh.coordinates(NodeIndex::new(node));
        (-((x - 400.0).powi(2) + (y - 500.0).powi(2)) / 2e4).exp()
    });
    (mesh, layers, velocity, field)
}

/// Benchmark the horizontal tendency for each reconstruction.
fn bench_horizontal(c: &mut Criterion) {
    let mut group = c.benchmark_group("horizontal_advection");

    for n in [16, 32, 64] {
        let (mesh, layers, velocity, field) = setup_problem(n, 6);
        for limiter in [FluxLimiter::FirstOrder, FluxLimiter::MinMax] {
            let advection = HorizontalAdvection::new(limiter);
            group.bench_with_input(
                BenchmarkId::new(format!("{limiter:?}"), format!("{}_nodes", mesh.n_nodes())),
                &n,
                |b, _| {
                    b.iter(|| {
                        advection
                            .tendency(
                                black_box(&mesh),
                                black_box(&layers),
                                black_box(&field),
                                black_box(&velocity),
                                None,
                            )
                            .unwrap()
                    });
                },
            );
        }
    }

    group.finish();
}

/// Benchmark the tridiagonal column solve.
fn bench_vertical_mixing(c: &mut Criterion) {
    let mut group = c.benchmark_group("vertical_mixing");

    for levels in [6, 11, 21] {
        let (mesh, layers, _, field) = setup_problem(32, levels);
        let turbulence = Field::constant(mesh.n_nodes(), layers.n_levels(), 1e-3);
        let diffusion = VerticalDiffusion::default();
        group.bench_with_input(
            BenchmarkId::new("solve", format!("{}_layers", layers.n_layers())),
            &levels,
            |b, _| {
                b.iter(|| {
                    let mut mixed = field.clone();
                    diffusion
                        .solve(&mesh, &layers, black_box(&mut mixed), &turbulence, 600.0)
                        .unwrap();
                    mixed
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_horizontal, bench_vertical_mixing);
criterion_main!(benches);
