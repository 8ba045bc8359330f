//! Benchmarks for the contraction pipeline.

use std::f64::consts::TAU;

use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use mcfskel::algo::skeleton::{compute_edge_weights, CotangentWeight, LinearSystem};
use mcfskel::algo::sparse::{CholeskySolver, ConjugateGradientSolver, LeastSquaresSolver};
use mcfskel::prelude::*;
use nalgebra::Point3;

/// Closed capped cylinder along z.
fn create_tube_mesh(rings: usize, segments: usize) -> HalfEdgeMesh {
    let length = 4.0;
    let radius = 0.5;
    let mut vertices = Vec::with_capacity(rings * segments + 2);
    for k in 0..rings {
        let z = length * k as f64 / (rings - 1) as f64;
        for s in 0..segments {
            let phi = TAU * s as f64 / segments as f64;
            vertices.push(Point3::new(radius * phi.cos(), radius * phi.sin(), z));
        }
    }
    let bottom = vertices.len();
    vertices.push(Point3::new(0.0, 0.0, 0.0));
    let top = vertices.len();
    vertices.push(Point3::new(0.0, 0.0, length));

    let mut faces = Vec::with_capacity(2 * rings * segments);
    for k in 0..rings - 1 {
        for s in 0..segments {
            let a = k * segments + s;
            let b = k * segments + (s + 1) % segments;
            faces.push([a, b, b + segments]);
            faces.push([a, b + segments, a + segments]);
        }
    }
    let last = (rings - 1) * segments;
    for s in 0..segments {
        let next = (s + 1) % segments;
        faces.push([bottom, next, s]);
        faces.push([top, last + s, last + next]);
    }

    build_from_triangles(&vertices, &faces).unwrap()
}

fn bench_weights(c: &mut Criterion) {
    let mut mesh = create_tube_mesh(80, 32);

    let mut group = c.benchmark_group("edge_weights");
    let params = ContractionParams::for_mesh(&mesh);
    group.bench_function("parallel", |b| {
        b.iter(|| compute_edge_weights(&mut mesh, &CotangentWeight, &params))
    });
    let params = params.sequential();
    group.bench_function("sequential", |b| {
        b.iter(|| compute_edge_weights(&mut mesh, &CotangentWeight, &params))
    });
    group.finish();
}

fn bench_factorization(c: &mut Criterion) {
    let mut mesh = create_tube_mesh(80, 32);
    let params = ContractionParams::for_mesh(&mesh);
    compute_edge_weights(&mut mesh, &CotangentWeight, &params);
    let system = LinearSystem::assemble(&mesh, &params);

    let mut group = c.benchmark_group("factor_and_solve");
    group.bench_function("cholesky", |b| {
        let solver = CholeskySolver::default();
        b.iter(|| {
            let (factor, _) = solver.factor(&system.lhs).unwrap();
            solver.solve(&factor, &system.rhs[0]).unwrap()
        })
    });
    group.bench_function("conjugate_gradient", |b| {
        let solver = ConjugateGradientSolver::default();
        b.iter(|| {
            let (factor, _) = solver.factor(&system.lhs).unwrap();
            solver.solve(&factor, &system.rhs[0]).unwrap()
        })
    });
    group.finish();
}

fn bench_step(c: &mut Criterion) {
    let mesh = create_tube_mesh(40, 24);

    c.bench_function("contraction_step_tube_40x24", |b| {
        b.iter_batched(
            || MeanCurvatureSkeleton::new(mesh.clone()).unwrap(),
            |mut skeleton| skeleton.step().unwrap(),
            BatchSize::SmallInput,
        )
    });
}

fn bench_full_run(c: &mut Criterion) {
    let mesh = create_tube_mesh(20, 12);

    let mut group = c.benchmark_group("full_contraction");
    group.sample_size(10);
    group.bench_function("tube_20x12", |b| {
        b.iter_batched(
            || MeanCurvatureSkeleton::new(mesh.clone()).unwrap(),
            |mut skeleton| {
                skeleton.contract().unwrap();
                skeleton.fixed_points().len()
            },
            BatchSize::SmallInput,
        )
    });
    group.finish();
}

criterion_group!(benches, bench_weights, bench_factorization, bench_step, bench_full_run);
criterion_main!(benches);
