//! Per-edge Laplace-Beltrami weights.
//!
//! The default weighting is the cotangent formula: an interior edge `(i, j)`
//! gets `cot(α) + cot(β)`, where `α` and `β` are the angles opposite the edge
//! in its two incident triangles. Boundary edges get the single cotangent
//! they have.

use rayon::prelude::*;

use nalgebra::Point3;

use super::ContractionParams;
use crate::mesh::{EdgeId, HalfEdgeId, HalfEdgeMesh, MeshIndex};

/// A weighting scheme for the Laplacian rows of the contraction system.
pub trait EdgeWeight: Sync {
    /// Weight of `edge`.
    ///
    /// Triangles with area below `zero_threshold` must not produce a
    /// non-finite weight; `fallback` is the value to use for them.
    fn weight<I: MeshIndex>(
        &self,
        mesh: &HalfEdgeMesh<I>,
        edge: EdgeId<I>,
        zero_threshold: f64,
        fallback: f64,
    ) -> f64;
}

/// Cotangent weights.
#[derive(Debug, Clone, Copy, Default)]
pub struct CotangentWeight;

impl EdgeWeight for CotangentWeight {
    fn weight<I: MeshIndex>(
        &self,
        mesh: &HalfEdgeMesh<I>,
        edge: EdgeId<I>,
        zero_threshold: f64,
        fallback: f64,
    ) -> f64 {
        let he = mesh.edge_halfedge(edge);
        opposite_cotangent(mesh, he, zero_threshold, fallback)
            + opposite_cotangent(mesh, mesh.twin(he), zero_threshold, fallback)
    }
}

/// Every edge weighs one (the graph Laplacian).
#[derive(Debug, Clone, Copy, Default)]
pub struct UniformWeight;

impl EdgeWeight for UniformWeight {
    fn weight<I: MeshIndex>(&self, _: &HalfEdgeMesh<I>, _: EdgeId<I>, _: f64, _: f64) -> f64 {
        1.0
    }
}

/// Cotangent of the angle facing `he` inside its face, or zero on the
/// boundary.
fn opposite_cotangent<I: MeshIndex>(
    mesh: &HalfEdgeMesh<I>,
    he: HalfEdgeId<I>,
    zero_threshold: f64,
    fallback: f64,
) -> f64 {
    if mesh.is_boundary_halfedge(he) {
        return 0.0;
    }
    let a = mesh.position(mesh.origin(he));
    let b = mesh.position(mesh.dest(he));
    let opposite = mesh.position(mesh.dest(mesh.next(he)));
    cotangent_at(opposite, a, b, zero_threshold).unwrap_or(fallback)
}

/// Cotangent of the angle at `apex` in triangle `(apex, b, c)`, or `None`
/// when the triangle area is below `zero_threshold`.
pub fn cotangent_at(
    apex: &Point3<f64>,
    b: &Point3<f64>,
    c: &Point3<f64>,
    zero_threshold: f64,
) -> Option<f64> {
    let ab = b - apex;
    let ac = c - apex;
    let cross_norm = ab.cross(&ac).norm();
    if 0.5 * cross_norm < zero_threshold {
        return None;
    }
    Some(ab.dot(&ac) / cross_norm)
}

/// Recompute and store the weight of every edge.
pub fn compute_edge_weights<I: MeshIndex, W: EdgeWeight>(
    mesh: &mut HalfEdgeMesh<I>,
    weighting: &W,
    params: &ContractionParams,
) {
    let (zero, fallback) = (params.zero_threshold, params.degenerate_cotangent);
    let num_edges = mesh.num_edges();

    let weights: Vec<f64> = {
        let mesh = &*mesh;
        if params.parallel {
            (0..num_edges)
                .into_par_iter()
                .map(|i| weighting.weight(mesh, EdgeId::new(i), zero, fallback))
                .collect()
        } else {
            (0..num_edges)
                .map(|i| weighting.weight(mesh, EdgeId::new(i), zero, fallback))
                .collect()
        }
    };

    for (i, w) in weights.into_iter().enumerate() {
        mesh.edge_mut(EdgeId::new(i)).weight = w;
    }
}
