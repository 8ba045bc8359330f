//! Assembly of the contraction least-squares system.
//!
//! For `n` vertices the system has `2n` rows and `n` columns:
//!
//! ```text
//! [ L_ω ]       [ 0       ]
//! [ W_H ] x  =  [ W_H · p ]
//! ```
//!
//! `L_ω` is the weighted Laplacian built from the cached edge weights, with
//! `ω_L` applied to the off-diagonal entries only. `W_H` is
//! diagonal with `ω_H` for free vertices and `1 / zero_threshold` for fixed
//! ones, and `p` is one coordinate channel of the current positions.

use nalgebra::DVector;

use super::ContractionParams;
use crate::algo::sparse::CsrMatrix;
use crate::mesh::{HalfEdgeMesh, MeshIndex, VertexId};

/// Left-hand side and the three right-hand sides of one contraction step.
#[derive(Debug, Clone)]
pub struct LinearSystem {
    /// The `2n × n` system matrix.
    pub lhs: CsrMatrix,
    /// Right-hand sides for x, y and z.
    pub rhs: [DVector<f64>; 3],
}

impl LinearSystem {
    /// Assemble both sides from the mesh's positions and cached weights.
    pub fn assemble<I: MeshIndex>(mesh: &HalfEdgeMesh<I>, params: &ContractionParams) -> Self {
        Self {
            lhs: assemble_lhs(mesh, params),
            rhs: assemble_rhs(mesh, params),
        }
    }

    /// Number of unknowns.
    pub fn num_unknowns(&self) -> usize {
        self.lhs.ncols()
    }
}

/// Anchor weight of a vertex.
#[inline]
fn anchor_weight<I: MeshIndex>(mesh: &HalfEdgeMesh<I>, v: VertexId<I>, params: &ContractionParams) -> f64 {
    if mesh.is_fixed(v) {
        params.fixed_anchor_weight()
    } else {
        params.omega_h
    }
}

/// Build the `2n × n` matrix.
///
/// Row `i` holds `ω_L · w_ij` for every neighbour `j` and `-Σ w_ij` on the
/// diagonal, so rows only sum to zero when `ω_L` is 1. Row `n + i` holds the anchor weight of vertex `i`.
pub fn assemble_lhs<I: MeshIndex>(mesh: &HalfEdgeMesh<I>, params: &ContractionParams) -> CsrMatrix {
    let n = mesh.num_vertices();
    let mut triplets = Vec::with_capacity(2 * mesh.num_halfedges() + 2 * n);

    for v in mesh.vertex_ids() {
        let i = v.index();
        let mut diagonal = 0.0;
        for he in mesh.vertex_halfedges(v) {
            let w = mesh.edge_weight(mesh.edge_of(he));
            triplets.push((i, mesh.dest(he).index(), params.omega_l * w));
            diagonal -= w;
        }
        triplets.push((i, i, diagonal));
        triplets.push((n + i, i, anchor_weight(mesh, v, params)));
    }

    CsrMatrix::from_triplets(2 * n, n, triplets)
}

/// Build the three right-hand sides: zeros, then the anchored coordinates.
pub fn assemble_rhs<I: MeshIndex>(mesh: &HalfEdgeMesh<I>, params: &ContractionParams) -> [DVector<f64>; 3] {
    let n = mesh.num_vertices();
    let mut rhs = [
        DVector::zeros(2 * n),
        DVector::zeros(2 * n),
        DVector::zeros(2 * n),
    ];

    for (v, vertex) in mesh.vertices() {
        let w = anchor_weight(mesh, v, params);
        for (axis, b) in rhs.iter_mut().enumerate() {
            b[n + v.index()] = w * vertex.position[axis];
        }
    }

    rhs
}
