//! # mcfskel
//!
//! Mean curvature flow contraction of triangle meshes, producing the seed
//! points of a curve skeleton.
//!
//! A closed manifold mesh is stored as a half-edge structure and shrunk by
//! implicit Laplacian smoothing with positional anchors. Between contraction
//! steps, short edges are collapsed and obtuse triangles are split so the
//! surface stays well shaped while it thins. Vertices whose neighbourhood
//! collapses to zero area are fixed in place; their positions are the
//! skeleton seeds.
//!
//! ## Features
//!
//! - **Half-edge data structure**: O(1) adjacency queries with type-safe indices
//! - **Flexible indexing**: Support for 16-bit, 32-bit, and 64-bit indices
//! - **Sparse least squares**: Cholesky on the normal equations, or conjugate gradient
//! - **File formats**: OBJ and PLY (with per-vertex fixed flags)
//!
//! ## Quick Start
//!
//! ```no_run
//! use mcfskel::prelude::*;
//!
//! let mesh: HalfEdgeMesh = mcfskel::io::load("model.obj").unwrap();
//! let mut skeleton = MeanCurvatureSkeleton::new(mesh).unwrap();
//!
//! let reason = skeleton.contract().unwrap();
//! println!("stopped ({}) after {} iterations", reason, skeleton.iteration());
//!
//! mcfskel::io::save_points(skeleton.fixed_points(), "seeds.obj").unwrap();
//! mcfskel::io::save(skeleton.mesh(), "contracted.ply").unwrap();
//! ```
//!
//! ## Running Phases by Hand
//!
//! Each phase of an iteration can also be run on its own:
//!
//! ```no_run
//! use mcfskel::prelude::*;
//!
//! # let mesh: HalfEdgeMesh = mcfskel::io::load("model.obj").unwrap();
//! let params = ContractionParams::for_mesh(&mesh).with_omega_h(0.2);
//! let mut skeleton = MeanCurvatureSkeleton::with_params(mesh, params).unwrap();
//!
//! skeleton.contract_geometry().unwrap();
//! let collapsed = skeleton.collapse_short_edges().unwrap();
//! let split = skeleton.iteratively_split_triangles().unwrap();
//! let fixed = skeleton.detect_degeneracies();
//! println!("collapsed {collapsed}, split {split}, fixed {fixed}");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod algo;
pub mod error;
pub mod io;
pub mod mesh;

/// Prelude module for convenient imports.
///
/// ```
/// use mcfskel::prelude::*;
/// ```
pub mod prelude {
    pub use crate::algo::skeleton::{
        ContractionParams, ContractionState, ConvergenceReason, MeanCurvatureSkeleton,
    };
    pub use crate::algo::sparse::{CholeskySolver, ConjugateGradientSolver, LeastSquaresSolver};
    pub use crate::error::{Result, SkeletonError};
    pub use crate::mesh::{
        build_from_triangles, to_face_vertex, EdgeId, Face, FaceId, HalfEdge, HalfEdgeId,
        HalfEdgeMesh, MeshIndex, Vertex, VertexId,
    };
}

// Re-export nalgebra types for convenience
pub use nalgebra;

#[cfg(test)]
mod tests {
    use super::prelude::*;
    use nalgebra::Point3;

    #[test]
    fn test_tetrahedron_contracts_to_fixed_points() {
        let vertices = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.5, 1.0, 0.0),
            Point3::new(0.5, 0.5, 1.0),
        ];
        let faces = vec![[0, 2, 1], [0, 1, 3], [1, 2, 3], [2, 0, 3]];

        let mesh: HalfEdgeMesh = build_from_triangles(&vertices, &faces).unwrap();
        assert_eq!(mesh.num_halfedges(), 12);
        assert!(mesh.is_valid());
        let initial_area = mesh.surface_area();

        let params = ContractionParams::default().with_max_iterations(200);
        let mut skeleton = MeanCurvatureSkeleton::with_params(mesh, params).unwrap();
        let reason = skeleton.contract().unwrap();

        assert!(skeleton.state().is_terminal());
        assert_eq!(skeleton.state(), &ContractionState::Converged(reason));
        assert!(skeleton.mesh().surface_area() < 0.5 * initial_area);
    }
}
