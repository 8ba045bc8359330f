//! Mean curvature flow contraction and skeleton seeding.
//!
//! A closed surface is shrunk toward its medial axis by repeated implicit
//! curvature-flow steps (Tagliasacchi et al., 2012). Each iteration of
//! [`MeanCurvatureSkeleton`] runs four phases:
//!
//! 1. **Contraction**: solve the least-squares system
//!    `[ω_L L; W_H] x ≈ [0; W_H p]` per coordinate, where `L` is the
//!    cotangent Laplacian. The Laplacian rows pull every vertex toward the
//!    weighted average of its neighbours; the anchor rows keep it close to
//!    its current position.
//! 2. **Collapse**: merge the endpoints of edges shorter than
//!    `edge_length_threshold` where the surface stays manifold.
//! 3. **Split**: cut triangles with an interior angle above `max_angle` at
//!    the foot of the obtuse corner.
//! 4. **Degeneracy detection**: vertices whose surrounding area has vanished
//!    become fixed. Their positions are the skeleton seeds reported by
//!    [`MeanCurvatureSkeleton::fixed_points`], and they are pinned with a
//!    large anchor weight in later steps.
//!
//! The run stops once every vertex is fixed, the area stops changing, or the
//! iteration cap is hit.
//!
//! # Example
//!
//! ```no_run
//! use mcfskel::prelude::*;
//! use mcfskel::algo::skeleton::{ContractionParams, MeanCurvatureSkeleton};
//!
//! let mesh: HalfEdgeMesh = mcfskel::io::load("bunny.ply").unwrap();
//! let params = ContractionParams::for_mesh(&mesh).with_omega_h(0.2);
//!
//! let mut skeleton = MeanCurvatureSkeleton::with_params(mesh, params).unwrap();
//! skeleton.contract().unwrap();
//! mcfskel::io::save_points(skeleton.fixed_points(), "seeds.obj").unwrap();
//! ```
//!
//! # References
//!
//! - Tagliasacchi, A., Alhashim, I., Olson, M., & Zhang, H. (2012).
//!   "Mean curvature skeletons." Computer Graphics Forum (SGP).
//! - Au, O. K.-C., et al. (2008). "Skeleton extraction by mesh contraction."
//!   ACM Transactions on Graphics (SIGGRAPH).

mod contract;
mod degeneracy;
mod driver;
mod params;
mod system;
mod topology;
mod weights;

pub use contract::contract_geometry;
pub use degeneracy::{detect_degeneracies, vertex_areas};
pub use driver::{ContractionState, ConvergenceReason, IterationReport, MeanCurvatureSkeleton};
pub use params::{ContractionParams, EDGE_LENGTH_DIAGONAL_FACTOR};
pub use system::{assemble_lhs, assemble_rhs, LinearSystem};
pub use topology::{collapse_short_edges, iteratively_split_triangles};
pub use weights::{compute_edge_weights, cotangent_at, CotangentWeight, EdgeWeight, UniformWeight};
