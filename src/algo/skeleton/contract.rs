//! One implicit mean-curvature-flow step.

use log::debug;
use nalgebra::{DVector, Point3};

use super::system::LinearSystem;
use super::weights::{compute_edge_weights, EdgeWeight};
use super::ContractionParams;
use crate::algo::sparse::{FactorDiagnostic, LeastSquaresSolver};
use crate::error::{Result, SkeletonError};
use crate::mesh::{HalfEdgeMesh, MeshIndex, VertexId};

/// Contract the mesh by one least-squares step.
///
/// Recomputes the edge weights, assembles the system, factors it once and
/// solves the three coordinate channels. Positions of free vertices are
/// replaced by the solution; fixed vertices keep theirs.
///
/// On error no position has been changed. The edge weight cache is
/// refreshed either way.
pub fn contract_geometry<I, W, S>(
    mesh: &mut HalfEdgeMesh<I>,
    params: &ContractionParams,
    weighting: &W,
    solver: &S,
) -> Result<FactorDiagnostic>
where
    I: MeshIndex,
    W: EdgeWeight,
    S: LeastSquaresSolver,
{
    params.validate()?;
    if mesh.num_faces() == 0 {
        return Err(SkeletonError::EmptyMesh);
    }

    compute_edge_weights(mesh, weighting, params);
    let system = LinearSystem::assemble(mesh, params);

    let (factorization, diagnostic) = solver.factor(&system.lhs)?;
    let solution = system
        .rhs
        .iter()
        .map(|b| solver.solve(&factorization, b))
        .collect::<Result<Vec<DVector<f64>>>>()?;

    let mut moved = 0;
    for i in 0..mesh.num_vertices() {
        let v = VertexId::new(i);
        if mesh.is_fixed(v) {
            continue;
        }
        mesh.set_position(v, Point3::new(solution[0][i], solution[1][i], solution[2][i]));
        moved += 1;
    }

    debug!(
        "contract: {} of {} vertices moved, log det {:?}",
        moved,
        mesh.num_vertices(),
        diagnostic.log_determinant
    );

    Ok(diagnostic)
}
