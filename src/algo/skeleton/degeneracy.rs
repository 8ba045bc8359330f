//! Detection of vertices that have collapsed onto the skeleton.

use log::debug;
use nalgebra::Point3;
use rayon::prelude::*;

use super::ContractionParams;
use crate::mesh::{HalfEdgeMesh, MeshIndex, VertexId};

/// Total area of the faces around each vertex.
pub fn vertex_areas<I: MeshIndex>(mesh: &HalfEdgeMesh<I>, parallel: bool) -> Vec<f64> {
    let n = mesh.num_vertices();
    if parallel {
        (0..n)
            .into_par_iter()
            .map(|i| mesh.vertex_incident_area(VertexId::new(i)))
            .collect()
    } else {
        (0..n)
            .map(|i| mesh.vertex_incident_area(VertexId::new(i)))
            .collect()
    }
}

/// Fix every free vertex whose incident area is below
/// `params.zero_threshold` and record its position in `fixed_points`.
///
/// Vertices without faces are skipped. Returns the number of newly fixed
/// vertices; a second call without contraction in between returns zero.
pub fn detect_degeneracies<I: MeshIndex>(
    mesh: &mut HalfEdgeMesh<I>,
    params: &ContractionParams,
    fixed_points: &mut Vec<Point3<f64>>,
) -> usize {
    let areas = vertex_areas(mesh, params.parallel);
    let mut newly_fixed = 0;

    for (i, &area) in areas.iter().enumerate() {
        let v = VertexId::new(i);
        if mesh.is_fixed(v) || !mesh.vertex(v).halfedge.is_valid() {
            continue;
        }
        if area < params.zero_threshold && mesh.fix_vertex(v) {
            fixed_points.push(*mesh.position(v));
            newly_fixed += 1;
        }
    }

    debug!(
        "degeneracy: {} newly fixed, {} of {} fixed",
        newly_fixed,
        mesh.num_fixed(),
        mesh.num_vertices()
    );
    newly_fixed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algo::skeleton::tests::icosahedron;

    fn scaled_icosahedron(scale: f64) -> HalfEdgeMesh {
        let mut mesh = icosahedron();
        for i in 0..mesh.num_vertices() {
            let v = VertexId::new(i);
            let p = *mesh.position(v);
            mesh.set_position(v, Point3::from(p.coords * scale));
        }
        mesh
    }

    #[test]
    fn test_nothing_fixed_on_large_mesh() {
        let mut mesh = icosahedron();
        let mut points = Vec::new();
        assert_eq!(detect_degeneracies(&mut mesh, &ContractionParams::default(), &mut points), 0);
        assert!(points.is_empty());
    }

    #[test]
    fn test_tiny_mesh_fully_fixed_once() {
        let mut mesh = scaled_icosahedron(1e-5);
        let params = ContractionParams::default();
        let mut points = Vec::new();

        assert_eq!(detect_degeneracies(&mut mesh, &params, &mut points), 12);
        assert_eq!(points.len(), 12);
        assert_eq!(mesh.num_fixed(), 12);

        // Idempotent.
        assert_eq!(detect_degeneracies(&mut mesh, &params, &mut points), 0);
        assert_eq!(points.len(), 12);
    }

    #[test]
    fn test_recorded_position_matches_vertex() {
        let mut mesh = scaled_icosahedron(1e-5);
        let mut points = Vec::new();
        detect_degeneracies(&mut mesh, &ContractionParams::default().sequential(), &mut points);
        for (i, p) in points.iter().enumerate() {
            assert_eq!(p, mesh.position(VertexId::new(i)));
        }
    }

    #[test]
    fn test_parallel_areas_match() {
        let mesh = icosahedron();
        assert_eq!(vertex_areas(&mesh, true), vertex_areas(&mesh, false));
    }
}
