//! Mesh construction utilities.
//!
//! Half-edge meshes are built from face-vertex lists, and every topology
//! change in the contraction pipeline goes back through this path: the mesh
//! is flattened into a [`FaceSoup`], edited there, and rebuilt. Rebuilding
//! hands out fresh dense ids for vertices, edges and faces.

use std::collections::HashMap;

use nalgebra::Point3;

use super::halfedge::{Edge, Face, HalfEdge, HalfEdgeMesh};
use super::index::{EdgeId, FaceId, HalfEdgeId, IndexRemap, MeshIndex, VertexId};
use crate::error::{Result, SkeletonError};

/// Build a half-edge mesh from vertices and triangle faces.
///
/// Faces must be consistently oriented: a directed edge `(a, b)` may appear
/// in at most one face. Vertices not referenced by any face are kept but
/// have no outgoing half-edge.
///
/// # Example
/// ```
/// use mcfskel::mesh::{build_from_triangles, HalfEdgeMesh};
/// use nalgebra::Point3;
///
/// let vertices = vec![
///     Point3::new(0.0, 0.0, 0.0),
///     Point3::new(1.0, 0.0, 0.0),
///     Point3::new(0.5, 1.0, 0.0),
/// ];
/// let faces = vec![[0, 1, 2]];
///
/// let mesh: HalfEdgeMesh = build_from_triangles(&vertices, &faces).unwrap();
/// assert_eq!(mesh.num_vertices(), 3);
/// assert_eq!(mesh.num_edges(), 3);
/// ```
pub fn build_from_triangles<I: MeshIndex>(
    vertices: &[Point3<f64>],
    faces: &[[usize; 3]],
) -> Result<HalfEdgeMesh<I>> {
    if faces.is_empty() {
        return Err(SkeletonError::EmptyMesh);
    }

    for (fi, face) in faces.iter().enumerate() {
        if let Some(&vi) = face.iter().find(|&&vi| vi >= vertices.len()) {
            return Err(SkeletonError::InvalidVertexIndex { face: fi, vertex: vi });
        }
        if face[0] == face[1] || face[1] == face[2] || face[0] == face[2] {
            return Err(SkeletonError::DegenerateFace { face: fi });
        }
    }

    let mut mesh = HalfEdgeMesh::with_capacity(vertices.len(), faces.len());
    for &pos in vertices {
        mesh.add_vertex(pos);
    }

    // Directed edge (v0, v1) -> interior half-edge.
    let mut directed: HashMap<(usize, usize), HalfEdgeId<I>> =
        HashMap::with_capacity(faces.len() * 3);

    for face in faces {
        let base = mesh.num_halfedges();
        let face_id = FaceId::<I>::new(mesh.num_faces());
        mesh.faces.push(Face::new(HalfEdgeId::new(base)));

        for k in 0..3 {
            let he_id = HalfEdgeId::<I>::new(base + k);
            let (a, b) = (face[k], face[(k + 1) % 3]);
            if directed.insert((a, b), he_id).is_some() {
                return Err(SkeletonError::NonManifoldEdge { v0: a, v1: b });
            }

            let mut he = HalfEdge::new();
            he.origin = VertexId::new(a);
            he.next = HalfEdgeId::new(base + (k + 1) % 3);
            he.prev = HalfEdgeId::new(base + (k + 2) % 3);
            he.face = face_id;
            mesh.halfedges.push(he);
            mesh.vertex_mut(VertexId::new(a)).halfedge = he_id;
        }
    }

    // Pair twins in half-edge order so edge and boundary ids are deterministic.
    let num_interior = mesh.num_halfedges();
    for i in 0..num_interior {
        let he = HalfEdgeId::<I>::new(i);
        if mesh.halfedge(he).twin.is_valid() {
            continue;
        }
        let a = mesh.origin(he).index();
        let b = mesh.origin(mesh.next(he)).index();

        let twin = match directed.get(&(b, a)) {
            Some(&twin) => twin,
            None => {
                let boundary = HalfEdgeId::<I>::new(mesh.num_halfedges());
                let mut bhe = HalfEdge::new();
                bhe.origin = VertexId::new(b);
                mesh.halfedges.push(bhe);
                boundary
            }
        };

        let edge = EdgeId::<I>::new(mesh.num_edges());
        mesh.edges.push(Edge::new(he));
        for (h, t) in [(he, twin), (twin, he)] {
            let entry = mesh.halfedge_mut(h);
            entry.twin = t;
            entry.edge = edge;
        }
    }

    link_boundary_loops(&mut mesh);
    fix_boundary_vertex_halfedges(&mut mesh);

    Ok(mesh)
}

/// Link boundary half-edges into loops.
fn link_boundary_loops<I: MeshIndex>(mesh: &mut HalfEdgeMesh<I>) {
    let boundary: Vec<HalfEdgeId<I>> = mesh
        .halfedge_ids()
        .filter(|&he| mesh.is_boundary_halfedge(he))
        .collect();
    if boundary.is_empty() {
        return;
    }

    let outgoing: HashMap<usize, HalfEdgeId<I>> = boundary
        .iter()
        .map(|&he| (mesh.origin(he).index(), he))
        .collect();

    for &he in &boundary {
        let dest = mesh.dest(he).index();
        if let Some(&next) = outgoing.get(&dest) {
            mesh.halfedge_mut(he).next = next;
            mesh.halfedge_mut(next).prev = he;
        }
    }
}

/// Point boundary vertices at their outgoing boundary half-edge so that
/// rotating around them visits every incident face.
fn fix_boundary_vertex_halfedges<I: MeshIndex>(mesh: &mut HalfEdgeMesh<I>) {
    for he in 0..mesh.num_halfedges() {
        let he = HalfEdgeId::<I>::new(he);
        if mesh.is_boundary_halfedge(he) {
            let origin = mesh.origin(he);
            mesh.vertex_mut(origin).halfedge = he;
        }
    }
}

/// Convert a half-edge mesh back to a face-vertex representation.
pub fn to_face_vertex<I: MeshIndex>(mesh: &HalfEdgeMesh<I>) -> (Vec<Point3<f64>>, Vec<[usize; 3]>) {
    let vertices = mesh.vertex_ids().map(|v| *mesh.position(v)).collect();
    let faces = mesh
        .face_ids()
        .map(|f| mesh.face_triangle(f).map(|v| v.index()))
        .collect();
    (vertices, faces)
}

/// Editable face-vertex form of a mesh that keeps per-vertex fixed flags.
///
/// Topology edits work on a soup and then call [`FaceSoup::into_mesh`], which
/// drops unreferenced vertices and rebuilds the connectivity.
#[derive(Debug, Clone, Default)]
pub struct FaceSoup {
    /// Vertex positions.
    pub positions: Vec<Point3<f64>>,
    /// Fixed flag per vertex, parallel to `positions`.
    pub fixed: Vec<bool>,
    /// Triangles as vertex index triples.
    pub faces: Vec<[usize; 3]>,
}

impl FaceSoup {
    /// Flatten a mesh, keeping vertex order and fixed flags.
    pub fn from_mesh<I: MeshIndex>(mesh: &HalfEdgeMesh<I>) -> Self {
        let (positions, faces) = to_face_vertex(mesh);
        let fixed = mesh.vertices().map(|(_, v)| v.fixed).collect();
        Self {
            positions,
            fixed,
            faces,
        }
    }

    /// Append a vertex and return its index.
    pub fn push_vertex(&mut self, position: Point3<f64>, fixed: bool) -> usize {
        self.positions.push(position);
        self.fixed.push(fixed);
        self.positions.len() - 1
    }

    /// Drop faces that reference a repeated vertex, which is what a collapse
    /// leaves behind for the two triangles around the collapsed edge.
    pub fn remove_degenerate_faces(&mut self) -> usize {
        let before = self.faces.len();
        self.faces
            .retain(|f| f[0] != f[1] && f[1] != f[2] && f[0] != f[2]);
        before - self.faces.len()
    }

    /// Remove vertices no face references and renumber the rest densely.
    pub fn compact(&mut self) -> IndexRemap {
        let mut used = vec![false; self.positions.len()];
        for face in &self.faces {
            for &v in face {
                used[v] = true;
            }
        }

        let remap = IndexRemap::from_mask(&used);
        if remap.is_identity() {
            return remap;
        }

        let mut keep = used.iter();
        self.positions.retain(|_| keep.next().copied().unwrap_or(false));
        let mut keep = used.iter();
        self.fixed.retain(|_| keep.next().copied().unwrap_or(false));
        for face in &mut self.faces {
            for v in face.iter_mut() {
                // Referenced vertices always survive the remap.
                *v = remap.get(*v).unwrap_or(*v);
            }
        }
        remap
    }

    /// Compact and rebuild a half-edge mesh, restoring fixed flags.
    pub fn into_mesh<I: MeshIndex>(mut self) -> Result<HalfEdgeMesh<I>> {
        self.compact();
        let mut mesh = build_from_triangles::<I>(&self.positions, &self.faces)?;
        for (i, &fixed) in self.fixed.iter().enumerate() {
            mesh.vertex_mut(VertexId::new(i)).fixed = fixed;
        }
        Ok(mesh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_triangles() -> (Vec<Point3<f64>>, Vec<[usize; 3]>) {
        let vertices = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.5, 1.0, 0.0),
            Point3::new(0.5, -1.0, 0.0),
        ];
        let faces = vec![[0, 1, 2], [1, 0, 3]];
        (vertices, faces)
    }

    #[test]
    fn test_single_triangle() {
        let vertices = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.5, 1.0, 0.0),
        ];
        let mesh: HalfEdgeMesh = build_from_triangles(&vertices, &[[0, 1, 2]]).unwrap();

        assert_eq!(mesh.num_faces(), 1);
        // 3 interior + 3 boundary half-edges
        assert_eq!(mesh.num_halfedges(), 6);
        assert_eq!(mesh.num_edges(), 3);
        assert!(mesh.is_valid());
        assert!(mesh.is_manifold());
        assert!(!mesh.is_closed());
        for v in mesh.vertex_ids() {
            assert!(mesh.is_boundary_vertex(v));
            assert_eq!(mesh.valence(v), 2);
        }
    }

    #[test]
    fn test_two_triangles_share_edge() {
        let (vertices, faces) = two_triangles();
        let mesh: HalfEdgeMesh = build_from_triangles(&vertices, &faces).unwrap();

        assert_eq!(mesh.num_halfedges(), 10);
        assert_eq!(mesh.num_edges(), 5);
        assert!(mesh.is_valid());

        let shared = mesh
            .edge_ids()
            .filter(|&e| mesh.edge_face_count(e) == 2)
            .count();
        assert_eq!(shared, 1);
        assert_eq!(mesh.vertex_faces(VertexId::new(0)).count(), 2);
    }

    #[test]
    fn test_roundtrip() {
        let (vertices, faces) = two_triangles();
        let mesh: HalfEdgeMesh = build_from_triangles(&vertices, &faces).unwrap();
        let (out_verts, out_faces) = to_face_vertex(&mesh);

        assert_eq!(out_faces, faces);
        for (a, b) in vertices.iter().zip(out_verts.iter()) {
            assert!((a - b).norm() < 1e-12);
        }
    }

    #[test]
    fn test_invalid_vertex_index() {
        let vertices = vec![Point3::new(0.0, 0.0, 0.0)];
        let result: Result<HalfEdgeMesh> = build_from_triangles(&vertices, &[[0, 1, 2]]);
        assert!(matches!(
            result,
            Err(SkeletonError::InvalidVertexIndex { face: 0, vertex: 1 })
        ));
    }

    #[test]
    fn test_degenerate_face() {
        let (vertices, _) = two_triangles();
        let result: Result<HalfEdgeMesh> = build_from_triangles(&vertices, &[[0, 0, 2]]);
        assert!(matches!(result, Err(SkeletonError::DegenerateFace { face: 0 })));
    }

    #[test]
    fn test_duplicate_directed_edge_rejected() {
        let (vertices, _) = two_triangles();
        // Both faces traverse 0 -> 1.
        let result: Result<HalfEdgeMesh> = build_from_triangles(&vertices, &[[0, 1, 2], [0, 1, 3]]);
        assert!(matches!(
            result,
            Err(SkeletonError::NonManifoldEdge { v0: 0, v1: 1 })
        ));
    }

    #[test]
    fn test_soup_compaction_keeps_fixed_flags() {
        let (vertices, faces) = two_triangles();
        let mut mesh: HalfEdgeMesh = build_from_triangles(&vertices, &faces).unwrap();
        mesh.fix_vertex(VertexId::new(3));

        let mut soup = FaceSoup::from_mesh(&mesh);
        // Merge vertex 2 into vertex 0: the first face becomes degenerate.
        for face in &mut soup.faces {
            for v in face.iter_mut() {
                if *v == 2 {
                    *v = 0;
                }
            }
        }
        assert_eq!(soup.remove_degenerate_faces(), 1);

        let rebuilt: HalfEdgeMesh = soup.into_mesh().unwrap();
        assert_eq!(rebuilt.num_vertices(), 3);
        assert_eq!(rebuilt.num_faces(), 1);
        // Old vertex 3 moved down to index 2.
        assert!(rebuilt.is_fixed(VertexId::new(2)));
        assert_eq!(rebuilt.num_fixed(), 1);
    }

    #[test]
    fn test_compact_reports_new_indices() {
        let (vertices, faces) = two_triangles();
        let mesh: HalfEdgeMesh = build_from_triangles(&vertices, &faces).unwrap();
        let mut soup = FaceSoup::from_mesh(&mesh);
        soup.faces.truncate(1);

        let remap = soup.compact();
        assert_eq!(remap.len(), 3);
        assert_eq!(remap.get(3), None);
        assert_eq!(soup.positions.len(), 3);
        assert_eq!(soup.fixed.len(), 3);
        assert_eq!(soup.faces, vec![[0, 1, 2]]);
        assert!(soup.compact().is_identity());
    }
}
