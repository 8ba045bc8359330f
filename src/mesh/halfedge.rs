//! Half-edge mesh data structure.
//!
//! Vertices, half-edges, full edges and faces live in dense arenas addressed
//! by the typed ids from [`super::index`]. Besides connectivity and positions
//! the mesh carries the per-element state the contraction phases share:
//!
//! - [`Vertex::fixed`], set once a vertex has reached the skeleton;
//! - [`Edge::weight`], the Laplace-Beltrami weight cached by the last
//!   contraction step.
//!
//! Boundary half-edges have an invalid face id. Closed input is the common
//! case; meshes with boundary are accepted and their boundary edges only see
//! one incident triangle.

use nalgebra::{Point3, Vector3};

use super::index::{EdgeId, FaceId, HalfEdgeId, MeshIndex, VertexId};

/// A vertex in the half-edge mesh.
#[derive(Debug, Clone)]
pub struct Vertex<I: MeshIndex = u32> {
    /// The 3D position of this vertex.
    pub position: Point3<f64>,

    /// One outgoing half-edge from this vertex.
    /// For boundary vertices, this is a boundary half-edge.
    pub halfedge: HalfEdgeId<I>,

    /// Whether this vertex has been committed to the skeleton.
    pub fixed: bool,
}

impl<I: MeshIndex> Vertex<I> {
    /// Create a new free vertex at the given position.
    pub fn new(position: Point3<f64>) -> Self {
        Self {
            position,
            halfedge: HalfEdgeId::invalid(),
            fixed: false,
        }
    }
}

/// A half-edge in the mesh.
#[derive(Debug, Clone, Copy)]
pub struct HalfEdge<I: MeshIndex = u32> {
    /// The vertex this half-edge originates from.
    pub origin: VertexId<I>,

    /// The opposite half-edge.
    pub twin: HalfEdgeId<I>,

    /// The next half-edge around the face (counter-clockwise).
    pub next: HalfEdgeId<I>,

    /// The previous half-edge around the face.
    pub prev: HalfEdgeId<I>,

    /// The face this half-edge belongs to. Invalid on the boundary.
    pub face: FaceId<I>,

    /// The full edge this half-edge is one side of.
    pub edge: EdgeId<I>,
}

impl<I: MeshIndex> HalfEdge<I> {
    /// Create a new unlinked half-edge.
    pub fn new() -> Self {
        Self {
            origin: VertexId::invalid(),
            twin: HalfEdgeId::invalid(),
            next: HalfEdgeId::invalid(),
            prev: HalfEdgeId::invalid(),
            face: FaceId::invalid(),
            edge: EdgeId::invalid(),
        }
    }

    /// Check if this half-edge is on the boundary.
    #[inline]
    pub fn is_boundary(&self) -> bool {
        !self.face.is_valid()
    }
}

impl<I: MeshIndex> Default for HalfEdge<I> {
    fn default() -> Self {
        Self::new()
    }
}

/// A full (undirected) edge.
#[derive(Debug, Clone, Copy)]
pub struct Edge<I: MeshIndex = u32> {
    /// One of the two half-edges of this edge.
    pub halfedge: HalfEdgeId<I>,

    /// Cached Laplace-Beltrami weight. Only meaningful right after a
    /// contraction step has recomputed it.
    pub weight: f64,
}

impl<I: MeshIndex> Edge<I> {
    /// Create an edge with a zero weight.
    pub fn new(halfedge: HalfEdgeId<I>) -> Self {
        Self {
            halfedge,
            weight: 0.0,
        }
    }
}

/// A triangular face.
#[derive(Debug, Clone, Copy)]
pub struct Face<I: MeshIndex = u32> {
    /// One half-edge on the boundary of this face.
    pub halfedge: HalfEdgeId<I>,
}

impl<I: MeshIndex> Face<I> {
    /// Create a new face with the given half-edge.
    pub fn new(halfedge: HalfEdgeId<I>) -> Self {
        Self { halfedge }
    }
}

/// A half-edge triangle mesh.
#[derive(Debug, Clone)]
pub struct HalfEdgeMesh<I: MeshIndex = u32> {
    pub(crate) vertices: Vec<Vertex<I>>,
    pub(crate) halfedges: Vec<HalfEdge<I>>,
    pub(crate) edges: Vec<Edge<I>>,
    pub(crate) faces: Vec<Face<I>>,
}

impl<I: MeshIndex> Default for HalfEdgeMesh<I> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I: MeshIndex> HalfEdgeMesh<I> {
    /// Create a new empty mesh.
    pub fn new() -> Self {
        Self {
            vertices: Vec::new(),
            halfedges: Vec::new(),
            edges: Vec::new(),
            faces: Vec::new(),
        }
    }

    /// Create a mesh with pre-allocated capacity.
    pub fn with_capacity(num_vertices: usize, num_faces: usize) -> Self {
        // Closed triangle mesh: E = 3F/2, HE = 3F. Leave some slack for boundary.
        let num_edges = num_faces * 3 / 2 + num_faces / 4;
        Self {
            vertices: Vec::with_capacity(num_vertices),
            halfedges: Vec::with_capacity(num_edges * 2),
            edges: Vec::with_capacity(num_edges),
            faces: Vec::with_capacity(num_faces),
        }
    }

    // ==================== Accessors ====================

    /// Get the number of vertices.
    #[inline]
    pub fn num_vertices(&self) -> usize {
        self.vertices.len()
    }

    /// Get the number of half-edges.
    #[inline]
    pub fn num_halfedges(&self) -> usize {
        self.halfedges.len()
    }

    /// Get the number of full edges.
    #[inline]
    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    /// Get the number of faces.
    #[inline]
    pub fn num_faces(&self) -> usize {
        self.faces.len()
    }

    /// Get a vertex by ID.
    #[inline]
    pub fn vertex(&self, id: VertexId<I>) -> &Vertex<I> {
        &self.vertices[id.index()]
    }

    /// Get a mutable vertex by ID.
    #[inline]
    pub fn vertex_mut(&mut self, id: VertexId<I>) -> &mut Vertex<I> {
        &mut self.vertices[id.index()]
    }

    /// Get a half-edge by ID.
    #[inline]
    pub fn halfedge(&self, id: HalfEdgeId<I>) -> &HalfEdge<I> {
        &self.halfedges[id.index()]
    }

    /// Get a mutable half-edge by ID.
    #[inline]
    pub fn halfedge_mut(&mut self, id: HalfEdgeId<I>) -> &mut HalfEdge<I> {
        &mut self.halfedges[id.index()]
    }

    /// Get an edge by ID.
    #[inline]
    pub fn edge(&self, id: EdgeId<I>) -> &Edge<I> {
        &self.edges[id.index()]
    }

    /// Get a mutable edge by ID.
    #[inline]
    pub fn edge_mut(&mut self, id: EdgeId<I>) -> &mut Edge<I> {
        &mut self.edges[id.index()]
    }

    /// Get a face by ID.
    #[inline]
    pub fn face(&self, id: FaceId<I>) -> &Face<I> {
        &self.faces[id.index()]
    }

    /// Get the position of a vertex.
    #[inline]
    pub fn position(&self, v: VertexId<I>) -> &Point3<f64> {
        &self.vertex(v).position
    }

    /// Set the position of a vertex.
    #[inline]
    pub fn set_position(&mut self, v: VertexId<I>, pos: Point3<f64>) {
        self.vertex_mut(v).position = pos;
    }

    /// Whether a vertex is fixed.
    #[inline]
    pub fn is_fixed(&self, v: VertexId<I>) -> bool {
        self.vertex(v).fixed
    }

    /// Mark a vertex as fixed. Returns true if it was free before.
    pub fn fix_vertex(&mut self, v: VertexId<I>) -> bool {
        let vertex = self.vertex_mut(v);
        let was_free = !vertex.fixed;
        vertex.fixed = true;
        was_free
    }

    /// Number of fixed vertices.
    pub fn num_fixed(&self) -> usize {
        self.vertices.iter().filter(|v| v.fixed).count()
    }

    /// Cached weight of an edge.
    #[inline]
    pub fn edge_weight(&self, e: EdgeId<I>) -> f64 {
        self.edge(e).weight
    }

    // ==================== Topology Queries ====================

    /// Get the twin (opposite) half-edge.
    #[inline]
    pub fn twin(&self, he: HalfEdgeId<I>) -> HalfEdgeId<I> {
        self.halfedge(he).twin
    }

    /// Get the next half-edge around the face.
    #[inline]
    pub fn next(&self, he: HalfEdgeId<I>) -> HalfEdgeId<I> {
        self.halfedge(he).next
    }

    /// Get the previous half-edge around the face.
    #[inline]
    pub fn prev(&self, he: HalfEdgeId<I>) -> HalfEdgeId<I> {
        self.halfedge(he).prev
    }

    /// Get the origin vertex of a half-edge.
    #[inline]
    pub fn origin(&self, he: HalfEdgeId<I>) -> VertexId<I> {
        self.halfedge(he).origin
    }

    /// Get the destination vertex of a half-edge.
    #[inline]
    pub fn dest(&self, he: HalfEdgeId<I>) -> VertexId<I> {
        self.origin(self.twin(he))
    }

    /// Get the face of a half-edge.
    #[inline]
    pub fn face_of(&self, he: HalfEdgeId<I>) -> FaceId<I> {
        self.halfedge(he).face
    }

    /// Get the full edge of a half-edge.
    #[inline]
    pub fn edge_of(&self, he: HalfEdgeId<I>) -> EdgeId<I> {
        self.halfedge(he).edge
    }

    /// Get the representative half-edge of a full edge.
    #[inline]
    pub fn edge_halfedge(&self, e: EdgeId<I>) -> HalfEdgeId<I> {
        self.edge(e).halfedge
    }

    /// Get the two endpoints of a full edge.
    pub fn edge_vertices(&self, e: EdgeId<I>) -> [VertexId<I>; 2] {
        let he = self.edge_halfedge(e);
        [self.origin(he), self.dest(he)]
    }

    /// Check if a half-edge is on the boundary.
    #[inline]
    pub fn is_boundary_halfedge(&self, he: HalfEdgeId<I>) -> bool {
        self.halfedge(he).is_boundary()
    }

    /// Check if a full edge lies on the boundary.
    pub fn is_boundary_edge(&self, e: EdgeId<I>) -> bool {
        let he = self.edge_halfedge(e);
        self.is_boundary_halfedge(he) || self.is_boundary_halfedge(self.twin(he))
    }

    /// Check if a vertex is on the boundary.
    pub fn is_boundary_vertex(&self, v: VertexId<I>) -> bool {
        if !self.vertex(v).halfedge.is_valid() {
            return true;
        }
        self.vertex_halfedges(v).any(|he| self.is_boundary_halfedge(he))
    }

    /// Number of incident faces (1 or 2) of a full edge.
    pub fn edge_face_count(&self, e: EdgeId<I>) -> usize {
        let he = self.edge_halfedge(e);
        [he, self.twin(he)]
            .iter()
            .filter(|&&h| !self.is_boundary_halfedge(h))
            .count()
    }

    // ==================== Iteration ====================

    /// Iterate over all vertex IDs.
    pub fn vertex_ids(&self) -> impl Iterator<Item = VertexId<I>> + '_ {
        (0..self.vertices.len()).map(VertexId::new)
    }

    /// Iterate over all vertices with their IDs.
    pub fn vertices(&self) -> impl Iterator<Item = (VertexId<I>, &Vertex<I>)> + '_ {
        self.vertices
            .iter()
            .enumerate()
            .map(|(i, v)| (VertexId::new(i), v))
    }

    /// Iterate over all half-edge IDs.
    pub fn halfedge_ids(&self) -> impl Iterator<Item = HalfEdgeId<I>> + '_ {
        (0..self.halfedges.len()).map(HalfEdgeId::new)
    }

    /// Iterate over all full-edge IDs.
    pub fn edge_ids(&self) -> impl Iterator<Item = EdgeId<I>> + '_ {
        (0..self.edges.len()).map(EdgeId::new)
    }

    /// Iterate over all face IDs.
    pub fn face_ids(&self) -> impl Iterator<Item = FaceId<I>> + '_ {
        (0..self.faces.len()).map(FaceId::new)
    }

    /// Iterate over outgoing half-edges around a vertex.
    pub fn vertex_halfedges(&self, v: VertexId<I>) -> VertexHalfEdgeIter<'_, I> {
        VertexHalfEdgeIter::new(self, v)
    }

    /// Iterate over vertices adjacent to a vertex.
    pub fn vertex_neighbors(&self, v: VertexId<I>) -> impl Iterator<Item = VertexId<I>> + '_ {
        self.vertex_halfedges(v).map(|he| self.dest(he))
    }

    /// Iterate over faces adjacent to a vertex.
    pub fn vertex_faces(&self, v: VertexId<I>) -> impl Iterator<Item = FaceId<I>> + '_ {
        self.vertex_halfedges(v)
            .map(|he| self.face_of(he))
            .filter(|f| f.is_valid())
    }

    /// Get the three vertices of a triangular face.
    pub fn face_triangle(&self, f: FaceId<I>) -> [VertexId<I>; 3] {
        let he0 = self.face(f).halfedge;
        let he1 = self.next(he0);
        let he2 = self.next(he1);
        [self.origin(he0), self.origin(he1), self.origin(he2)]
    }

    /// Get the positions of the three vertices of a triangular face.
    pub fn face_positions(&self, f: FaceId<I>) -> [Point3<f64>; 3] {
        let [v0, v1, v2] = self.face_triangle(f);
        [*self.position(v0), *self.position(v1), *self.position(v2)]
    }

    // ==================== Geometry ====================

    /// Compute the (unnormalized, area-scaled) normal of a face.
    pub fn face_area_normal(&self, f: FaceId<I>) -> Vector3<f64> {
        let [p0, p1, p2] = self.face_positions(f);
        (p1 - p0).cross(&(p2 - p0))
    }

    /// Compute the area of a face.
    pub fn face_area(&self, f: FaceId<I>) -> f64 {
        0.5 * self.face_area_normal(f).norm()
    }

    /// Total area of the faces around a vertex.
    pub fn vertex_incident_area(&self, v: VertexId<I>) -> f64 {
        self.vertex_faces(v).map(|f| self.face_area(f)).sum()
    }

    /// Compute the length of a half-edge.
    pub fn halfedge_length(&self, he: HalfEdgeId<I>) -> f64 {
        (self.position(self.dest(he)) - self.position(self.origin(he))).norm()
    }

    /// Compute the length of a full edge.
    pub fn edge_length(&self, e: EdgeId<I>) -> f64 {
        self.halfedge_length(self.edge_halfedge(e))
    }

    /// Compute the valence (degree) of a vertex.
    pub fn valence(&self, v: VertexId<I>) -> usize {
        self.vertex_halfedges(v).count()
    }

    /// Compute the bounding box of the mesh.
    pub fn bounding_box(&self) -> Option<(Point3<f64>, Point3<f64>)> {
        let first = self.vertices.first()?.position;
        let (min, max) = self.vertices.iter().fold((first, first), |(mut lo, mut hi), v| {
            for i in 0..3 {
                lo[i] = lo[i].min(v.position[i]);
                hi[i] = hi[i].max(v.position[i]);
            }
            (lo, hi)
        });
        Some((min, max))
    }

    /// Length of the bounding-box diagonal, or zero for an empty mesh.
    pub fn bounding_box_diagonal(&self) -> f64 {
        self.bounding_box()
            .map(|(min, max)| (max - min).norm())
            .unwrap_or(0.0)
    }

    /// Compute the total surface area of the mesh.
    pub fn surface_area(&self) -> f64 {
        self.face_ids().map(|f| self.face_area(f)).sum()
    }

    // ==================== Construction ====================

    /// Add a new vertex and return its ID.
    pub fn add_vertex(&mut self, position: Point3<f64>) -> VertexId<I> {
        let id = VertexId::new(self.vertices.len());
        self.vertices.push(Vertex::new(position));
        id
    }

    // ==================== Validation ====================

    /// Check if all connectivity is consistent.
    pub fn is_valid(&self) -> bool {
        for (vid, v) in self.vertices() {
            if v.halfedge.is_valid() && self.halfedge(v.halfedge).origin != vid {
                return false;
            }
        }

        for (i, he) in self.halfedges.iter().enumerate() {
            let heid = HalfEdgeId::new(i);
            if !he.twin.is_valid() || self.halfedge(he.twin).twin != heid {
                return false;
            }
            if he.next.is_valid() && self.halfedge(he.next).prev != heid {
                return false;
            }
            if he.prev.is_valid() && self.halfedge(he.prev).next != heid {
                return false;
            }
            if !he.edge.is_valid() || self.halfedge(he.twin).edge != he.edge {
                return false;
            }
        }

        for e in self.edge_ids() {
            if self.edge_of(self.edge_halfedge(e)) != e {
                return false;
            }
        }

        self.faces.iter().all(|f| f.halfedge.is_valid())
    }

    /// Check that every edge has two incident faces, or one if the mesh has
    /// boundary and the edge lies on it, and that the faces around each
    /// vertex form a single fan.
    pub fn is_manifold(&self) -> bool {
        if !self.is_valid() {
            return false;
        }
        let edges_ok = self.edge_ids().all(|e| match self.edge_face_count(e) {
            2 => true,
            1 => self.is_boundary_edge(e),
            _ => false,
        });
        if !edges_ok {
            return false;
        }

        let mut outgoing = vec![0usize; self.num_vertices()];
        for he in &self.halfedges {
            outgoing[he.origin.index()] += 1;
        }
        // A vertex joining two fans (a bowtie) only circulates one of them.
        self.vertex_ids()
            .all(|v| self.vertex_halfedges(v).take(outgoing[v.index()] + 1).count() == outgoing[v.index()])
    }

    /// True if no half-edge lies on the boundary.
    pub fn is_closed(&self) -> bool {
        self.halfedges.iter().all(|he| !he.is_boundary())
    }
}

/// Iterator over outgoing half-edges around a vertex.
pub struct VertexHalfEdgeIter<'a, I: MeshIndex = u32> {
    mesh: &'a HalfEdgeMesh<I>,
    start: HalfEdgeId<I>,
    current: HalfEdgeId<I>,
    done: bool,
}

impl<'a, I: MeshIndex> VertexHalfEdgeIter<'a, I> {
    fn new(mesh: &'a HalfEdgeMesh<I>, v: VertexId<I>) -> Self {
        let start = mesh.vertex(v).halfedge;
        Self {
            mesh,
            start,
            current: start,
            done: !start.is_valid(),
        }
    }
}

impl<'a, I: MeshIndex> Iterator for VertexHalfEdgeIter<'a, I> {
    type Item = HalfEdgeId<I>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let result = self.current;

        // twin(he) ends at v; the half-edge after it in its face leaves v again.
        let next = self.mesh.next(self.mesh.twin(self.current));
        if next == self.start || !next.is_valid() {
            self.done = true;
        }
        self.current = next;

        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::build_from_triangles;

    fn tetrahedron() -> HalfEdgeMesh {
        let vertices = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.5, 1.0, 0.0),
            Point3::new(0.5, 0.5, 1.0),
        ];
        let faces = vec![[0, 2, 1], [0, 1, 3], [1, 2, 3], [2, 0, 3]];
        build_from_triangles(&vertices, &faces).unwrap()
    }

    #[test]
    fn test_empty_mesh() {
        let mesh = HalfEdgeMesh::<u32>::new();
        assert_eq!(mesh.num_vertices(), 0);
        assert_eq!(mesh.num_edges(), 0);
        assert!(mesh.is_valid());
        assert!(mesh.bounding_box().is_none());
        assert_eq!(mesh.bounding_box_diagonal(), 0.0);
    }

    #[test]
    fn test_edges_pair_twins() {
        let mesh = tetrahedron();
        assert_eq!(mesh.num_edges(), 6);
        assert_eq!(mesh.num_halfedges(), 12);
        for e in mesh.edge_ids() {
            let he = mesh.edge_halfedge(e);
            assert_eq!(mesh.edge_of(he), e);
            assert_eq!(mesh.edge_of(mesh.twin(he)), e);
            assert_eq!(mesh.edge_face_count(e), 2);
        }
        assert!(mesh.is_manifold());
        assert!(mesh.is_closed());
    }

    #[test]
    fn test_fix_vertex_once() {
        let mut mesh = tetrahedron();
        let v = VertexId::new(2);
        assert!(!mesh.is_fixed(v));
        assert!(mesh.fix_vertex(v));
        assert!(!mesh.fix_vertex(v));
        assert!(mesh.is_fixed(v));
        assert_eq!(mesh.num_fixed(), 1);
    }

    #[test]
    fn test_incident_area() {
        let mesh = tetrahedron();
        let total: f64 = mesh.vertex_ids().map(|v| mesh.vertex_incident_area(v)).sum();
        // Each face is counted once per corner.
        assert!((total - 3.0 * mesh.surface_area()).abs() < 1e-12);
    }

    #[test]
    fn test_valence_closed() {
        let mesh = tetrahedron();
        for v in mesh.vertex_ids() {
            assert_eq!(mesh.valence(v), 3);
            assert!(!mesh.is_boundary_vertex(v));
        }
    }

    #[test]
    fn test_bowtie_vertex_is_not_manifold() {
        let vertices = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(-1.0, 0.0, 0.0),
            Point3::new(-1.0, -1.0, 0.0),
        ];
        let single: HalfEdgeMesh = build_from_triangles(&vertices, &[[0, 1, 2]]).unwrap();
        assert!(single.is_manifold());

        // Two triangles touching only at vertex 0.
        let bowtie: HalfEdgeMesh = build_from_triangles(&vertices, &[[0, 1, 2], [0, 3, 4]]).unwrap();
        assert!(!bowtie.is_manifold());
    }
}
