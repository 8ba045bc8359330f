//! Topology maintenance during contraction: short-edge collapse and
//! obtuse-triangle splitting.
//!
//! Both operations run in batches. A batch reads adjacency from the current
//! half-edge mesh, records its edits on a [`FaceSoup`] with the same vertex
//! and face numbering, and ends with a rebuild. Elements touched by an edit
//! are locked for the rest of the batch, so every adjacency query made
//! during a batch still describes the soup.
//!
//! An edit that would break the manifold property is skipped and the batch
//! continues. If the rebuild still fails, the batch is dropped and the mesh
//! is left as it was before it.

use log::{debug, trace, warn};
use nalgebra::{Point3, Vector3};

use super::ContractionParams;
use crate::error::{Result, SkeletonError};
use crate::mesh::{EdgeId, FaceId, FaceSoup, HalfEdgeMesh, MeshIndex, VertexId};

/// Split points closer than this fraction of the edge to an endpoint are
/// moved inward.
const SPLIT_CLAMP: f64 = 0.1;

// ============================================================================
// Edge Collapse
// ============================================================================

/// Collapse every edge shorter than `params.edge_length_threshold` that can
/// be collapsed without breaking the surface.
///
/// The two endpoints merge into one vertex placed at the edge midpoint, or
/// at the fixed endpoint if exactly one of them is fixed; the merged vertex
/// is fixed if either endpoint was. Runs batches until nothing short is
/// left, nothing could be collapsed, or `params.max_collapse_passes` is
/// reached. Returns the number of collapses.
pub fn collapse_short_edges<I: MeshIndex>(
    mesh: &mut HalfEdgeMesh<I>,
    params: &ContractionParams,
) -> Result<usize> {
    params.validate()?;
    let mut total = 0;

    for pass in 0..params.max_collapse_passes {
        let mut candidates: Vec<(EdgeId<I>, f64)> = mesh
            .edge_ids()
            .map(|e| (e, mesh.edge_length(e)))
            .filter(|&(_, len)| len < params.edge_length_threshold)
            .collect();
        if candidates.is_empty() {
            break;
        }
        candidates.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));

        let mut soup = FaceSoup::from_mesh(mesh);
        let mut locked = vec![false; mesh.num_vertices()];
        let mut live_vertices = mesh.num_vertices();
        let mut collapsed = 0;
        let mut skipped = 0;

        for (e, len) in candidates {
            let [a, b] = mesh.edge_vertices(e);
            if locked[a.index()] || locked[b.index()] {
                continue;
            }
            if live_vertices <= 4 {
                break;
            }

            let target = collapse_target(mesh, a, b);
            if let Err(err) = check_collapse(mesh, e, target, &locked, params) {
                trace!("collapse of {:?} (length {:.3e}) skipped: {}", e, len, err);
                skipped += 1;
                continue;
            }

            let (keep, gone) = (a.index(), b.index());
            soup.positions[keep] = target;
            soup.fixed[keep] = soup.fixed[keep] || soup.fixed[gone];
            for f in mesh.vertex_faces(b) {
                for v in soup.faces[f.index()].iter_mut() {
                    if *v == gone {
                        *v = keep;
                    }
                }
            }

            for v in [a, b] {
                locked[v.index()] = true;
                for n in mesh.vertex_neighbors(v) {
                    locked[n.index()] = true;
                }
            }
            live_vertices -= 1;
            collapsed += 1;
        }

        if collapsed == 0 {
            debug!("collapse pass {}: no collapsible edge ({} skipped)", pass, skipped);
            break;
        }

        soup.remove_degenerate_faces();
        match rebuild::<I>(soup) {
            Ok(rebuilt) => *mesh = rebuilt,
            Err(err) => {
                warn!("collapse pass {}: rebuild failed, batch of {} dropped: {}", pass, collapsed, err);
                break;
            }
        }

        debug!(
            "collapse pass {}: {} collapsed, {} skipped, {} vertices left",
            pass,
            collapsed,
            skipped,
            mesh.num_vertices()
        );
        total += collapsed;
    }

    Ok(total)
}

/// Rebuild a batch, refusing a result that is not a manifold surface.
fn rebuild<I: MeshIndex>(soup: FaceSoup) -> Result<HalfEdgeMesh<I>> {
    let mesh = soup.into_mesh::<I>()?;
    if !mesh.is_manifold() {
        return Err(SkeletonError::topology("rebuilt batch is not manifold"));
    }
    Ok(mesh)
}

/// Position of the vertex that replaces edge `(a, b)`.
fn collapse_target<I: MeshIndex>(mesh: &HalfEdgeMesh<I>, a: VertexId<I>, b: VertexId<I>) -> Point3<f64> {
    let (pa, pb) = (*mesh.position(a), *mesh.position(b));
    match (mesh.is_fixed(a), mesh.is_fixed(b)) {
        (true, false) => pa,
        (false, true) => pb,
        _ => Point3::from((pa.coords + pb.coords) * 0.5),
    }
}

/// Reject a collapse that would leave the surface non-manifold, too small,
/// or folded.
fn check_collapse<I: MeshIndex>(
    mesh: &HalfEdgeMesh<I>,
    e: EdgeId<I>,
    target: Point3<f64>,
    locked: &[bool],
    params: &ContractionParams,
) -> Result<()> {
    let [a, b] = mesh.edge_vertices(e);
    let he = mesh.edge_halfedge(e);

    let opposite: Vec<VertexId<I>> = [he, mesh.twin(he)]
        .into_iter()
        .filter(|&h| !mesh.is_boundary_halfedge(h))
        .map(|h| mesh.dest(mesh.next(h)))
        .collect();

    // Link condition: the only shared neighbours are the opposite corners.
    let mut common: Vec<VertexId<I>> = mesh
        .vertex_neighbors(a)
        .filter(|&n| mesh.vertex_neighbors(b).any(|m| m == n))
        .collect();
    common.sort();
    let mut expected = opposite.clone();
    expected.sort();
    if common != expected {
        return Err(SkeletonError::topology(format!(
            "link condition fails: {} shared neighbours, {} incident faces",
            common.len(),
            opposite.len()
        )));
    }

    if !mesh.is_boundary_edge(e) && mesh.is_boundary_vertex(a) && mesh.is_boundary_vertex(b) {
        return Err(SkeletonError::topology("interior edge joins two boundary vertices"));
    }

    for &c in &common {
        if locked[c.index()] {
            return Err(SkeletonError::topology(format!("neighbour {:?} already edited", c)));
        }
        if mesh.valence(c) <= 3 {
            return Err(SkeletonError::topology(format!(
                "neighbour {:?} would drop below valence 3",
                c
            )));
        }
    }

    // Surviving faces must keep their orientation.
    for v in [a, b] {
        for f in mesh.vertex_faces(v) {
            let corners = mesh.face_triangle(f);
            if corners.contains(&a) && corners.contains(&b) {
                continue;
            }
            let before = face_normal(mesh, f, None);
            if 0.5 * before.norm() < params.zero_threshold {
                continue;
            }
            let after = face_normal(mesh, f, Some((v, target)));
            if before.dot(&after) <= 0.0 {
                return Err(SkeletonError::topology(format!("face {:?} would flip", f)));
            }
        }
    }

    Ok(())
}

/// Area-scaled normal of `f`, optionally with one vertex moved.
fn face_normal<I: MeshIndex>(
    mesh: &HalfEdgeMesh<I>,
    f: FaceId<I>,
    moved: Option<(VertexId<I>, Point3<f64>)>,
) -> Vector3<f64> {
    let [p0, p1, p2] = mesh.face_triangle(f).map(|v| match moved {
        Some((m, p)) if m == v => p,
        _ => *mesh.position(v),
    });
    (p1 - p0).cross(&(p2 - p0))
}

// ============================================================================
// Triangle Splitting
// ============================================================================

/// Split triangles whose largest interior angle exceeds `params.max_angle`.
///
/// The edge opposite the obtuse corner is split at the orthogonal projection
/// of that corner, and both triangles sharing the edge are replaced by two
/// each. Edges shorter than `params.edge_length_threshold`, and faces with
/// area below `params.zero_threshold`, are left to the collapse step.
/// Returns the number of splits.
pub fn iteratively_split_triangles<I: MeshIndex>(
    mesh: &mut HalfEdgeMesh<I>,
    params: &ContractionParams,
) -> Result<usize> {
    params.validate()?;
    let max_angle = params.max_angle_radians();
    let mut total = 0;

    for pass in 0..params.max_split_passes {
        let mut soup = FaceSoup::from_mesh(mesh);
        let mut locked = vec![false; mesh.num_faces()];
        let mut splits = 0;

        for f in mesh.face_ids() {
            if locked[f.index()] || mesh.face_area(f) < params.zero_threshold {
                continue;
            }
            let Some((corner, angle)) = largest_angle(mesh, f) else {
                continue;
            };
            if angle <= max_angle {
                continue;
            }

            // Half-edge opposite the obtuse corner.
            let h0 = mesh.face(f).halfedge;
            let he = [h0, mesh.next(h0), mesh.prev(h0)]
                .into_iter()
                .find(|&h| mesh.dest(mesh.next(h)) == corner)
                .unwrap_or(h0);

            let (u, w) = (mesh.origin(he), mesh.dest(he));
            let (pu, pw) = (*mesh.position(u), *mesh.position(w));
            let edge = pw - pu;
            let len_sq = edge.norm_squared();
            if len_sq.sqrt() < params.edge_length_threshold {
                continue;
            }

            let faces: Vec<FaceId<I>> = [he, mesh.twin(he)]
                .into_iter()
                .map(|h| mesh.face_of(h))
                .filter(|f| f.is_valid())
                .collect();
            // Flattened faces are left to collapse and degeneracy detection.
            if faces
                .iter()
                .any(|&g| locked[g.index()] || mesh.face_area(g) < params.zero_threshold)
            {
                continue;
            }

            let apex = *mesh.position(corner);
            let t = ((apex - pu).dot(&edge) / len_sq).clamp(SPLIT_CLAMP, 1.0 - SPLIT_CLAMP);
            let m = soup.push_vertex(pu + edge * t, false);

            for &g in &faces {
                split_face(&mut soup, g.index(), u.index(), w.index(), m);
                locked[g.index()] = true;
            }
            trace!("split {:?}-{:?} at t={:.3} (angle {:.1} deg)", u, w, t, angle.to_degrees());
            splits += 1;
        }

        if splits == 0 {
            break;
        }

        match rebuild::<I>(soup) {
            Ok(rebuilt) => *mesh = rebuilt,
            Err(err) => {
                warn!("split pass {}: rebuild failed, batch of {} dropped: {}", pass, splits, err);
                break;
            }
        }
        debug!("split pass {}: {} edges split, {} faces", pass, splits, mesh.num_faces());
        total += splits;
    }

    Ok(total)
}

/// Largest interior angle of a face and the corner it sits at.
fn largest_angle<I: MeshIndex>(mesh: &HalfEdgeMesh<I>, f: FaceId<I>) -> Option<(VertexId<I>, f64)> {
    let corners = mesh.face_triangle(f);
    (0..3)
        .map(|k| {
            let p = mesh.position(corners[k]);
            let a = mesh.position(corners[(k + 1) % 3]) - p;
            let b = mesh.position(corners[(k + 2) % 3]) - p;
            (corners[k], a.cross(&b).norm().atan2(a.dot(&b)))
        })
        .filter(|(_, angle)| angle.is_finite())
        .max_by(|x, y| x.1.total_cmp(&y.1))
}

/// Replace soup face `fi`, which contains edge `(u, w)` in either
/// direction, by two faces through the new vertex `m`.
fn split_face(soup: &mut FaceSoup, fi: usize, u: usize, w: usize, m: usize) {
    let face = soup.faces[fi];
    let Some(j) = (0..3).find(|&j| {
        let (a, b) = (face[j], face[(j + 1) % 3]);
        (a == u && b == w) || (a == w && b == u)
    }) else {
        return;
    };
    let (a, b, c) = (face[j], face[(j + 1) % 3], face[(j + 2) % 3]);
    soup.faces[fi] = [a, m, c];
    soup.faces.push([m, b, c]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algo::skeleton::tests::{bipyramid, flat_bipyramid, icosahedron};
    use approx::assert_relative_eq;

    fn closed_and_manifold(mesh: &HalfEdgeMesh) -> bool {
        mesh.is_manifold() && mesh.is_closed() && mesh.edge_ids().all(|e| mesh.edge_face_count(e) == 2)
    }

    /// Icosahedron with vertex 0 pulled next to one of its neighbours.
    fn pinched_icosahedron() -> (HalfEdgeMesh, VertexId) {
        let mut mesh = icosahedron();
        let v0 = VertexId::new(0);
        let n = mesh.vertex_neighbors(v0).next().unwrap();
        let pn = *mesh.position(n);
        let p0 = *mesh.position(v0);
        mesh.set_position(v0, pn + (p0 - pn) * 0.01);
        (mesh, n)
    }

    #[test]
    fn test_collapse_single_short_edge() {
        let (mut mesh, _) = pinched_icosahedron();
        let params = ContractionParams::default().with_edge_length_threshold(0.05);

        let count = collapse_short_edges(&mut mesh, &params).unwrap();

        assert_eq!(count, 1);
        assert_eq!(mesh.num_vertices(), 11);
        assert_eq!(mesh.num_faces(), 18);
        assert!(closed_and_manifold(&mesh));
    }

    #[test]
    fn test_collapse_snaps_to_fixed_endpoint() {
        let (mut mesh, n) = pinched_icosahedron();
        let pn = *mesh.position(n);
        mesh.fix_vertex(n);
        let params = ContractionParams::default().with_edge_length_threshold(0.05);

        assert_eq!(collapse_short_edges(&mut mesh, &params).unwrap(), 1);
        assert_eq!(mesh.num_fixed(), 1);
        let survivor = mesh.vertex_ids().find(|&v| mesh.is_fixed(v)).unwrap();
        assert_relative_eq!(*mesh.position(survivor), pn);
    }

    #[test]
    fn test_collapse_respects_link_condition() {
        let mut mesh = bipyramid();
        let params = ContractionParams::default().with_edge_length_threshold(0.05);

        let count = collapse_short_edges(&mut mesh, &params).unwrap();

        assert_eq!(count, 0);
        assert_eq!(mesh.num_faces(), 6);
        assert_eq!(mesh.num_vertices(), 5);
    }

    #[test]
    fn test_collapse_nothing_short() {
        let mut mesh = icosahedron();
        let params = ContractionParams::default().with_edge_length_threshold(0.5);
        assert_eq!(collapse_short_edges(&mut mesh, &params).unwrap(), 0);
        assert_eq!(mesh.num_vertices(), 12);
    }

    #[test]
    fn test_collapse_everything_short_stays_manifold() {
        let mut mesh = icosahedron();
        let params = ContractionParams::default().with_edge_length_threshold(10.0);

        let count = collapse_short_edges(&mut mesh, &params).unwrap();

        assert!(count > 0);
        assert!(mesh.num_vertices() >= 4);
        assert_eq!(mesh.num_vertices(), 12 - count);
        assert!(closed_and_manifold(&mesh));
    }

    #[test]
    fn test_split_obtuse_triangles() {
        let mut mesh = flat_bipyramid();
        let params = ContractionParams::default().with_edge_length_threshold(0.0);

        let splits = iteratively_split_triangles(&mut mesh, &params).unwrap();

        // One split per equator edge, each handling one upper and one lower face.
        assert_eq!(splits, 3);
        assert_eq!(mesh.num_vertices(), 8);
        assert_eq!(mesh.num_faces(), 12);
        assert!(closed_and_manifold(&mesh));
        assert_eq!(mesh.num_fixed(), 0);

        // Nothing obtuse is left.
        assert_eq!(iteratively_split_triangles(&mut mesh, &params).unwrap(), 0);
    }

    #[test]
    fn test_split_skips_short_edges() {
        let mut mesh = flat_bipyramid();
        let params = ContractionParams::default().with_edge_length_threshold(10.0);
        assert_eq!(iteratively_split_triangles(&mut mesh, &params).unwrap(), 0);
        assert_eq!(mesh.num_faces(), 6);
    }

    #[test]
    fn test_split_leaves_flattened_faces_alone() {
        let flat = flat_bipyramid();
        let (positions, faces) = crate::mesh::to_face_vertex(&flat);
        let tiny: Vec<Point3<f64>> = positions.iter().map(|p| Point3::from(p.coords * 1e-4)).collect();
        let mut mesh: HalfEdgeMesh = crate::mesh::build_from_triangles(&tiny, &faces).unwrap();
        let params = ContractionParams::default().with_edge_length_threshold(0.0);
        assert!(mesh.face_ids().all(|f| mesh.face_area(f) < params.zero_threshold));

        assert_eq!(iteratively_split_triangles(&mut mesh, &params).unwrap(), 0);
        assert_eq!(mesh.num_faces(), 6);
    }

    #[test]
    fn test_collapse_rejects_folding_edge() {
        // Pull vertices 0 and 1 onto either side of edge (10, 11); merging
        // them at the fixed vertex 1 turns face (0, 10, 11) over.
        let mut mesh = icosahedron();
        let (v0, v1) = (VertexId::new(0), VertexId::new(1));
        let p10 = *mesh.position(VertexId::new(10));
        let p11 = *mesh.position(VertexId::new(11));
        let mid = Point3::from((p10.coords + p11.coords) * 0.5);
        let axis = (p11 - p10).normalize();
        let away = *mesh.position(v0) - mid;
        let u = (away - axis * away.dot(&axis)).normalize();
        mesh.set_position(v0, mid + u * 0.01);
        mesh.set_position(v1, mid - u * 0.01);
        mesh.fix_vertex(v1);
        let params = ContractionParams::default().with_edge_length_threshold(0.05);

        let e = mesh
            .edge_ids()
            .find(|&e| {
                let [a, b] = mesh.edge_vertices(e);
                (a, b) == (v0, v1) || (a, b) == (v1, v0)
            })
            .unwrap();
        let target = collapse_target(&mesh, v0, v1);
        assert_eq!(target, *mesh.position(v1));
        let locked = vec![false; mesh.num_vertices()];
        assert!(matches!(
            check_collapse(&mesh, e, target, &locked, &params),
            Err(SkeletonError::Topology { details }) if details.contains("flip")
        ));

        assert_eq!(collapse_short_edges(&mut mesh, &params).unwrap(), 0);
        assert_eq!(mesh.num_faces(), 20);
        assert_eq!(mesh.num_vertices(), 12);
    }

    #[test]
    fn test_rebuild_refuses_bowtie() {
        let soup = FaceSoup {
            positions: vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(0.0, 1.0, 0.0),
                Point3::new(-1.0, 0.0, 0.0),
                Point3::new(0.0, -1.0, 0.0),
            ],
            fixed: vec![false; 5],
            faces: vec![[0, 1, 2], [0, 3, 4]],
        };
        assert!(soup.clone().into_mesh::<u32>().is_ok());
        assert!(matches!(rebuild::<u32>(soup), Err(SkeletonError::Topology { .. })));
    }

    #[test]
    fn test_split_ignores_acute_mesh() {
        let mut mesh = icosahedron();
        let params = ContractionParams::default();
        assert_eq!(iteratively_split_triangles(&mut mesh, &params).unwrap(), 0);
    }
}
