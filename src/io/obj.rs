//! Wavefront OBJ format support.
//!
//! Reading goes through `tobj` with triangulation on. Faces keep their
//! position indices, so texture and normal seams do not cut the surface
//! apart, and vertices with bit-identical positions in different objects
//! of the file are welded into one.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use log::debug;
use nalgebra::Point3;

use crate::error::{Result, SkeletonError};
use crate::mesh::{to_face_vertex, FaceSoup, HalfEdgeMesh, MeshIndex};

fn load_options() -> tobj::LoadOptions {
    tobj::LoadOptions {
        triangulate: true,
        single_index: false,
        ..Default::default()
    }
}

/// Load a mesh from an OBJ file.
///
/// # Example
///
/// ```no_run
/// use mcfskel::io::obj;
/// use mcfskel::mesh::HalfEdgeMesh;
///
/// let mesh: HalfEdgeMesh = obj::load("model.obj").unwrap();
/// ```
pub fn load<P: AsRef<Path>, I: MeshIndex>(path: P) -> Result<HalfEdgeMesh<I>> {
    let path = path.as_ref();
    let (models, _materials) =
        tobj::load_obj(path, &load_options()).map_err(|e| SkeletonError::LoadError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
    build(&models, path)
}

/// Build a mesh from OBJ text held in memory. Material libraries are not
/// resolved.
pub fn from_str<I: MeshIndex>(text: &str) -> Result<HalfEdgeMesh<I>> {
    let path = Path::new("<memory>");
    let (models, _materials) = tobj::load_obj_buf(&mut text.as_bytes(), &load_options(), |_| {
        Err(tobj::LoadError::OpenFileFailed)
    })
    .map_err(|e| SkeletonError::LoadError {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    build(&models, path)
}

/// Merge all models into one soup, welding identical positions.
fn build<I: MeshIndex>(models: &[tobj::Model], path: &Path) -> Result<HalfEdgeMesh<I>> {
    let mut soup = FaceSoup::default();
    let mut welded: HashMap<[u64; 3], usize> = HashMap::new();

    for model in models {
        let obj_mesh = &model.mesh;
        let local: Vec<usize> = obj_mesh
            .positions
            .chunks_exact(3)
            .map(|c| {
                let p = Point3::new(c[0] as f64, c[1] as f64, c[2] as f64);
                let key = [p.x.to_bits(), p.y.to_bits(), p.z.to_bits()];
                *welded.entry(key).or_insert_with(|| soup.push_vertex(p, false))
            })
            .collect();

        for tri in obj_mesh.indices.chunks_exact(3) {
            let face = [0, 1, 2].map(|k| local.get(tri[k] as usize).copied());
            match face {
                [Some(a), Some(b), Some(c)] => soup.faces.push([a, b, c]),
                _ => {
                    return Err(SkeletonError::LoadError {
                        path: path.to_path_buf(),
                        message: format!("model '{}' references a missing vertex", model.name),
                    })
                }
            }
        }
    }

    if soup.faces.is_empty() {
        return Err(SkeletonError::LoadError {
            path: path.to_path_buf(),
            message: "OBJ file contains no faces".to_string(),
        });
    }
    debug!(
        "OBJ {}: {} vertices, {} faces from {} models",
        path.display(),
        soup.positions.len(),
        soup.faces.len(),
        models.len()
    );

    soup.into_mesh()
}

/// Save a mesh to an OBJ file.
pub fn save<P: AsRef<Path>, I: MeshIndex>(mesh: &HalfEdgeMesh<I>, path: P) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path.as_ref())?);
    let (vertices, faces) = to_face_vertex(mesh);

    writeln!(writer, "# Generated by mcfskel")?;
    writeln!(writer, "# {} vertices, {} faces", vertices.len(), faces.len())?;
    for v in &vertices {
        writeln!(writer, "v {} {} {}", v.x, v.y, v.z)?;
    }
    for f in &faces {
        writeln!(writer, "f {} {} {}", f[0] + 1, f[1] + 1, f[2] + 1)?;
    }

    writer.flush()?;
    Ok(())
}

/// Save a point set as vertex-only OBJ.
pub fn save_points<P: AsRef<Path>>(points: &[Point3<f64>], path: P) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path.as_ref())?);
    writeln!(writer, "# Generated by mcfskel")?;
    writeln!(writer, "# {} points", points.len())?;
    for p in points {
        writeln!(writer, "v {} {} {}", p.x, p.y, p.z)?;
    }
    writer.flush()?;
    Ok(())
}
