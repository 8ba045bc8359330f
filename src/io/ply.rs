//! PLY (Stanford polygon) format support.
//!
//! Meshes are written as ASCII with double-precision coordinates, since
//! contracted meshes live at scales where single precision loses the shape.
//! An optional per-vertex `fixed` property (uchar, 0 or 1) carries the
//! fixed flags across a save/load cycle, so a contraction can be resumed
//! from a file.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use nalgebra::Point3;
use ply_rs::parser::Parser;
use ply_rs::ply::{DefaultElement, Property};

use crate::error::{Result, SkeletonError};
use crate::mesh::{FaceSoup, HalfEdgeMesh, MeshIndex};

/// Load a mesh from a PLY file.
///
/// Polygons are fan-triangulated and vertices no face uses are dropped.
///
/// # Example
///
/// ```no_run
/// use mcfskel::io::ply;
/// use mcfskel::mesh::HalfEdgeMesh;
///
/// let mesh: HalfEdgeMesh = ply::load("model.ply").unwrap();
/// ```
pub fn load<P: AsRef<Path>, I: MeshIndex>(path: P) -> Result<HalfEdgeMesh<I>> {
    let path = path.as_ref();
    let fail = |message: &str| SkeletonError::LoadError {
        path: path.to_path_buf(),
        message: message.to_string(),
    };

    let mut reader = BufReader::new(File::open(path)?);
    let ply = Parser::<DefaultElement>::new()
        .read_ply(&mut reader)
        .map_err(|e| fail(&e.to_string()))?;

    let vertex_element = ply
        .payload
        .get("vertex")
        .ok_or_else(|| fail("PLY file has no vertex element"))?;

    let mut soup = FaceSoup::default();
    for vertex in vertex_element {
        let coord = |name: &str| {
            float_property(vertex, name).ok_or_else(|| fail(&format!("vertex missing {} coordinate", name)))
        };
        let position = Point3::new(coord("x")?, coord("y")?, coord("z")?);
        let fixed = float_property(vertex, "fixed").map_or(false, |f| f != 0.0);
        soup.push_vertex(position, fixed);
    }

    let face_element = ply
        .payload
        .get("face")
        .ok_or_else(|| fail("PLY file has no face element"))?;

    for face in face_element {
        let indices = list_property(face, "vertex_indices")
            .or_else(|| list_property(face, "vertex_index"))
            .ok_or_else(|| fail("face missing vertex_indices property"))?;
        for i in 1..indices.len().saturating_sub(1) {
            soup.faces.push([indices[0], indices[i], indices[i + 1]]);
        }
    }

    if soup.faces.is_empty() {
        return Err(fail("PLY file contains no faces"));
    }
    if let Some(&bad) = soup.faces.iter().flatten().find(|&&v| v >= soup.positions.len()) {
        return Err(fail(&format!("face references missing vertex {}", bad)));
    }

    soup.into_mesh()
}

fn float_property(element: &DefaultElement, name: &str) -> Option<f64> {
    match element.get(name)? {
        Property::Float(v) => Some(*v as f64),
        Property::Double(v) => Some(*v),
        Property::Int(v) => Some(*v as f64),
        Property::UInt(v) => Some(*v as f64),
        Property::Short(v) => Some(*v as f64),
        Property::UShort(v) => Some(*v as f64),
        Property::Char(v) => Some(*v as f64),
        Property::UChar(v) => Some(*v as f64),
        _ => None,
    }
}

fn list_property(element: &DefaultElement, name: &str) -> Option<Vec<usize>> {
    match element.get(name)? {
        Property::ListInt(v) => Some(v.iter().map(|&x| x as usize).collect()),
        Property::ListUInt(v) => Some(v.iter().map(|&x| x as usize).collect()),
        Property::ListShort(v) => Some(v.iter().map(|&x| x as usize).collect()),
        Property::ListUShort(v) => Some(v.iter().map(|&x| x as usize).collect()),
        Property::ListChar(v) => Some(v.iter().map(|&x| x as usize).collect()),
        Property::ListUChar(v) => Some(v.iter().map(|&x| x as usize).collect()),
        _ => None,
    }
}

/// Save a mesh to an ASCII PLY file, including the fixed flags.
pub fn save<P: AsRef<Path>, I: MeshIndex>(mesh: &HalfEdgeMesh<I>, path: P) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path.as_ref())?);
    let soup = FaceSoup::from_mesh(mesh);

    writeln!(writer, "ply")?;
    writeln!(writer, "format ascii 1.0")?;
    writeln!(writer, "comment Generated by mcfskel")?;
    writeln!(writer, "element vertex {}", soup.positions.len())?;
    writeln!(writer, "property double x")?;
    writeln!(writer, "property double y")?;
    writeln!(writer, "property double z")?;
    writeln!(writer, "property uchar fixed")?;
    writeln!(writer, "element face {}", soup.faces.len())?;
    writeln!(writer, "property list uchar int vertex_indices")?;
    writeln!(writer, "end_header")?;

    for (p, &fixed) in soup.positions.iter().zip(&soup.fixed) {
        writeln!(writer, "{} {} {} {}", p.x, p.y, p.z, u8::from(fixed))?;
    }
    for f in &soup.faces {
        writeln!(writer, "3 {} {} {}", f[0], f[1], f[2])?;
    }

    writer.flush()?;
    Ok(())
}
