//! Binary STL (Stereolithography) files.
//!
//! ```text
//! UINT8[80]    - Header
//! UINT32       - Number of triangles
//! foreach triangle
//!     REAL32[3] - Normal vector
//!     REAL32[3] - Vertex 1
//!     REAL32[3] - Vertex 2
//!     REAL32[3] - Vertex 3
//!     UINT16    - Attribute byte count (0)
//! end
//! ```
//!
//! The stored normal is derived from the vertex order, so a correctly wound
//! mesh gets outward normals.

use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::Path;

use cmb2sphere_core::{Cmb2SphereError, Result};
use glam::DVec3;

use crate::mesh::Mesh;

/// STL binary header size in bytes.
const HEADER_SIZE: usize = 80;

/// Size of one triangle in binary STL (normal + 3 vertices + attribute).
const TRIANGLE_SIZE: usize = 50;

/// Writes `mesh` as binary STL.
pub fn write_stl<W: Write>(mesh: &Mesh, mut writer: W) -> Result<()> {
    let mut header = [b' '; HEADER_SIZE];
    let text = b"Binary STL generated by cmb2sphere";
    header[..text.len()].copy_from_slice(text);
    writer.write_all(&header)?;

    let count = u32::try_from(mesh.len())
        .map_err(|_| Cmb2SphereError::InvalidMesh("too many triangles for STL".to_string()))?;
    writer.write_all(&count.to_le_bytes())?;

    for facet in mesh.facets() {
        write_vector(&mut writer, Mesh::facet_normal(facet))?;
        for corner in facet {
            write_vector(&mut writer, corner)?;
        }
        writer.write_all(&0u16.to_le_bytes())?;
    }
    Ok(())
}

/// Writes a vector as 3 little-endian f32s.
fn write_vector<W: Write>(writer: &mut W, v: DVec3) -> Result<()> {
    // STL stores single precision.
    let v = v.as_vec3();
    writer.write_all(&v.x.to_le_bytes())?;
    writer.write_all(&v.y.to_le_bytes())?;
    writer.write_all(&v.z.to_le_bytes())?;
    Ok(())
}

/// A facet read back from an STL file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StlFacet {
    pub normal: DVec3,
    pub corners: [DVec3; 3],
}

/// Reads the facets of a binary STL file.
pub fn load_stl(path: &Path) -> Result<Vec<StlFacet>> {
    let file = File::open(path)?;
    let file_len = file.metadata()?.len();
    let mut reader = BufReader::new(file);

    let mut header = [0u8; HEADER_SIZE + 4];
    reader.read_exact(&mut header).map_err(|_| {
        Cmb2SphereError::InvalidMesh(format!("{} is too small to be STL", path.display()))
    })?;
    let count = u32::from_le_bytes([
        header[HEADER_SIZE],
        header[HEADER_SIZE + 1],
        header[HEADER_SIZE + 2],
        header[HEADER_SIZE + 3],
    ]);

    // The declared count must fit in the file before anything is allocated.
    let available = file_len.saturating_sub((HEADER_SIZE + 4) as u64) / TRIANGLE_SIZE as u64;
    if u64::from(count) > available {
        return Err(Cmb2SphereError::InvalidMesh(format!(
            "header declares {count} triangles but the file holds at most {available}"
        )));
    }

    let mut facets = Vec::with_capacity(count as usize);
    let mut buf = [0u8; TRIANGLE_SIZE];
    for i in 0..count {
        reader.read_exact(&mut buf).map_err(|_| {
            Cmb2SphereError::InvalidMesh(format!("expected {count} triangles, found {i}"))
        })?;
        facets.push(StlFacet {
            normal: read_vector(&buf[0..12]),
            corners: [
                read_vector(&buf[12..24]),
                read_vector(&buf[24..36]),
                read_vector(&buf[36..48]),
            ],
        });
    }
    Ok(facets)
}

/// Reads a vector from 12 bytes (3 f32s).
fn read_vector(buf: &[u8]) -> DVec3 {
    let x = f32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
    let y = f32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]);
    let z = f32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]);
    DVec3::new(f64::from(x), f64::from(y), f64::from(z))
}
