//! ASCII PLY (Polygon File Format) export.

use std::io::Write;

use cmb2sphere_core::{Cmb2SphereError, Result};
use ply_rs::ply::{
    Addable, DefaultElement, ElementDef, Encoding, Ply, Property, PropertyDef, PropertyType,
    ScalarType,
};
use ply_rs::writer::Writer;

use crate::mesh::Mesh;

/// Writes `mesh` as ASCII PLY with shared vertices.
pub fn write_ply<W: Write>(mesh: &Mesh, writer: &mut W) -> Result<()> {
    let mut ply = Ply::<DefaultElement>::new();
    ply.header.encoding = Encoding::Ascii;
    ply.header
        .comments
        .push("Generated by cmb2sphere".to_string());

    let mut vertex_def = ElementDef::new("vertex".to_string());
    for axis in ["x", "y", "z"] {
        vertex_def.properties.add(PropertyDef::new(
            axis.to_string(),
            PropertyType::Scalar(ScalarType::Float),
        ));
    }
    vertex_def.count = mesh.vertices.len();
    ply.header.elements.add(vertex_def);

    let mut face_def = ElementDef::new("face".to_string());
    face_def.properties.add(PropertyDef::new(
        "vertex_indices".to_string(),
        PropertyType::List(ScalarType::UChar, ScalarType::Int),
    ));
    face_def.count = mesh.triangles.len();
    ply.header.elements.add(face_def);

    let vertices = mesh
        .vertices
        .iter()
        .map(|v| {
            let v = v.as_vec3();
            let mut element = DefaultElement::new();
            element.insert("x".to_string(), Property::Float(v.x));
            element.insert("y".to_string(), Property::Float(v.y));
            element.insert("z".to_string(), Property::Float(v.z));
            element
        })
        .collect();
    ply.payload.insert("vertex".to_string(), vertices);

    let mut faces = Vec::with_capacity(mesh.triangles.len());
    for tri in &mesh.triangles {
        let indices = tri
            .iter()
            .map(|&i| i32::try_from(i))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|_| Cmb2SphereError::InvalidMesh("vertex index exceeds PLY int".to_string()))?;
        let mut element = DefaultElement::new();
        element.insert("vertex_indices".to_string(), Property::ListInt(indices));
        faces.push(element);
    }
    ply.payload.insert("face".to_string(), faces);

    Writer::new()
        .write_ply(writer, &mut ply)
        .map_err(|e| Cmb2SphereError::InvalidMesh(format!("failed to write PLY: {e}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::DVec3;
    use ply_rs::parser::Parser;

    #[test]
    fn test_ascii_ply_parses_back() {
        let mesh = Mesh {
            vertices: vec![DVec3::X, DVec3::Y, DVec3::Z, DVec3::ZERO],
            triangles: vec![[0, 1, 2], [0, 3, 1], [1, 3, 2], [2, 3, 0]],
        };
        let mut bytes = Vec::new();
        write_ply(&mesh, &mut bytes).unwrap();

        let text = String::from_utf8(bytes.clone()).unwrap();
        assert!(text.starts_with("ply\nformat ascii 1.0"));

        let parser = Parser::<DefaultElement>::new();
        let mut reader = bytes.as_slice();
        let header = parser.read_header(&mut reader).unwrap();
        let payload = parser.read_payload(&mut reader, &header).unwrap();
        assert_eq!(payload.get("vertex").map(Vec::len), Some(4));
        let faces = payload.get("face").unwrap();
        assert_eq!(faces.len(), 4);
        match faces[1].get("vertex_indices") {
            Some(Property::ListInt(indices)) => assert_eq!(indices, &vec![0, 3, 1]),
            other => panic!("unexpected face property {other:?}"),
        }
    }
}
