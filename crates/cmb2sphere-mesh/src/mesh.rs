//! Displaced vertices and the assembled triangle mesh.

use cmb2sphere_core::{is_unseen, AngularGrid, Cmb2SphereError, Result, ScalarField, TriangleTopology};
use glam::DVec3;

/// Places one vertex per pixel at radius `base_radius + scale * value`
/// along the pixel's direction.
///
/// Pixels without data are placed at the base radius.
pub fn project_field(
    grid: &AngularGrid,
    field: &ScalarField,
    base_radius: f64,
    scale: f64,
) -> Result<Vec<DVec3>> {
    if grid.len() != field.len() {
        return Err(Cmb2SphereError::ResolutionMismatch {
            expected: grid.len(),
            actual: field.len(),
        });
    }
    Ok(grid
        .directions()
        .iter()
        .zip(field.values())
        .map(|(direction, &value)| {
            let value = if is_unseen(value) { 0.0 } else { value };
            direction.unit_vector() * (base_radius + scale * value)
        })
        .collect())
}

/// A triangle mesh ready for export.
#[derive(Debug, Clone, PartialEq)]
pub struct Mesh {
    pub vertices: Vec<DVec3>,
    pub triangles: Vec<[u32; 3]>,
}

impl Mesh {
    /// Pairs a topology with displaced vertices.
    ///
    /// Every triangle index must address a vertex; otherwise the result is
    /// `IndexOutOfRange`.
    pub fn assemble(topology: &TriangleTopology, vertices: Vec<DVec3>) -> Result<Self> {
        let len = vertices.len();
        if let Some(&index) = topology
            .triangles()
            .iter()
            .flatten()
            .find(|&&i| i as usize >= len)
        {
            return Err(Cmb2SphereError::IndexOutOfRange {
                index: index as usize,
                len,
            });
        }
        Ok(Self {
            vertices,
            triangles: topology.triangles().to_vec(),
        })
    }

    /// Number of triangles.
    pub fn len(&self) -> usize {
        self.triangles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    /// Corner positions of every triangle, in stored order.
    pub fn facets(&self) -> impl Iterator<Item = [DVec3; 3]> + '_ {
        self.triangles
            .iter()
            .map(|tri| tri.map(|i| self.vertices[i as usize]))
    }

    /// Unit normal `(B - A) x (C - A)` of a facet, or zero if it has no area.
    pub fn facet_normal([a, b, c]: [DVec3; 3]) -> DVec3 {
        (b - a).cross(c - a).normalize_or_zero()
    }

    /// Largest vertex distance from the origin.
    pub fn max_radius(&self) -> f64 {
        self.vertices
            .iter()
            .map(|v| v.length())
            .fold(0.0, f64::max)
    }
}
