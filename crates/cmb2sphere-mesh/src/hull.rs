//! Three-dimensional convex hull via Qhull.
//!
//! Facets come back triangulated (Qhull option `Qt`), so cocircular pixel
//! quads on a HEALPix grid are split into two triangles rather than merged.
//! Qhull does not promise any winding; callers orient the facets themselves.

use cmb2sphere_core::{Cmb2SphereError, Result};
use glam::DVec3;
use qhull_enhanced::Qh;

/// A triangular facet of the convex hull, with indices into the original point array.
/// The winding order is unspecified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HullFacet {
    pub indices: [u32; 3],
}

/// Result of computing a 3D convex hull.
#[derive(Debug, Clone)]
pub struct ConvexHull {
    pub facets: Vec<HullFacet>,
}

impl ConvexHull {
    /// Computes the convex hull of a set of 3D points.
    ///
    /// Fails with `DegenerateTopology` when there are fewer than four points,
    /// when they do not span three dimensions, or when Qhull returns a facet
    /// that is not a triangle.
    pub fn compute(points: &[DVec3]) -> Result<Self> {
        if points.len() < 4 {
            return Err(Cmb2SphereError::DegenerateTopology(format!(
                "a hull needs at least 4 points, got {}",
                points.len()
            )));
        }
        if u32::try_from(points.len()).is_err() {
            return Err(Cmb2SphereError::DegenerateTopology(
                "too many points for 32-bit indices".to_string(),
            ));
        }

        // Sphere points: nothing lies inside, and the distribution is not narrow
        let qh = Qh::builder()
            .compute(true)
            .triangulate(true)
            .no_near_inside(true)
            .no_narrow(true)
            .capture_stderr(true)
            .build_from_iter(points.iter().map(|p| p.to_array()))
            .map_err(|e| Cmb2SphereError::DegenerateTopology(format!("qhull failed: {e}")))?;

        let mut facets = Vec::new();
        for facet in qh.facets() {
            let vertices = facet
                .vertices()
                .ok_or_else(|| {
                    Cmb2SphereError::DegenerateTopology(format!("facet {} has no vertices", facet.id()))
                })?
                .iter()
                .map(|v| {
                    v.index(&qh)
                        .and_then(|i| u32::try_from(i).ok())
                        .ok_or_else(|| {
                            Cmb2SphereError::DegenerateTopology(format!(
                                "facet {} references a point outside the input",
                                facet.id()
                            ))
                        })
                })
                .collect::<Result<Vec<u32>>>()?;

            let indices: [u32; 3] = vertices.as_slice().try_into().map_err(|_| {
                Cmb2SphereError::DegenerateTopology(format!(
                    "facet {} has {} vertices",
                    facet.id(),
                    vertices.len()
                ))
            })?;
            facets.push(HullFacet { indices });
        }

        Ok(ConvexHull { facets })
    }

    /// Number of facets.
    pub fn len(&self) -> usize {
        self.facets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facets.is_empty()
    }

    /// Facets as plain index triples.
    pub fn triangles(&self) -> Vec<[u32; 3]> {
        self.facets.iter().map(|f| f.indices).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Deterministic pseudo-random points on the unit sphere.
    #[allow(clippy::cast_precision_loss)]
    fn sphere_points(n: usize) -> Vec<DVec3> {
        let mut state: u64 = 0x9e37_79b9_7f4a_7c15;
        let mut next = || {
            state = state.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
            (state >> 11) as f64 / (1u64 << 53) as f64
        };
        (0..n)
            .map(|_| {
                let z = 2.0 * next() - 1.0;
                let phi = std::f64::consts::TAU * next();
                let r = (1.0 - z * z).sqrt();
                DVec3::new(r * phi.cos(), r * phi.sin(), z)
            })
            .collect()
    }

    /// Every point lies on one side of every facet plane.
    fn assert_supporting_planes(hull: &ConvexHull, points: &[DVec3]) {
        for facet in &hull.facets {
            let [a, b, c] = facet.indices.map(|i| points[i as usize]);
            let mut normal = (b - a).cross(c - a);
            assert!(normal.length_squared() > 0.0, "facet {:?} is flat", facet.indices);
            if normal.dot(a) < 0.0 {
                normal = -normal;
            }
            for p in points {
                assert!(normal.dot(*p - a) <= 1e-12);
            }
        }
    }

    #[test]
    fn test_hull_tetrahedron() {
        let points = vec![
            DVec3::new(1.0, 0.0, -1.0 / 2.0_f64.sqrt()),
            DVec3::new(-1.0, 0.0, -1.0 / 2.0_f64.sqrt()),
            DVec3::new(0.0, 1.0, 1.0 / 2.0_f64.sqrt()),
            DVec3::new(0.0, -1.0, 1.0 / 2.0_f64.sqrt()),
        ];
        let hull = ConvexHull::compute(&points).unwrap();
        assert_eq!(hull.len(), 4);
        assert_supporting_planes(&hull, &points);
    }

    #[test]
    fn test_octahedron_ignores_interior_point() {
        let points = vec![
            DVec3::X,
            DVec3::NEG_X,
            DVec3::Y,
            DVec3::NEG_Y,
            DVec3::ZERO,
            DVec3::Z,
            DVec3::NEG_Z,
        ];
        let hull = ConvexHull::compute(&points).unwrap();
        assert_eq!(hull.len(), 8);
        assert!(hull.facets.iter().all(|f| !f.indices.contains(&4)));
        assert_supporting_planes(&hull, &points);
    }

    #[test]
    fn test_cube_faces_are_triangulated() {
        let points: Vec<DVec3> = (0..8)
            .map(|i| {
                DVec3::new(
                    f64::from(i & 1),
                    f64::from((i >> 1) & 1),
                    f64::from((i >> 2) & 1),
                ) - DVec3::splat(0.5)
            })
            .collect();
        let hull = ConvexHull::compute(&points).unwrap();
        assert_eq!(hull.len(), 12);
        assert_supporting_planes(&hull, &points);
    }

    #[test]
    fn test_random_sphere_points() {
        let points = sphere_points(500);
        let hull = ConvexHull::compute(&points).unwrap();
        // Euler: a closed triangulated sphere with V vertices has 2V - 4 faces.
        assert_eq!(hull.len(), 2 * points.len() - 4);
        assert_supporting_planes(&hull, &points);
    }

    #[test]
    fn test_deterministic() {
        let points = sphere_points(200);
        let a = ConvexHull::compute(&points).unwrap();
        let b = ConvexHull::compute(&points).unwrap();
        assert_eq!(a.facets, b.facets);
    }

    #[test]
    fn test_degenerate_inputs() {
        assert!(matches!(
            ConvexHull::compute(&[DVec3::X, DVec3::Y, DVec3::Z]),
            Err(Cmb2SphereError::DegenerateTopology(_))
        ));
        let plane: Vec<DVec3> = (0..10)
            .map(|i| DVec3::new(f64::from(i), f64::from(i * i), 0.0))
            .collect();
        assert!(matches!(
            ConvexHull::compute(&plane),
            Err(Cmb2SphereError::DegenerateTopology(_))
        ));
    }
}
