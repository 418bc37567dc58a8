//! Sphere triangulation with consistent outward winding.

use cmb2sphere_core::{
    CacheKey, Cmb2SphereError, Lookup, Nside, Result, ResultCache, TriangleTopology,
};
use glam::DVec3;

use crate::hull::ConvexHull;

/// Rewinds every triangle whose normal points towards the sphere centre.
///
/// For a triangle `(A, B, C)` the test normal is `N = (A - C) x (A - B)`;
/// when `N . A > 0` the first two indices are swapped. Returns how many
/// triangles were flipped.
pub fn fix_orientation(triangles: &mut [[u32; 3]], points: &[DVec3]) -> usize {
    let mut corrected = 0;
    for tri in triangles.iter_mut() {
        let [a, b, c] = tri.map(|i| points[i as usize]);
        if (a - c).cross(a - b).dot(a) > 0.0 {
            tri.swap(0, 1);
            corrected += 1;
        }
    }
    corrected
}

/// Checks that every triangle is non-degenerate and faces outward, and that
/// every point is used by at least one triangle.
pub fn validate(triangles: &[[u32; 3]], points: &[DVec3]) -> Result<()> {
    let mut used = vec![false; points.len()];
    for (t, tri) in triangles.iter().enumerate() {
        let [a, b, c] = tri.map(|i| points[i as usize]);
        let normal = (b - a).cross(c - a);
        if normal.length_squared() == 0.0 {
            return Err(Cmb2SphereError::DegenerateTopology(format!(
                "triangle {t} {tri:?} has zero area"
            )));
        }
        if [a, b, c].iter().any(|p| normal.dot(*p) <= 0.0) {
            return Err(Cmb2SphereError::DegenerateTopology(format!(
                "triangle {t} {tri:?} faces inward"
            )));
        }
        for &i in tri {
            used[i as usize] = true;
        }
    }
    if let Some(unused) = used.iter().position(|&u| !u) {
        return Err(Cmb2SphereError::DegenerateTopology(format!(
            "pixel {unused} is not used by any triangle"
        )));
    }
    Ok(())
}

/// Triangulates the unit-sphere pixel centres of `nside` from scratch.
pub fn build_topology(nside: Nside) -> Result<TriangleTopology> {
    let points = nside.directions().unit_vectors();
    let hull = ConvexHull::compute(&points)?;
    let mut triangles = hull.triangles();
    let corrected = fix_orientation(&mut triangles, &points);
    validate(&triangles, &points)?;
    log::info!(
        "triangulated nside={nside}: {} triangles, {corrected} rewound",
        triangles.len()
    );
    TriangleTopology::from_oriented(nside, triangles, corrected)
}

/// Builds topologies, reusing cached ones for resolutions seen before.
#[derive(Debug)]
pub struct TopologyBuilder<'a> {
    cache: &'a mut ResultCache,
}

impl<'a> TopologyBuilder<'a> {
    pub fn new(cache: &'a mut ResultCache) -> Self {
        Self { cache }
    }

    /// Returns the topology for `nside`, building and caching it on a miss.
    pub fn topology(&mut self, nside: Nside) -> Result<TriangleTopology> {
        let key = CacheKey::topology(nside);
        if let Lookup::Found(topology) = self.cache.lookup::<TriangleTopology>(&key)? {
            if topology.nside() != nside {
                return Err(Cmb2SphereError::ResolutionMismatch {
                    expected: nside.pixel_count(),
                    actual: topology.nside().pixel_count(),
                });
            }
            log::info!("topology loaded (nside={nside})");
            return Ok(topology);
        }

        let topology = build_topology(nside)?;
        self.cache.store(&key, &topology)?;
        Ok(topology)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_smallest_grid() {
        let topology = build_topology(Nside::new(1).unwrap()).unwrap();
        // Closed triangulation of V points has 2V - 4 triangles.
        assert_eq!(topology.len(), 20);
        assert_eq!(topology.used_vertex_count(), 12);
    }

    #[test]
    fn test_every_pixel_is_a_vertex() {
        for n in [2, 3, 4, 5, 8] {
            let nside = Nside::new(n).unwrap();
            let topology = build_topology(nside).unwrap();
            assert_eq!(topology.used_vertex_count(), nside.pixel_count());
            assert_eq!(topology.len(), 2 * nside.pixel_count() - 4);
        }
    }

    #[test]
    fn test_topology_is_cached() {
        let mut cache = ResultCache::in_memory();
        let nside = Nside::new(2).unwrap();
        let first = TopologyBuilder::new(&mut cache).topology(nside).unwrap();
        let second = TopologyBuilder::new(&mut cache).topology(nside).unwrap();
        assert_eq!(first, second);
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn test_validate_rejects_inward_and_unused() {
        let points = vec![DVec3::X, DVec3::Y, DVec3::Z, DVec3::NEG_X];
        assert!(validate(&[[0, 1, 2], [1, 0, 3], [2, 1, 3], [0, 2, 3]], &points).is_err());
        assert!(validate(&[[0, 1, 2]], &points).is_err());
        assert!(validate(&[[0, 2, 1]], &points[..3]).is_err());
        assert!(validate(&[[0, 1, 2]], &points[..3]).is_ok());
    }

    proptest! {
        #[test]
        fn prop_fix_orientation_undoes_random_flips(
            flips in proptest::collection::vec(any::<bool>(), 80)
        ) {
            let nside = Nside::new(2).unwrap();
            let points = nside.directions().unit_vectors();
            let reference = build_topology(nside).unwrap();

            let mut triangles = reference.triangles().to_vec();
            let mut flipped = 0;
            for (tri, &flip) in triangles.iter_mut().zip(&flips) {
                if flip {
                    tri.swap(1, 2);
                    flipped += 1;
                }
            }

            let corrected = fix_orientation(&mut triangles, &points);
            prop_assert_eq!(corrected, flipped);
            prop_assert!(validate(&triangles, &points).is_ok());
        }
    }
}
