//! Triangle topology over the pixel centres of one resolution.

use crate::error::{Cmb2SphereError, Result};
use crate::healpix::Nside;

/// Index triples over the unit-sphere point set of one resolution.
///
/// A topology depends only on the resolution, never on field values, and is
/// immutable once built. Every triangle is wound so that the normal
/// `(B - A) x (C - A)` points away from the sphere centre.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriangleTopology {
    nside: Nside,
    triangles: Vec<[u32; 3]>,
    corrected: usize,
}

impl TriangleTopology {
    /// Wraps triangles whose orientation has already been corrected.
    ///
    /// `corrected` is the number of triangles whose winding had to be flipped.
    /// Only the index range is checked here; geometric validation belongs to
    /// whoever produced the triangles.
    pub fn from_oriented(nside: Nside, triangles: Vec<[u32; 3]>, corrected: usize) -> Result<Self> {
        let len = nside.pixel_count();
        if let Some(&index) = triangles.iter().flatten().find(|&&i| i as usize >= len) {
            return Err(Cmb2SphereError::IndexOutOfRange {
                index: index as usize,
                len,
            });
        }
        Ok(Self {
            nside,
            triangles,
            corrected,
        })
    }

    #[must_use]
    pub fn nside(&self) -> Nside {
        self.nside
    }

    /// Triangles in their final winding order.
    #[must_use]
    pub fn triangles(&self) -> &[[u32; 3]] {
        &self.triangles
    }

    /// Number of triangles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.triangles.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    /// How many triangles needed their winding flipped (diagnostic only).
    #[must_use]
    pub fn corrected_count(&self) -> usize {
        self.corrected
    }

    /// Number of distinct vertices referenced by at least one triangle.
    #[must_use]
    pub fn used_vertex_count(&self) -> usize {
        let mut used = vec![false; self.nside.pixel_count()];
        for &i in self.triangles.iter().flatten() {
            used[i as usize] = true;
        }
        used.into_iter().filter(|&u| u).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_out_of_range_indices() {
        let nside = Nside::new(1).unwrap();
        let err = TriangleTopology::from_oriented(nside, vec![[0, 1, 12]], 0).unwrap_err();
        assert!(matches!(
            err,
            Cmb2SphereError::IndexOutOfRange { index: 12, len: 12 }
        ));
    }

    #[test]
    fn test_used_vertex_count() {
        let nside = Nside::new(1).unwrap();
        let topology =
            TriangleTopology::from_oriented(nside, vec![[0, 1, 2], [2, 1, 3]], 1).unwrap();
        assert_eq!(topology.used_vertex_count(), 4);
        assert_eq!(topology.corrected_count(), 1);
        assert_eq!(topology.len(), 2);
    }
}
