//! HEALPix pixelization in RING order.
//!
//! The sphere is split into `12 * nside^2` equal-area pixels laid out on
//! `4 * nside - 1` iso-latitude rings. Pixel indices run ring by ring from the
//! north pole, and within a ring by increasing azimuth.

use std::f64::consts::{PI, TAU};

use glam::DVec3;
use serde::{Deserialize, Serialize};

use crate::error::{Cmb2SphereError, Result};

/// Largest supported resolution order (`nside = 2^MAX_ORDER`).
pub const MAX_ORDER: u32 = 13;

/// Largest supported resolution parameter.
pub const MAX_NSIDE: u32 = 1 << MAX_ORDER;

/// Identity of the pixelization scheme, part of every cache key.
pub const PIXELIZATION_SCHEME: &str = "healpix-ring-v1";

/// A validated HEALPix resolution parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct Nside(u32);

impl Nside {
    /// Validates a resolution parameter.
    ///
    /// Any positive value up to [`MAX_NSIDE`] is a valid RING resolution.
    /// NESTED ordering additionally needs a power of two, see
    /// [`Nside::supports_nested`].
    pub fn new(nside: u32) -> Result<Self> {
        if nside == 0 {
            return Err(Cmb2SphereError::InvalidResolution {
                nside,
                reason: "nside must be positive",
            });
        }
        if nside > MAX_NSIDE {
            return Err(Cmb2SphereError::InvalidResolution {
                nside,
                reason: "nside exceeds 8192",
            });
        }
        Ok(Self(nside))
    }

    /// Resolution `2^order`, with `order` clamped to [`MAX_ORDER`].
    #[must_use]
    pub const fn from_order(order: u32) -> Self {
        let order = if order > MAX_ORDER { MAX_ORDER } else { order };
        Self(1 << order)
    }

    /// Infers the resolution from a full-sky pixel count.
    pub fn from_pixel_count(npix: usize) -> Result<Self> {
        let per_face = npix / 12;
        // Rounded square root, then verified exactly.
        #[allow(
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss,
            clippy::cast_precision_loss
        )]
        let side = ((per_face as f64).sqrt().round()) as usize;
        if npix % 12 != 0 || side * side != per_face {
            return Err(Cmb2SphereError::ResolutionMismatch {
                expected: 12 * side * side,
                actual: npix,
            });
        }
        let side = u32::try_from(side).map_err(|_| Cmb2SphereError::InvalidResolution {
            nside: u32::MAX,
            reason: "nside exceeds 8192",
        })?;
        Self::new(side)
    }

    /// Returns the raw resolution parameter.
    #[must_use]
    pub fn get(self) -> u32 {
        self.0
    }

    /// Number of pixels on the sphere, `12 * nside^2`.
    #[must_use]
    pub fn pixel_count(self) -> usize {
        let n = self.0 as usize;
        12 * n * n
    }

    /// Number of iso-latitude rings, `4 * nside - 1`.
    #[must_use]
    pub fn ring_count(self) -> usize {
        4 * self.0 as usize - 1
    }

    /// Band limit conventionally used for maps at this resolution.
    #[must_use]
    pub fn default_lmax(self) -> usize {
        3 * self.0 as usize - 1
    }

    /// Number of pixels in the north polar cap.
    fn cap_pixels(self) -> usize {
        let n = self.0 as usize;
        2 * n * (n - 1)
    }

    /// Geometry of ring `index` (0-based, counted from the north pole).
    ///
    /// # Panics
    ///
    /// Panics if `index >= ring_count()`.
    #[must_use]
    pub fn ring(self, index: usize) -> Ring {
        assert!(index < self.ring_count(), "ring {index} out of range");
        let n = self.0 as usize;
        let i = index + 1;
        #[allow(clippy::cast_precision_loss)]
        let nf = n as f64;

        if i < n {
            cap_ring(index, i, 2 * i * (i - 1), nf, true)
        } else if i <= 3 * n {
            #[allow(clippy::cast_precision_loss)]
            let z = (2.0 * nf - i as f64) * 2.0 / (3.0 * nf);
            let phi0 = if (i + n) % 2 == 0 {
                PI / (4.0 * nf)
            } else {
                0.0
            };
            Ring {
                index,
                first_pixel: self.cap_pixels() + (i - n) * 4 * n,
                pixel_count: 4 * n,
                z,
                sin_theta: ((1.0 - z) * (1.0 + z)).sqrt(),
                phi0,
            }
        } else {
            let k = 4 * n - i;
            cap_ring(index, k, self.pixel_count() - 2 * k * (k + 1), nf, false)
        }
    }

    /// Iterates over all rings from north to south.
    pub fn rings(self) -> impl Iterator<Item = Ring> {
        (0..self.ring_count()).map(move |r| self.ring(r))
    }

    /// Whether NESTED pixel indices exist at this resolution.
    #[must_use]
    pub const fn supports_nested(self) -> bool {
        self.0.is_power_of_two()
    }

    /// Converts a NESTED pixel index to its RING index.
    ///
    /// Only meaningful when [`Nside::supports_nested`] holds.
    #[must_use]
    pub fn nest_to_ring(self, pixel: usize) -> usize {
        let n = self.0 as usize;
        let per_face = n * n;
        let face = pixel / per_face;
        let in_face = pixel % per_face;
        let ix = compact_bits(in_face);
        let iy = compact_bits(in_face >> 1);
        self.xyf_to_ring(ix, iy, face)
    }

    #[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]
    fn xyf_to_ring(self, ix: usize, iy: usize, face: usize) -> usize {
        const JRLL: [i64; 12] = [2, 2, 2, 2, 3, 3, 3, 3, 4, 4, 4, 4];
        const JPLL: [i64; 12] = [1, 3, 5, 7, 0, 2, 4, 6, 1, 3, 5, 7];

        let n = i64::from(self.0);
        let nl4 = 4 * n;
        let (ix, iy) = (ix as i64, iy as i64);
        let jr = JRLL[face] * n - ix - iy - 1;

        let (ring_len, first, kshift) = if jr < n {
            (jr, 2 * jr * (jr - 1), 0)
        } else if jr > 3 * n {
            let nr = nl4 - jr;
            (nr, self.pixel_count() as i64 - 2 * (nr + 1) * nr, 0)
        } else {
            (n, self.cap_pixels() as i64 + (jr - n) * nl4, (jr - n) & 1)
        };

        let mut jp = (JPLL[face] * ring_len + ix - iy + 1 + kshift) / 2;
        if jp > nl4 {
            jp -= nl4;
        }
        if jp < 1 {
            jp += nl4;
        }
        (first + jp - 1) as usize
    }

    /// Returns the ordered sample directions for this resolution.
    #[must_use]
    pub fn directions(self) -> AngularGrid {
        let mut directions = Vec::with_capacity(self.pixel_count());
        for ring in self.rings() {
            let theta = ring.sin_theta.atan2(ring.z);
            for j in 0..ring.pixel_count {
                directions.push(Direction {
                    theta,
                    phi: ring.phi(j),
                });
            }
        }
        AngularGrid {
            nside: self,
            directions,
        }
    }
}

impl TryFrom<u32> for Nside {
    type Error = Cmb2SphereError;

    fn try_from(value: u32) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Nside> for u32 {
    fn from(value: Nside) -> Self {
        value.0
    }
}

impl std::fmt::Display for Nside {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Builds a polar-cap ring; `k` is the ring number counted from the nearer pole.
fn cap_ring(index: usize, k: usize, first_pixel: usize, nf: f64, north: bool) -> Ring {
    #[allow(clippy::cast_precision_loss)]
    let kf = k as f64;
    let tmp = kf * kf / (3.0 * nf * nf);
    let z = 1.0 - tmp;
    Ring {
        index,
        first_pixel,
        pixel_count: 4 * k,
        z: if north { z } else { -z },
        sin_theta: (tmp * (2.0 - tmp)).sqrt(),
        phi0: PI / (4.0 * kf),
    }
}

/// Keeps the even-position bits of `v`, packed together.
fn compact_bits(mut v: usize) -> usize {
    let mut out = 0;
    let mut bit = 0;
    while v != 0 {
        out |= (v & 1) << bit;
        v >>= 2;
        bit += 1;
    }
    out
}

/// One iso-latitude ring of pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ring {
    /// Ring number, 0 at the north pole.
    pub index: usize,
    /// RING index of the first pixel in this ring.
    pub first_pixel: usize,
    /// Number of pixels in this ring.
    pub pixel_count: usize,
    /// `cos(theta)` of the ring.
    pub z: f64,
    /// `sin(theta)` of the ring.
    pub sin_theta: f64,
    /// Azimuth of the first pixel.
    pub phi0: f64,
}

impl Ring {
    /// Azimuth of pixel `j` within the ring.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn phi(&self, j: usize) -> f64 {
        self.phi0 + TAU * j as f64 / self.pixel_count as f64
    }

    /// Pixel indices covered by this ring.
    #[must_use]
    pub fn pixels(&self) -> std::ops::Range<usize> {
        self.first_pixel..self.first_pixel + self.pixel_count
    }
}

/// A sample direction on the sphere.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Direction {
    /// Polar angle in `[0, pi]`.
    pub theta: f64,
    /// Azimuth in `[0, 2 pi)`.
    pub phi: f64,
}

impl Direction {
    /// Unit vector `(sin t cos p, sin t sin p, cos t)`.
    #[must_use]
    pub fn unit_vector(&self) -> DVec3 {
        let (sin_t, cos_t) = self.theta.sin_cos();
        let (sin_p, cos_p) = self.phi.sin_cos();
        DVec3::new(sin_t * cos_p, sin_t * sin_p, cos_t)
    }
}

/// The ordered sample directions of one resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct AngularGrid {
    nside: Nside,
    directions: Vec<Direction>,
}

impl AngularGrid {
    /// Resolution this grid was built for.
    #[must_use]
    pub fn nside(&self) -> Nside {
        self.nside
    }

    /// Directions in pixel order.
    #[must_use]
    pub fn directions(&self) -> &[Direction] {
        &self.directions
    }

    /// Number of directions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.directions.len()
    }

    /// Returns true if the grid has no directions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.directions.is_empty()
    }

    /// Unit vectors for every direction, in pixel order.
    #[must_use]
    pub fn unit_vectors(&self) -> Vec<DVec3> {
        self.directions.iter().map(Direction::unit_vector).collect()
    }
}

/// Number of pixels for a raw resolution parameter.
pub fn pixel_count(nside: u32) -> Result<usize> {
    Ok(Nside::new(nside)?.pixel_count())
}

/// Ordered sample directions for a raw resolution parameter.
pub fn directions(nside: u32) -> Result<AngularGrid> {
    Ok(Nside::new(nside)?.directions())
}
