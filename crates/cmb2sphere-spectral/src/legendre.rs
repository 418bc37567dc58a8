//! Orthonormal associated Legendre functions.
//!
//! `lambda_lm(z)` is normalized so that `lambda_lm(cos theta) e^{i m phi}` is
//! the spherical harmonic `Y_lm`, Condon-Shortley phase included. Values are
//! produced one `m` column at a time by the three-term recurrence in `l`.
//!
//! Near the poles `sin^m theta` underflows long before the recurrence brings
//! the values back into range, so the running values carry an exponent in
//! units of [`BIG`]; anything more than one unit below the double range is
//! written out as zero.

#![allow(clippy::cast_precision_loss)]

use std::f64::consts::PI;

/// Rescaling unit, `2^600`.
const BIG: f64 = 4.149_515_568_880_993e180;
const INV_BIG: f64 = 1.0 / BIG;

/// Recurrence coefficients for a band limit.
#[derive(Debug, Clone)]
pub struct LegendreTable {
    lmax: usize,
    mmax: usize,
    /// `sqrt((2m + 1) / (2m))` for `m >= 1`, index `m`.
    diagonal: Vec<f64>,
    /// Per `m`, the pairs `(a_lm, b_lm)` for `l = m + 1 ..= lmax`.
    columns: Vec<Vec<(f64, f64)>>,
}

impl LegendreTable {
    /// Precomputes the coefficients for `0 <= m <= mmax <= lmax`.
    #[must_use]
    pub fn new(lmax: usize, mmax: usize) -> Self {
        let diagonal = (0..=mmax)
            .map(|m| {
                if m == 0 {
                    1.0
                } else {
                    let m = m as f64;
                    ((2.0 * m + 1.0) / (2.0 * m)).sqrt()
                }
            })
            .collect();

        let columns = (0..=mmax)
            .map(|m| {
                let mf = m as f64;
                (m + 1..=lmax)
                    .map(|l| {
                        let l = l as f64;
                        let a = ((4.0 * l * l - 1.0) / (l * l - mf * mf)).sqrt();
                        let lm1 = l - 1.0;
                        let b = ((lm1 * lm1 - mf * mf) / (4.0 * lm1 * lm1 - 1.0))
                            .max(0.0)
                            .sqrt();
                        (a, b)
                    })
                    .collect()
            })
            .collect();

        Self {
            lmax,
            mmax,
            diagonal,
            columns,
        }
    }

    #[must_use]
    pub fn lmax(&self) -> usize {
        self.lmax
    }

    #[must_use]
    pub fn mmax(&self) -> usize {
        self.mmax
    }

    /// Writes `lambda_lm(z)` for `l = m ..= lmax` into `out[l - m]`.
    ///
    /// `sin_theta` is passed separately so it stays accurate near the poles.
    /// Values below the double-precision range come out as exact zeros.
    ///
    /// # Panics
    ///
    /// Panics if `m > mmax` or `out` is shorter than `lmax - m + 1`.
    pub fn column(&self, m: usize, z: f64, sin_theta: f64, out: &mut [f64]) {
        assert!(m <= self.mmax, "m {m} exceeds mmax {}", self.mmax);
        let out = &mut out[..=self.lmax - m];

        // Diagonal lambda_mm = (-1)^m sqrt((2m+1)!!/(2m)!!) sin^m / sqrt(4 pi).
        let mut value = 1.0 / (4.0 * PI).sqrt();
        let mut scale: i32 = 0;
        for k in 1..=m {
            value *= -self.diagonal[k] * sin_theta;
            while value != 0.0 && value.abs() < INV_BIG {
                value *= BIG;
                scale -= 1;
            }
        }

        out[0] = unscale(value, scale);
        let mut prev = 0.0;
        let mut cur = value;
        for (i, &(a, b)) in self.columns[m].iter().enumerate() {
            let next = a * (z * cur - b * prev);
            prev = cur;
            cur = next;
            if cur.abs() > BIG {
                prev *= INV_BIG;
                cur *= INV_BIG;
                scale += 1;
            }
            out[i + 1] = unscale(cur, scale);
        }
    }
}

/// True value of `value * BIG^scale`.
fn unscale(value: f64, scale: i32) -> f64 {
    match scale {
        0 => value,
        -1 => value * INV_BIG,
        _ => 0.0,
    }
}
