//! Spherical-harmonic coefficients.

use num_complex::Complex64;

use crate::error::{Cmb2SphereError, Result};
use crate::field::SourceIdentity;

/// Number of coefficients stored for band limit `lmax` and `mmax <= lmax`.
#[must_use]
pub fn alm_len(lmax: usize, mmax: usize) -> usize {
    (mmax + 1) * (lmax + 1) - mmax * (mmax + 1) / 2
}

/// Band-limited coefficients `a_lm` of a real field, `0 <= m <= l`.
///
/// Storage follows the HEALPix layout: all `l` for `m = 0`, then all `l >= 1`
/// for `m = 1`, and so on. Negative `m` follow from `a_l(-m) = (-1)^m conj(a_lm)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Alm {
    lmax: usize,
    mmax: usize,
    coeffs: Vec<Complex64>,
}

impl Alm {
    /// All-zero coefficients.
    ///
    /// # Panics
    ///
    /// Panics if `mmax > lmax`.
    #[must_use]
    pub fn zeros(lmax: usize, mmax: usize) -> Self {
        assert!(mmax <= lmax, "mmax {mmax} exceeds lmax {lmax}");
        Self {
            lmax,
            mmax,
            coeffs: vec![Complex64::new(0.0, 0.0); alm_len(lmax, mmax)],
        }
    }

    /// Wraps a coefficient vector, checking its shape.
    pub fn from_coeffs(lmax: usize, mmax: usize, coeffs: Vec<Complex64>) -> Result<Self> {
        if mmax > lmax {
            return Err(Cmb2SphereError::TransformFailure(format!(
                "mmax {mmax} exceeds lmax {lmax}"
            )));
        }
        let expected = alm_len(lmax, mmax);
        if coeffs.len() != expected {
            return Err(Cmb2SphereError::TransformFailure(format!(
                "expected {expected} coefficients for lmax={lmax}, mmax={mmax}, got {}",
                coeffs.len()
            )));
        }
        Ok(Self { lmax, mmax, coeffs })
    }

    #[must_use]
    pub fn lmax(&self) -> usize {
        self.lmax
    }

    #[must_use]
    pub fn mmax(&self) -> usize {
        self.mmax
    }

    /// Index of `(l, m)` in the flat storage.
    #[must_use]
    pub fn index(&self, l: usize, m: usize) -> usize {
        debug_assert!(m <= self.mmax && m <= l && l <= self.lmax);
        m * (2 * self.lmax + 1 - m) / 2 + l
    }

    /// Coefficient `a_lm`.
    #[must_use]
    pub fn get(&self, l: usize, m: usize) -> Complex64 {
        self.coeffs[self.index(l, m)]
    }

    /// Mutable access to `a_lm`.
    pub fn get_mut(&mut self, l: usize, m: usize) -> &mut Complex64 {
        let i = self.index(l, m);
        &mut self.coeffs[i]
    }

    /// Coefficients `a_lm` for fixed `m` and `l = m..=lmax`.
    #[must_use]
    pub fn column(&self, m: usize) -> &[Complex64] {
        let start = self.index(m, m);
        &self.coeffs[start..start + self.lmax + 1 - m]
    }

    /// Mutable coefficients for fixed `m` and `l = m..=lmax`.
    pub fn column_mut(&mut self, m: usize) -> &mut [Complex64] {
        let start = self.index(m, m);
        let len = self.lmax + 1 - m;
        &mut self.coeffs[start..start + len]
    }

    /// Flat coefficient storage.
    #[must_use]
    pub fn coeffs(&self) -> &[Complex64] {
        &self.coeffs
    }

    /// Returns true if every coefficient is finite.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.coeffs.iter().all(|c| c.re.is_finite() && c.im.is_finite())
    }

    /// Adds `other` coefficient-wise.
    pub fn add_assign(&mut self, other: &Alm) -> Result<()> {
        if other.lmax != self.lmax || other.mmax != self.mmax {
            return Err(Cmb2SphereError::TransformFailure(format!(
                "cannot add coefficients with lmax={}/mmax={} to lmax={}/mmax={}",
                other.lmax, other.mmax, self.lmax, self.mmax
            )));
        }
        for (a, b) in self.coeffs.iter_mut().zip(&other.coeffs) {
            *a += *b;
        }
        Ok(())
    }
}

/// Coefficients together with the identity of the field they came from.
#[derive(Debug, Clone, PartialEq)]
pub struct SpectralCoefficients {
    pub source: SourceIdentity,
    pub alm: Alm,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_matches_healpix() {
        let alm = Alm::zeros(4, 4);
        assert_eq!(alm.coeffs().len(), 15);
        assert_eq!(alm.index(0, 0), 0);
        assert_eq!(alm.index(4, 0), 4);
        assert_eq!(alm.index(1, 1), 5);
        assert_eq!(alm.index(4, 4), 14);
        assert_eq!(alm.column(2).len(), 3);
    }

    #[test]
    fn test_truncated_mmax() {
        assert_eq!(alm_len(10, 2), 11 + 10 + 9);
        let alm = Alm::zeros(10, 2);
        assert_eq!(alm.index(2, 2), 21);
    }

    #[test]
    fn test_from_coeffs_checks_shape() {
        assert!(Alm::from_coeffs(2, 2, vec![Complex64::default(); 6]).is_ok());
        assert!(matches!(
            Alm::from_coeffs(2, 2, vec![Complex64::default(); 5]),
            Err(Cmb2SphereError::TransformFailure(_))
        ));
        assert!(Alm::from_coeffs(1, 2, Vec::new()).is_err());
    }

    #[test]
    fn test_add_assign() {
        let mut a = Alm::zeros(2, 2);
        *a.get_mut(1, 1) = Complex64::new(1.0, 2.0);
        let b = a.clone();
        a.add_assign(&b).unwrap();
        assert_eq!(a.get(1, 1), Complex64::new(2.0, 4.0));
        assert!(a.add_assign(&Alm::zeros(3, 3)).is_err());
    }
}
