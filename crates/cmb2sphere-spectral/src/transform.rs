//! Spherical-harmonic analysis and synthesis on HEALPix rings.
//!
//! Both directions work ring by ring: an FFT along each ring handles the
//! azimuth, and the Legendre recurrence handles latitude. North and south
//! rings at mirrored latitudes are processed together, using
//! `lambda_lm(-z) = (-1)^(l+m) lambda_lm(z)`.

#![allow(clippy::cast_precision_loss)]

use std::collections::HashMap;
use std::f64::consts::PI;

use cmb2sphere_core::{is_unseen, Alm, Cmb2SphereError, Nside, Result, Ring, ScalarField};
use num_complex::Complex64;

use crate::fft::FftPlan;
use crate::legendre::LegendreTable;

/// Beam factors below this are treated as zero and their multipoles skipped.
pub const BEAM_CUTOFF: f64 = 1e-30;

/// Gaussian beam window `b_l = exp(-l(l+1) sigma^2 / 2)` for `l = 0..=lmax`.
///
/// `fwhm` is the full width at half maximum in radians; zero means no smoothing.
pub fn gaussian_beam(lmax: usize, fwhm: f64) -> Result<Vec<f64>> {
    if !fwhm.is_finite() || fwhm < 0.0 {
        return Err(Cmb2SphereError::TransformFailure(format!(
            "smoothing FWHM must be finite and non-negative, got {fwhm}"
        )));
    }
    let sigma = fwhm / (8.0 * 2.0_f64.ln()).sqrt();
    let half_var = 0.5 * sigma * sigma;
    Ok((0..=lmax)
        .map(|l| {
            let l = l as f64;
            (-half_var * l * (l + 1.0)).exp()
        })
        .collect())
}

/// A ring and its mirror image south of the equator, if distinct.
#[derive(Debug, Clone, Copy)]
struct RingPair {
    north: Ring,
    south: Option<Ring>,
}

fn ring_pairs(nside: Nside) -> impl Iterator<Item = RingPair> {
    let count = nside.ring_count();
    (0..count.div_ceil(2)).map(move |r| {
        let mirror = count - 1 - r;
        RingPair {
            north: nside.ring(r),
            south: (mirror != r).then(|| nside.ring(mirror)),
        }
    })
}

/// FFT plans shared by every ring of the same length.
#[derive(Debug, Default)]
struct Plans {
    plans: HashMap<usize, FftPlan>,
}

impl Plans {
    fn get(&mut self, len: usize) -> &FftPlan {
        self.plans.entry(len).or_insert_with(|| FftPlan::new(len))
    }
}

/// Analysis state reused across iterations.
struct Analyzer {
    nside: Nside,
    table: LegendreTable,
    plans: Plans,
}

impl Analyzer {
    fn new(nside: Nside, lmax: usize, mmax: usize) -> Self {
        Self {
            nside,
            table: LegendreTable::new(lmax, mmax),
            plans: Plans::default(),
        }
    }

    /// Fourier coefficients `sum_j f_j exp(-i m phi_j)` of one ring, `m = 0..=mmax`.
    fn ring_spectrum(&mut self, ring: &Ring, values: &[f64], mmax: usize) -> Vec<Complex64> {
        let mut buf: Vec<Complex64> = values[ring.pixels()]
            .iter()
            .map(|&v| Complex64::new(v, 0.0))
            .collect();
        self.plans.get(ring.pixel_count).forward(&mut buf);
        (0..=mmax)
            .map(|m| buf[m % ring.pixel_count] * Complex64::from_polar(1.0, -(m as f64) * ring.phi0))
            .collect()
    }

    /// Quadrature estimate of the coefficients of `values`.
    fn analyze(&mut self, values: &[f64]) -> Alm {
        let lmax = self.table.lmax();
        let mmax = self.table.mmax();
        let weight = 4.0 * PI / self.nside.pixel_count() as f64;
        let mut alm = Alm::zeros(lmax, mmax);
        let mut lambda = vec![0.0; lmax + 1];

        for pair in ring_pairs(self.nside) {
            let north = self.ring_spectrum(&pair.north, values, mmax);
            let south = match &pair.south {
                Some(ring) => self.ring_spectrum(ring, values, mmax),
                None => vec![Complex64::new(0.0, 0.0); mmax + 1],
            };

            for m in 0..=mmax {
                self.table
                    .column(m, pair.north.z, pair.north.sin_theta, &mut lambda);
                let even = (north[m] + south[m]) * weight;
                let odd = (north[m] - south[m]) * weight;
                for (i, a) in alm.column_mut(m).iter_mut().enumerate() {
                    let f = if i % 2 == 0 { even } else { odd };
                    *a += f * lambda[i];
                }
            }
        }
        alm
    }
}

/// Computes the coefficients of `field` up to `lmax` (with `mmax = lmax`).
///
/// The first quadrature estimate is refined by `iterations` Jacobi steps,
/// each analyzing the residual between the field and the synthesis of the
/// current estimate. Pixels without data count as zero.
pub fn map2alm(field: &ScalarField, lmax: usize, iterations: u32) -> Result<Alm> {
    let nside = field.nside();
    let mut values = field.values().to_vec();
    let unseen = field.unseen_count();
    if unseen > 0 {
        log::warn!("{unseen} pixels carry no data and are treated as zero");
        for v in &mut values {
            if is_unseen(*v) {
                *v = 0.0;
            }
        }
    }

    let mut analyzer = Analyzer::new(nside, lmax, lmax);
    let mut alm = analyzer.analyze(&values);

    for step in 0..iterations {
        let model = synthesize(&alm, nside, None, &analyzer.table, &mut analyzer.plans);
        let residual: Vec<f64> = values.iter().zip(&model).map(|(f, s)| f - s).collect();
        let correction = analyzer.analyze(&residual);
        alm.add_assign(&correction)?;
        log::debug!("analysis refinement {} of {iterations} done", step + 1);
    }

    if !alm.is_finite() {
        return Err(Cmb2SphereError::TransformFailure(
            "analysis produced non-finite coefficients".to_string(),
        ));
    }
    Ok(alm)
}

/// Evaluates `alm`, smoothed by a Gaussian beam of width `fwhm` (radians),
/// at every pixel of a grid with resolution `nside`.
pub fn alm2map(alm: &Alm, nside: Nside, fwhm: f64) -> Result<ScalarField> {
    if !alm.is_finite() {
        return Err(Cmb2SphereError::TransformFailure(
            "coefficients contain non-finite values".to_string(),
        ));
    }
    let beam = gaussian_beam(alm.lmax(), fwhm)?;
    let table = LegendreTable::new(alm.lmax(), alm.mmax());
    let values = synthesize(alm, nside, Some(&beam), &table, &mut Plans::default());
    ScalarField::new(nside, values)
}

/// Sums the series ring by ring. `table` must match the band limits of `alm`.
fn synthesize(
    alm: &Alm,
    nside: Nside,
    beam: Option<&[f64]>,
    table: &LegendreTable,
    plans: &mut Plans,
) -> Vec<f64> {
    let lmax = alm.lmax();
    let mmax = alm.mmax();
    // Last multipole whose beam factor is still significant.
    let lcut = beam.map_or(lmax, |b| {
        b.iter().rposition(|&f| f >= BEAM_CUTOFF).unwrap_or(0)
    });
    let beam_at = |l: usize| beam.map_or(1.0, |b| b[l]);

    let mut values = vec![0.0; nside.pixel_count()];
    let mut lambda = vec![0.0; lmax + 1];

    for pair in ring_pairs(nside) {
        let len = pair.north.pixel_count;
        let mut north = vec![Complex64::new(0.0, 0.0); len];
        let mut south = vec![Complex64::new(0.0, 0.0); len];

        for m in 0..=mmax.min(lcut) {
            table.column(m, pair.north.z, pair.north.sin_theta, &mut lambda);
            let mut even = Complex64::new(0.0, 0.0);
            let mut odd = Complex64::new(0.0, 0.0);
            for (i, &a) in alm.column(m)[..=lcut - m].iter().enumerate() {
                let term = a * (lambda[i] * beam_at(m + i));
                if i % 2 == 0 {
                    even += term;
                } else {
                    odd += term;
                }
            }

            let weight = if m == 0 { 1.0 } else { 2.0 };
            let shift = Complex64::from_polar(weight, m as f64 * pair.north.phi0);
            north[m % len] += (even + odd) * shift;
            south[m % len] += (even - odd) * shift;
        }

        let plan = plans.get(len);
        plan.inverse(&mut north);
        for (v, c) in values[pair.north.pixels()].iter_mut().zip(&north) {
            *v = c.re;
        }
        if let Some(ring) = &pair.south {
            plan.inverse(&mut south);
            for (v, c) in values[ring.pixels()].iter_mut().zip(&south) {
                *v = c.re;
            }
        }
    }
    values
}
