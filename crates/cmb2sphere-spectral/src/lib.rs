//! Spherical-harmonic resampling of HEALPix fields.
//!
//! A source field is analyzed into band-limited coefficients once, then
//! synthesized at any target resolution with optional Gaussian smoothing.
//! [`SpectralResampler`] puts both steps behind a [`ResultCache`].
//!
//! [`ResultCache`]: cmb2sphere_core::ResultCache

#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]

pub mod fft;
pub mod legendre;
pub mod resampler;
pub mod transform;

pub use fft::FftPlan;
pub use legendre::LegendreTable;
pub use resampler::SpectralResampler;
pub use transform::{alm2map, gaussian_beam, map2alm, BEAM_CUTOFF};
