//! Configuration options for a cmb2sphere run.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::healpix::Nside;

/// Radius of the undisplaced sphere.
pub const BASE_RADIUS: f64 = 30.0;

/// Fixed displacement per field unit (the field is in Kelvin).
pub const CMB_SCALE_FACTOR: f64 = 20_000.0;

/// Peak displacement as a fraction of the base radius in auto-scale mode.
pub const AUTO_SCALE_FRACTION: f64 = 0.1;

/// Output resolution used when none is given.
pub const DEFAULT_NSIDE: u32 = 128;

/// Smoothing applied when none is given, in degrees.
pub const DEFAULT_FWHM_DEGREES: f64 = 2.0;

/// Source field read when no input is given.
pub const DEFAULT_INPUT: &str = "data/COM_CMB_IQU-commander_1024_R2.02_full.fits";

/// Settings of one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineOptions {
    /// Output resolution.
    pub resolution: Nside,

    /// Gaussian smoothing full width at half maximum, in radians.
    pub smoothing_fwhm: f64,

    /// Radius of the sphere before displacement.
    pub base_radius: f64,

    /// Displacement per field unit when auto-scale is off.
    pub scale_factor: f64,

    /// Derive the scale from the field's peak amplitude instead.
    pub auto_scale: bool,

    /// Peak displacement, relative to `base_radius`, in auto-scale mode.
    pub auto_scale_fraction: f64,

    pub analysis: AnalysisOptions,

    pub cache: CacheOptions,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            resolution: Nside::from_order(DEFAULT_NSIDE.trailing_zeros()),
            smoothing_fwhm: DEFAULT_FWHM_DEGREES.to_radians(),
            base_radius: BASE_RADIUS,
            scale_factor: CMB_SCALE_FACTOR,
            auto_scale: false,
            auto_scale_fraction: AUTO_SCALE_FRACTION,
            analysis: AnalysisOptions::default(),
            cache: CacheOptions::default(),
        }
    }
}

impl PipelineOptions {
    /// Loads options from a JSON file; missing fields take their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Sets the output resolution.
    pub fn with_resolution(mut self, nside: Nside) -> Self {
        self.resolution = nside;
        self
    }

    /// Sets the smoothing from a FWHM in degrees.
    pub fn with_fwhm_degrees(mut self, degrees: f64) -> Self {
        self.smoothing_fwhm = degrees.to_radians();
        self
    }

    /// Turns the result cache off.
    pub fn without_cache(mut self) -> Self {
        self.cache.enabled = false;
        self
    }

    /// Displacement applied per field unit for a field with the given peak.
    ///
    /// In auto-scale mode a zero peak yields a scale of zero, leaving the
    /// sphere undisplaced.
    pub fn displacement_scale(&self, peak_amplitude: f64) -> f64 {
        if !self.auto_scale {
            return self.scale_factor;
        }
        if peak_amplitude > 0.0 && peak_amplitude.is_finite() {
            self.auto_scale_fraction * self.base_radius / peak_amplitude
        } else {
            log::warn!("field has no amplitude; auto-scale leaves the sphere undisplaced");
            0.0
        }
    }
}

/// Settings of the spherical-harmonic analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisOptions {
    /// Band limit; `3 * nside - 1` of the source field when unset.
    pub lmax: Option<usize>,

    /// Jacobi refinement steps after the first quadrature pass.
    pub iterations: u32,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            lmax: None,
            iterations: 3,
        }
    }
}

/// Settings of the result cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheOptions {
    pub enabled: bool,

    /// Directory holding cached entries.
    pub directory: PathBuf,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            directory: PathBuf::from(".cmb2sphere-cache"),
        }
    }
}
