//! Scalar fields sampled on a HEALPix grid.

use std::path::Path;
use std::time::UNIX_EPOCH;

use serde::{Deserialize, Serialize};

use crate::error::{Cmb2SphereError, Result};
use crate::healpix::Nside;

/// Sentinel HEALPix tools write for pixels without data.
pub const UNSEEN: f64 = -1.6375e30;

/// Returns true for values that carry no data (the sentinel or non-finite).
#[must_use]
pub fn is_unseen(value: f64) -> bool {
    !value.is_finite() || (value - UNSEEN).abs() <= UNSEEN.abs() * 1e-5
}

/// An ordered sequence of real values, one per pixel of a RING-ordered grid.
#[derive(Debug, Clone, PartialEq)]
pub struct ScalarField {
    nside: Nside,
    values: Vec<f64>,
}

impl ScalarField {
    /// Wraps `values` as a field at `nside`.
    ///
    /// Returns `ResolutionMismatch` if the length is not `12 * nside^2`.
    pub fn new(nside: Nside, values: Vec<f64>) -> Result<Self> {
        let expected = nside.pixel_count();
        if values.len() != expected {
            return Err(Cmb2SphereError::ResolutionMismatch {
                expected,
                actual: values.len(),
            });
        }
        Ok(Self { nside, values })
    }

    /// A field of zeros.
    #[must_use]
    pub fn zeros(nside: Nside) -> Self {
        Self {
            nside,
            values: vec![0.0; nside.pixel_count()],
        }
    }

    /// Resolution of the field.
    #[must_use]
    pub fn nside(&self) -> Nside {
        self.nside
    }

    /// Values in RING pixel order.
    #[must_use]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Number of pixels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Always false for a valid field; provided for API symmetry.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Largest absolute value over pixels that carry data.
    #[must_use]
    pub fn peak_amplitude(&self) -> f64 {
        self.values
            .iter()
            .copied()
            .filter(|v| !is_unseen(*v))
            .fold(0.0, |peak: f64, v| peak.max(v.abs()))
    }

    /// Number of pixels without data.
    #[must_use]
    pub fn unseen_count(&self) -> usize {
        self.values.iter().filter(|v| is_unseen(**v)).count()
    }
}

/// Stable identity of a source field, used to key cached coefficients.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceIdentity(String);

impl SourceIdentity {
    /// Identity of a file: canonical path, byte length and modification time.
    ///
    /// Replacing the file under the same name yields a new identity.
    pub fn from_path(path: &Path) -> Result<Self> {
        let canonical = path.canonicalize().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Cmb2SphereError::MissingInput {
                    path: path.to_path_buf(),
                }
            } else {
                Cmb2SphereError::IoError(e)
            }
        })?;
        let metadata = std::fs::metadata(&canonical)?;
        let modified = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map_or(0, |d| d.as_nanos());
        Ok(Self(format!(
            "{}#{}#{}",
            canonical.display(),
            metadata.len(),
            modified
        )))
    }

    /// Identity with an explicit name, for in-memory fields.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The identity text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SourceIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_length_must_match_resolution() {
        let nside = Nside::new(2).unwrap();
        assert!(ScalarField::new(nside, vec![0.0; 48]).is_ok());
        let err = ScalarField::new(nside, vec![0.0; 47]).unwrap_err();
        assert!(matches!(
            err,
            Cmb2SphereError::ResolutionMismatch {
                expected: 48,
                actual: 47
            }
        ));
    }

    #[test]
    fn test_peak_amplitude_ignores_unseen() {
        let nside = Nside::new(1).unwrap();
        let mut values = vec![0.0; 12];
        values[0] = -3.0;
        values[1] = 2.0;
        values[2] = UNSEEN;
        values[3] = f64::NAN;
        let field = ScalarField::new(nside, values).unwrap();
        assert_eq!(field.peak_amplitude(), 3.0);
        assert_eq!(field.unseen_count(), 2);
    }

    #[test]
    fn test_source_identity_tracks_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("map.fits");
        std::fs::write(&path, b"abc").unwrap();
        let first = SourceIdentity::from_path(&path).unwrap();
        assert_eq!(first, SourceIdentity::from_path(&path).unwrap());

        let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"def").unwrap();
        drop(file);
        assert_ne!(first, SourceIdentity::from_path(&path).unwrap());
    }

    #[test]
    fn test_source_identity_missing_file() {
        let err = SourceIdentity::from_path(Path::new("/nonexistent/map.fits")).unwrap_err();
        assert!(matches!(err, Cmb2SphereError::MissingInput { .. }));
    }
}
