//! Cached resampling of a source field to a target resolution.

use cmb2sphere_core::{
    AnalysisOptions, CacheKey, Cmb2SphereError, Lookup, Nside, Result, ResultCache, ScalarField,
    SourceIdentity, SpectralCoefficients,
};

use crate::transform::{alm2map, map2alm};

/// Resamples fields through their spherical-harmonic coefficients.
///
/// Coefficients are cached per source field, band limit and iteration count.
/// Resampled fields are additionally keyed by resolution and smoothing.
/// Identical requests are served from the cache without recomputation.
#[derive(Debug)]
pub struct SpectralResampler<'a> {
    cache: &'a mut ResultCache,
    settings: AnalysisOptions,
}

impl<'a> SpectralResampler<'a> {
    pub fn new(cache: &'a mut ResultCache, settings: AnalysisOptions) -> Self {
        Self { cache, settings }
    }

    /// Band limit used for a source field at `nside`.
    pub fn lmax_for(&self, nside: Nside) -> usize {
        self.settings.lmax.unwrap_or_else(|| nside.default_lmax())
    }

    /// Returns the coefficients of `field`, computing and caching them on a miss.
    pub fn analyze(
        &mut self,
        field: &ScalarField,
        source: &SourceIdentity,
    ) -> Result<SpectralCoefficients> {
        let lmax = self.lmax_for(field.nside());
        let key = CacheKey::coefficients(source, lmax, self.settings.iterations);

        if let Lookup::Found(coefficients) = self.cache.lookup::<SpectralCoefficients>(&key)? {
            log::info!("alm loaded (lmax={lmax})");
            return Ok(coefficients);
        }

        log::info!(
            "generating alm (nside={}, lmax={lmax}, iterations={})",
            field.nside(),
            self.settings.iterations
        );
        let coefficients = SpectralCoefficients {
            source: source.clone(),
            alm: map2alm(field, lmax, self.settings.iterations)?,
        };
        self.cache.store(&key, &coefficients)?;
        Ok(coefficients)
    }

    /// Returns the field of `coefficients` at `nside` smoothed with `fwhm`
    /// (radians), computing and caching it on a miss.
    pub fn synthesize(
        &mut self,
        coefficients: &SpectralCoefficients,
        nside: Nside,
        fwhm: f64,
    ) -> Result<ScalarField> {
        if !fwhm.is_finite() || fwhm < 0.0 {
            return Err(Cmb2SphereError::TransformFailure(format!(
                "smoothing FWHM must be finite and non-negative, got {fwhm}"
            )));
        }
        let key = CacheKey::resampled_field(
            &coefficients.source,
            coefficients.alm.lmax(),
            self.settings.iterations,
            nside,
            fwhm,
        );

        if let Lookup::Found(field) = self.cache.lookup::<ScalarField>(&key)? {
            if field.nside() != nside {
                return Err(Cmb2SphereError::ResolutionMismatch {
                    expected: nside.pixel_count(),
                    actual: field.len(),
                });
            }
            log::info!("resampled field loaded (nside={nside})");
            return Ok(field);
        }

        log::info!("synthesizing field (nside={nside}, fwhm={fwhm:.6} rad)");
        let field = alm2map(&coefficients.alm, nside, fwhm)?;
        self.cache.store(&key, &field)?;
        Ok(field)
    }

    /// Analyzes `field` and synthesizes it at `nside` with smoothing `fwhm`.
    pub fn resample(
        &mut self,
        field: &ScalarField,
        source: &SourceIdentity,
        nside: Nside,
        fwhm: f64,
    ) -> Result<ScalarField> {
        let coefficients = self.analyze(field, source)?;
        self.synthesize(&coefficients, nside, fwhm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cmb2sphere_core::{CacheEntry, CacheStore, MemoryStore};

    fn source_field() -> ScalarField {
        let nside = Nside::new(4).unwrap();
        let values = nside
            .directions()
            .directions()
            .iter()
            .map(|d| 1e-4 * d.theta.cos() + 2e-5 * (2.0 * d.phi).sin())
            .collect();
        ScalarField::new(nside, values).unwrap()
    }

    fn settings() -> AnalysisOptions {
        AnalysisOptions {
            lmax: None,
            iterations: 1,
        }
    }

    #[test]
    fn test_analyze_is_cached() {
        let mut cache = ResultCache::in_memory();
        let field = source_field();
        let source = SourceIdentity::named("test-map");

        let first = SpectralResampler::new(&mut cache, settings())
            .analyze(&field, &source)
            .unwrap();
        let second = SpectralResampler::new(&mut cache, settings())
            .analyze(&field, &source)
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(first.alm.lmax(), 11);
        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.writes), (1, 1, 1));
    }

    #[test]
    fn test_cached_and_uncached_results_agree() {
        let field = source_field();
        let source = SourceIdentity::named("test-map");
        let nside = Nside::new(2).unwrap();
        let fwhm = 5.0_f64.to_radians();

        let mut disabled = ResultCache::disabled();
        let uncached = SpectralResampler::new(&mut disabled, settings())
            .resample(&field, &source, nside, fwhm)
            .unwrap();

        let mut cache = ResultCache::in_memory();
        let computed = SpectralResampler::new(&mut cache, settings())
            .resample(&field, &source, nside, fwhm)
            .unwrap();
        let cached = SpectralResampler::new(&mut cache, settings())
            .resample(&field, &source, nside, fwhm)
            .unwrap();

        assert_eq!(uncached, computed);
        assert_eq!(computed, cached);
        assert_eq!(cached.len(), 48);
    }

    #[test]
    fn test_changed_analysis_settings_miss_the_cache() {
        let field = source_field();
        let source = SourceIdentity::named("test-map");
        let nside = Nside::new(2).unwrap();
        let fwhm = 3.0_f64.to_radians();
        let variants = [
            AnalysisOptions { lmax: None, iterations: 0 },
            AnalysisOptions { lmax: None, iterations: 2 },
            AnalysisOptions { lmax: Some(5), iterations: 0 },
        ];

        let mut shared = ResultCache::in_memory();
        let mut results = Vec::new();
        for settings in variants {
            let mut disabled = ResultCache::disabled();
            let uncached = SpectralResampler::new(&mut disabled, settings.clone())
                .resample(&field, &source, nside, fwhm)
                .unwrap();
            let cached = SpectralResampler::new(&mut shared, settings)
                .resample(&field, &source, nside, fwhm)
                .unwrap();
            assert_eq!(cached, uncached);
            results.push(cached);
        }
        assert_eq!(shared.stats().hits, 0);
        assert_ne!(results[0], results[1]);
        assert_ne!(results[0], results[2]);
    }

    #[test]
    fn test_rejects_bad_fwhm() {
        let mut cache = ResultCache::disabled();
        let field = source_field();
        let source = SourceIdentity::named("test-map");
        let mut resampler = SpectralResampler::new(&mut cache, settings());
        let coefficients = resampler.analyze(&field, &source).unwrap();
        for fwhm in [-0.1, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                resampler.synthesize(&coefficients, Nside::new(2).unwrap(), fwhm),
                Err(Cmb2SphereError::TransformFailure(_))
            ));
        }
    }

    #[test]
    fn test_cached_field_of_wrong_resolution_is_rejected() {
        let source = SourceIdentity::named("test-map");
        let nside = Nside::new(2).unwrap();
        let key = CacheKey::resampled_field(&source, 3, settings().iterations, nside, 0.0);

        // An entry whose header claims a different resolution than the key.
        let mut store = MemoryStore::new();
        store
            .put(
                &key,
                &CacheEntry {
                    kind: "field".to_string(),
                    shape: serde_json_shape(1, 12),
                    payload: vec![0u8; 12 * 8],
                },
            )
            .unwrap();
        let mut cache = ResultCache::with_store(Box::new(store));
        let coefficients = SpectralCoefficients {
            source,
            alm: cmb2sphere_core::Alm::zeros(3, 3),
        };
        let err = SpectralResampler::new(&mut cache, settings())
            .synthesize(&coefficients, nside, 0.0)
            .unwrap_err();
        assert!(matches!(
            err,
            Cmb2SphereError::ResolutionMismatch {
                expected: 48,
                actual: 12
            }
        ));
    }

    fn serde_json_shape(nside: u32, len: usize) -> serde_json::Value {
        serde_json::json!({ "nside": nside, "len": len })
    }
}
