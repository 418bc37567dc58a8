//! cmb2sphere: turn a CMB temperature map into a displaced sphere mesh.
//!
//! The [`Pipeline`] runs every stage of a conversion in order:
//!
//! 1. read the source map (HEALPix FITS) at its native resolution
//! 2. analyze it into spherical-harmonic coefficients
//! 3. synthesize the coefficients at the output resolution with smoothing
//! 4. displace the pixel directions by the field values
//! 5. pair them with the cached sphere triangulation
//! 6. write the mesh (STL or PLY)
//!
//! Coefficients, resampled fields and triangulations are kept in a
//! [`ResultCache`] so repeated runs only pay for what changed.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use cmb2sphere::{Pipeline, PipelineOptions};
//!
//! let options = PipelineOptions::default().with_fwhm_degrees(3.0);
//! let mut pipeline = Pipeline::new(options)?;
//! let summary = pipeline.run(Path::new("map.fits"), Path::new("cmb.stl"))?;
//! println!("{} triangles", summary.triangles);
//! # Ok::<(), cmb2sphere::Cmb2SphereError>(())
//! ```

#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]

use std::path::Path;

pub use cmb2sphere_core::{
    read_healpix_map, write_healpix_map, CacheStats, Cmb2SphereError, Nside, PipelineOptions,
    Result, ResultCache, ScalarField, SourceIdentity, TriangleTopology,
};
pub use cmb2sphere_mesh::{load_stl, save_mesh, Mesh, MeshFormat};

use cmb2sphere_mesh::{project_field, TopologyBuilder};
use cmb2sphere_spectral::SpectralResampler;

/// A mesh built from a field, with the scale that displaced it.
#[derive(Debug, Clone)]
pub struct DisplacedMesh {
    pub mesh: Mesh,
    /// Displacement applied per field unit.
    pub scale: f64,
    pub peak_amplitude: f64,
    /// Triangles rewound while the topology was built.
    pub corrected_triangles: usize,
}

/// What a completed run produced.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub nside: Nside,
    pub vertices: usize,
    pub triangles: usize,
    pub corrected_triangles: usize,
    pub scale: f64,
    pub peak_amplitude: f64,
    pub max_radius: f64,
    pub format: MeshFormat,
}

/// Converts source maps into meshes with one set of options and one cache.
#[derive(Debug)]
pub struct Pipeline {
    options: PipelineOptions,
    cache: ResultCache,
}

impl Pipeline {
    /// Creates a pipeline with the cache described by `options.cache`.
    pub fn new(options: PipelineOptions) -> Result<Self> {
        let cache = if options.cache.enabled {
            ResultCache::on_disk(&options.cache.directory)?
        } else {
            ResultCache::disabled()
        };
        Ok(Self::with_cache(options, cache))
    }

    /// Creates a pipeline around an existing cache.
    pub fn with_cache(options: PipelineOptions, cache: ResultCache) -> Self {
        Self { options, cache }
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Reads `input`, builds the mesh and writes it to `output`.
    ///
    /// The output file is touched only after every other stage succeeded.
    pub fn run(&mut self, input: &Path, output: &Path) -> Result<RunSummary> {
        let field = read_healpix_map(input)?;
        let source = SourceIdentity::from_path(input)?;
        log::info!("source {source}: nside={}", field.nside());

        let resampled = self.resample(&field, &source)?;
        let built = self.build_mesh(&resampled)?;
        let format = save_mesh(&built.mesh, output)?;

        let summary = RunSummary {
            nside: resampled.nside(),
            vertices: built.mesh.vertices.len(),
            triangles: built.mesh.len(),
            corrected_triangles: built.corrected_triangles,
            scale: built.scale,
            peak_amplitude: built.peak_amplitude,
            max_radius: built.mesh.max_radius(),
            format,
        };
        let stats = self.cache.stats();
        log::debug!(
            "cache: {} hits, {} misses, {} writes",
            stats.hits,
            stats.misses,
            stats.writes
        );
        Ok(summary)
    }

    /// Resamples a source field to the configured resolution and smoothing.
    pub fn resample(&mut self, field: &ScalarField, source: &SourceIdentity) -> Result<ScalarField> {
        let nside = self.options.resolution;
        let fwhm = self.options.smoothing_fwhm;
        SpectralResampler::new(&mut self.cache, self.options.analysis.clone())
            .resample(field, source, nside, fwhm)
    }

    /// Displaces the sphere by `field` and triangulates it at the field's
    /// own resolution.
    pub fn build_mesh(&mut self, field: &ScalarField) -> Result<DisplacedMesh> {
        let nside = field.nside();
        let peak_amplitude = field.peak_amplitude();
        let scale = self.options.displacement_scale(peak_amplitude);
        log::info!("displacement scale {scale} (peak amplitude {peak_amplitude:e})");

        let vertices = project_field(
            &nside.directions(),
            field,
            self.options.base_radius,
            scale,
        )?;
        let topology = TopologyBuilder::new(&mut self.cache).topology(nside)?;
        let mesh = Mesh::assemble(&topology, vertices)?;

        Ok(DisplacedMesh {
            mesh,
            scale,
            peak_amplitude,
            corrected_triangles: topology.corrected_count(),
        })
    }
}
