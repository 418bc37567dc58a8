//! Core abstractions for cmb2sphere.
//!
//! This crate provides the types shared by every stage of the pipeline:
//! - [`Nside`] and [`AngularGrid`] for the HEALPix RING pixelization
//! - [`ScalarField`], [`Alm`] and [`TriangleTopology`] data model types
//! - [`ResultCache`] for write-once storage of expensive intermediates
//! - [`PipelineOptions`] and the HEALPix FITS reader/writer

// Documentation lints - internal functions don't need exhaustive panic/error docs
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
// Accessors and builders return values that are obviously meant to be used
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]

pub mod alm;
pub mod cache;
pub mod error;
pub mod field;
pub mod fits;
pub mod healpix;
pub mod options;
pub mod topology;

pub use alm::{alm_len, Alm, SpectralCoefficients};
pub use cache::{
    CacheArtifact, CacheEntry, CacheKey, CacheStats, CacheStore, DirectoryStore, Lookup,
    MemoryStore, ResultCache,
};
pub use error::{Cmb2SphereError, Result};
pub use field::{is_unseen, ScalarField, SourceIdentity, UNSEEN};
pub use fits::{read_healpix_map, write_healpix_map};
pub use healpix::{
    directions, pixel_count, AngularGrid, Direction, Nside, Ring, MAX_NSIDE, PIXELIZATION_SCHEME,
};
pub use options::{AnalysisOptions, CacheOptions, PipelineOptions};
pub use topology::TriangleTopology;

// Re-export glam types for convenience
pub use glam::DVec3;
pub use num_complex::Complex64;
