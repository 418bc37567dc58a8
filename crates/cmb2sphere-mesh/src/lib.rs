//! Sphere triangulation and mesh output for cmb2sphere.
//!
//! The triangle connectivity of a HEALPix grid depends only on its
//! resolution: [`TopologyBuilder`] computes it once as the convex hull of the
//! pixel directions, rewinds inward-facing triangles and caches the result.
//! [`project_field`] then displaces the pixel directions by field values and
//! [`Mesh::assemble`] pairs them with the topology for export.

#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]

pub mod export;
pub mod hull;
pub mod mesh;
pub mod ply;
pub mod stl;
pub mod topology;

pub use export::{save_mesh, MeshFormat};
pub use hull::{ConvexHull, HullFacet};
pub use mesh::{project_field, Mesh};
pub use ply::write_ply;
pub use stl::{load_stl, write_stl, StlFacet};
pub use topology::{build_topology, fix_orientation, validate, TopologyBuilder};
