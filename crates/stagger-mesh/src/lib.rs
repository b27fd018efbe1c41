//! Mesh contract and reference grid for Stagger simulations.
//!
//! This crate defines the [`Mesh`] trait, the narrow view of a
//! distributed, adaptively refined mesh that the orchestration core
//! needs, along with a reference backend and mesh input.
//!
//! # Backends
//!
//! - [`CellGrid`]: axis-aligned hierarchical Cartesian grid in 1–3D,
//!   block-partitioned across ranks
//!
//! # Input
//!
//! Meshes are read through a [`MeshReader`]; [`read_mesh`] resolves the
//! path first and fails with [`MeshError::FileNotFound`] before any
//! parsing happens.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod error;
pub mod grid;
pub mod io;
pub mod mesh;

pub use error::MeshError;
pub use grid::{CellGrid, MAX_COARSE_CELLS};
pub use io::{read_mesh, GridFileReader, MeshReader};
pub use mesh::{Mesh, RefinementSummary};
