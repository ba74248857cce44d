//! # sph-surface-rs: isosurface ray marching for SPH particle fluids
//!
//! Reconstructs the free surface of a particle fluid directly in screen space.
//! For every pixel of a pre-rasterized depth buffer a ray is marched through the
//! smoothed density field until it crosses an iso-threshold; the hit position and
//! the density-gradient normal are written to per-pixel output buffers.
//!
//! ## Architecture
//!
//! - `core`: settings, camera, output buffers and per-worker scratch
//! - `kernel`: cubic-spline and anisotropic density kernels, WPCA anisotropy
//! - `pool`: persistent worker pool with an atomic work counter
//! - `dataset`: the particle-source trait plus an in-memory implementation
//! - `render`: the ray marcher and preview image helpers
//!
//! A pass is `RayMarcher::prepare` followed by `start` and polling `is_done`
//! (or `march`, which does both and blocks).

// Core data structures
pub mod core;

// Density kernels and anisotropy estimation
pub mod kernel;

// Parallel batch execution
pub mod pool;

// Particle sources and spatial lookup
pub mod dataset;

// Ray marching pipeline
pub mod render;

// Re-export commonly used types at crate root for convenience
pub use core::{FrameCamera, SurfaceBuffers, VisualizationSettings};
pub use dataset::{ParticleDataset, ParticleSnapshots};
pub use render::{MarchError, MarcherConfig, RayMarcher};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
