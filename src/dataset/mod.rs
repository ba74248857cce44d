//! Particle data consumed by the marcher.
//!
//! The marcher only talks to the `ParticleDataset` trait: positions per frame,
//! two radius-limited neighbor queries and a density-grid lookup. Any simulation
//! or file loader can sit behind it. `ParticleSnapshots` is the in-memory
//! implementation used by the CLI and the tests.

mod grid;
pub mod scene;
mod snapshots;

pub use grid::{DensityGrid, NeighborGrid};
pub use snapshots::ParticleSnapshots;

use crate::core::Aabb;
use nalgebra::Vector3;

/// One cell of the density acceleration grid.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DensityNode {
    pub bounds: Aabb,

    /// False means no particle can contribute density anywhere in `bounds`.
    pub may_contain_surface: bool,
}

/// Read-only particle source for a marching pass.
///
/// Implementations are shared across all workers, so every query must be safe to
/// call concurrently and must not allocate per call on the hot path.
pub trait ParticleDataset: Send + Sync {
    /// Tight kernel support radius h.
    fn particle_radius(&self) -> f32;

    /// Extended support radius used for the anisotropy estimate.
    fn particle_radius_ext(&self) -> f32;

    fn particle_radius_inv(&self) -> f32 {
        1.0 / self.particle_radius()
    }

    fn frame_count(&self) -> usize;

    /// Positions of every particle in `frame`.
    fn positions(&self, frame: usize) -> &[Vector3<f32>];

    /// Visit the index of every particle within `particle_radius` of `position`.
    fn for_each_neighbor(&self, position: &Vector3<f32>, frame: usize, visit: &mut dyn FnMut(usize));

    /// Visit the index of every particle within `particle_radius_ext` of `position`.
    fn for_each_neighbor_ext(&self, position: &Vector3<f32>, frame: usize, visit: &mut dyn FnMut(usize));

    /// Density-grid cell containing `position`, or None outside the grid.
    fn density_node(&self, position: &Vector3<f32>, frame: usize) -> Option<DensityNode>;
}
