//! In-memory multi-frame particle dataset.

use nalgebra::Vector3;
use rayon::prelude::*;

use super::grid::{DensityGrid, NeighborGrid};
use super::{DensityNode, ParticleDataset};

/// Acceleration structures for one frame.
#[derive(Clone, Debug)]
struct FrameIndex {
    positions: Vec<Vector3<f32>>,
    neighbors: NeighborGrid,
    density: DensityGrid,
}

impl FrameIndex {
    fn build(positions: Vec<Vector3<f32>>, radius: f32, radius_ext: f32, density_cell: f32) -> Self {
        let neighbors = NeighborGrid::build(&positions, radius.max(radius_ext));
        let density = DensityGrid::build(&positions, radius, density_cell);
        Self {
            positions,
            neighbors,
            density,
        }
    }
}

/// A sequence of particle frames with per-frame neighbor and density grids.
#[derive(Clone, Debug)]
pub struct ParticleSnapshots {
    frames: Vec<FrameIndex>,
    radius: f32,
    radius_ext: f32,
}

impl ParticleSnapshots {
    /// Index every frame. `radius` is the kernel support h, `radius_ext` the
    /// anisotropy neighborhood radius. Density-grid cells are `2h` wide.
    pub fn new(frames: Vec<Vec<Vector3<f32>>>, radius: f32, radius_ext: f32) -> Self {
        Self::with_density_cell(frames, radius, radius_ext, 2.0 * radius)
    }

    pub fn with_density_cell(
        frames: Vec<Vec<Vector3<f32>>>,
        radius: f32,
        radius_ext: f32,
        density_cell: f32,
    ) -> Self {
        let frames = frames
            .into_par_iter()
            .map(|positions| FrameIndex::build(positions, radius, radius_ext, density_cell))
            .collect();
        Self {
            frames,
            radius,
            radius_ext,
        }
    }

    /// Single-frame dataset.
    pub fn single(positions: Vec<Vector3<f32>>, radius: f32, radius_ext: f32) -> Self {
        Self::new(vec![positions], radius, radius_ext)
    }

    pub fn density_grid(&self, frame: usize) -> &DensityGrid {
        &self.frames[frame].density
    }

    pub fn particle_count(&self, frame: usize) -> usize {
        self.frames[frame].positions.len()
    }
}

impl ParticleDataset for ParticleSnapshots {
    fn particle_radius(&self) -> f32 {
        self.radius
    }

    fn particle_radius_ext(&self) -> f32 {
        self.radius_ext
    }

    fn frame_count(&self) -> usize {
        self.frames.len()
    }

    fn positions(&self, frame: usize) -> &[Vector3<f32>] {
        &self.frames[frame].positions
    }

    fn for_each_neighbor(&self, position: &Vector3<f32>, frame: usize, visit: &mut dyn FnMut(usize)) {
        let f = &self.frames[frame];
        f.neighbors.for_each_within(&f.positions, position, self.radius, visit);
    }

    fn for_each_neighbor_ext(&self, position: &Vector3<f32>, frame: usize, visit: &mut dyn FnMut(usize)) {
        let f = &self.frames[frame];
        f.neighbors.for_each_within(&f.positions, position, self.radius_ext, visit);
    }

    fn density_node(&self, position: &Vector3<f32>, frame: usize) -> Option<DensityNode> {
        self.frames[frame].density.node(position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frames_are_independent() {
        let data = ParticleSnapshots::new(
            vec![
                vec![Vector3::zeros()],
                vec![Vector3::new(5.0, 0.0, 0.0), Vector3::new(5.1, 0.0, 0.0)],
            ],
            0.5,
            1.0,
        );
        assert_eq!(data.frame_count(), 2);
        assert_eq!(data.particle_count(1), 2);

        let mut hits = Vec::new();
        data.for_each_neighbor(&Vector3::zeros(), 0, &mut |i| hits.push(i));
        assert_eq!(hits, vec![0]);

        hits.clear();
        data.for_each_neighbor(&Vector3::zeros(), 1, &mut |i| hits.push(i));
        assert!(hits.is_empty());
    }

    #[test]
    fn test_extended_query_is_superset() {
        let positions = vec![
            Vector3::zeros(),
            Vector3::new(0.4, 0.0, 0.0),
            Vector3::new(0.8, 0.0, 0.0),
        ];
        let data = ParticleSnapshots::single(positions, 0.5, 1.0);

        let mut tight = Vec::new();
        data.for_each_neighbor(&Vector3::zeros(), 0, &mut |i| tight.push(i));
        let mut ext = Vec::new();
        data.for_each_neighbor_ext(&Vector3::zeros(), 0, &mut |i| ext.push(i));
        tight.sort_unstable();
        ext.sort_unstable();

        assert_eq!(tight, vec![0, 1]);
        assert_eq!(ext, vec![0, 1, 2]);
        assert!((data.particle_radius_inv() - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_density_grid_per_frame() {
        let data = ParticleSnapshots::with_density_cell(
            vec![vec![Vector3::zeros()], vec![Vector3::new(5.0, 0.0, 0.0)]],
            0.5,
            1.0,
            0.3,
        );
        for frame in 0..2 {
            let grid = data.density_grid(frame);
            assert_eq!(grid.cell_size(), 0.3);
            assert!(grid.occupied_count() > 0);
        }

        let far = Vector3::new(5.0, 0.0, 0.0);
        assert!(data.density_grid(0).node(&far).is_none());
        assert!(data.density_node(&far, 1).unwrap().may_contain_surface);
    }
}
