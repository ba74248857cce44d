//! Uniform grids over one particle frame.
//!
//! - `NeighborGrid`: counting-sorted cell lists for radius queries
//! - `DensityGrid`: coarse occupancy flags for empty-space skipping

use nalgebra::Vector3;

use super::DensityNode;
use crate::core::Aabb;

/// Upper bound on cells per axis; the cell size grows instead.
const MAX_CELLS_PER_AXIS: usize = 256;

/// Cell layout shared by both grids.
#[derive(Clone, Debug)]
struct GridLayout {
    origin: Vector3<f32>,
    cell_size: f32,
    inv_cell_size: f32,
    dims: [usize; 3],
}

impl GridLayout {
    fn new(bounds: &Aabb, min_cell_size: f32) -> Self {
        let extent = bounds.extent();
        let longest = extent.max();
        let cell_size = min_cell_size.max(longest / MAX_CELLS_PER_AXIS as f32);
        let dim = |e: f32| ((e / cell_size).ceil() as usize).max(1);
        Self {
            origin: bounds.min,
            cell_size,
            inv_cell_size: 1.0 / cell_size,
            dims: [dim(extent.x), dim(extent.y), dim(extent.z)],
        }
    }

    fn cell_count(&self) -> usize {
        self.dims[0] * self.dims[1] * self.dims[2]
    }

    /// Signed cell coordinates (may be outside the grid).
    #[inline]
    fn coords(&self, p: &Vector3<f32>) -> [i64; 3] {
        let rel = (p - self.origin) * self.inv_cell_size;
        [rel.x.floor() as i64, rel.y.floor() as i64, rel.z.floor() as i64]
    }

    #[inline]
    fn clamp_coords(&self, c: [i64; 3]) -> [usize; 3] {
        [
            c[0].clamp(0, self.dims[0] as i64 - 1) as usize,
            c[1].clamp(0, self.dims[1] as i64 - 1) as usize,
            c[2].clamp(0, self.dims[2] as i64 - 1) as usize,
        ]
    }

    #[inline]
    fn checked_coords(&self, c: [i64; 3]) -> Option<[usize; 3]> {
        let inside = (0..3).all(|a| c[a] >= 0 && (c[a] as usize) < self.dims[a]);
        inside.then(|| [c[0] as usize, c[1] as usize, c[2] as usize])
    }

    #[inline]
    fn linear(&self, c: [usize; 3]) -> usize {
        (c[2] * self.dims[1] + c[1]) * self.dims[0] + c[0]
    }

    fn cell_bounds(&self, c: [usize; 3]) -> Aabb {
        let min = self.origin
            + Vector3::new(c[0] as f32, c[1] as f32, c[2] as f32) * self.cell_size;
        Aabb::new(min, min + Vector3::repeat(self.cell_size))
    }

    /// Inclusive cell range covered by a sphere, clamped to the grid.
    fn range(&self, center: &Vector3<f32>, radius: f32) -> ([usize; 3], [usize; 3]) {
        let r = Vector3::repeat(radius);
        let lo = self.clamp_coords(self.coords(&(center - r)));
        let hi = self.clamp_coords(self.coords(&(center + r)));
        (lo, hi)
    }
}

/// Particle indices bucketed by cell (prefix-sum layout).
#[derive(Clone, Debug)]
pub struct NeighborGrid {
    layout: GridLayout,
    /// `cell_start[c]..cell_start[c + 1]` indexes `particle_indices`
    cell_start: Vec<usize>,
    particle_indices: Vec<usize>,
}

impl NeighborGrid {
    /// Build for queries up to `max_radius`.
    pub fn build(positions: &[Vector3<f32>], max_radius: f32) -> Self {
        let bounds = Aabb::from_points(positions)
            .unwrap_or_else(|| Aabb::new(Vector3::zeros(), Vector3::zeros()))
            .padded(max_radius);
        let layout = GridLayout::new(&bounds, max_radius);
        let cell_count = layout.cell_count();

        let cells: Vec<usize> = positions
            .iter()
            .map(|p| layout.linear(layout.clamp_coords(layout.coords(p))))
            .collect();

        let mut cell_start = vec![0usize; cell_count + 1];
        for &c in &cells {
            cell_start[c + 1] += 1;
        }
        for c in 0..cell_count {
            cell_start[c + 1] += cell_start[c];
        }

        let mut fill = cell_start.clone();
        let mut particle_indices = vec![0usize; positions.len()];
        for (i, &c) in cells.iter().enumerate() {
            particle_indices[fill[c]] = i;
            fill[c] += 1;
        }

        Self {
            layout,
            cell_start,
            particle_indices,
        }
    }

    pub fn cell_size(&self) -> f32 {
        self.layout.cell_size
    }

    /// Visit every particle strictly closer than `radius` to `center`.
    pub fn for_each_within(
        &self,
        positions: &[Vector3<f32>],
        center: &Vector3<f32>,
        radius: f32,
        visit: &mut dyn FnMut(usize),
    ) {
        let radius_sq = radius * radius;
        let (lo, hi) = self.layout.range(center, radius);
        for z in lo[2]..=hi[2] {
            for y in lo[1]..=hi[1] {
                for x in lo[0]..=hi[0] {
                    let c = self.layout.linear([x, y, z]);
                    for &i in &self.particle_indices[self.cell_start[c]..self.cell_start[c + 1]] {
                        if (positions[i] - center).norm_squared() < radius_sq {
                            visit(i);
                        }
                    }
                }
            }
        }
    }
}

/// Occupancy grid: a cell may contain surface iff some particle's kernel
/// support overlaps it.
#[derive(Clone, Debug)]
pub struct DensityGrid {
    layout: GridLayout,
    occupied: Vec<bool>,
}

impl DensityGrid {
    /// `support` is the kernel radius; `cell_size` the requested node size.
    pub fn build(positions: &[Vector3<f32>], support: f32, cell_size: f32) -> Self {
        let bounds = Aabb::from_points(positions)
            .unwrap_or_else(|| Aabb::new(Vector3::zeros(), Vector3::zeros()))
            .padded(support + cell_size);
        let layout = GridLayout::new(&bounds, cell_size);
        let mut occupied = vec![false; layout.cell_count()];

        for p in positions {
            let (lo, hi) = layout.range(p, support);
            for z in lo[2]..=hi[2] {
                for y in lo[1]..=hi[1] {
                    for x in lo[0]..=hi[0] {
                        occupied[layout.linear([x, y, z])] = true;
                    }
                }
            }
        }

        Self { layout, occupied }
    }

    /// Grid with the given bounds and every cell flagged as empty.
    pub fn empty(bounds: Aabb, cell_size: f32) -> Self {
        let layout = GridLayout::new(&bounds, cell_size);
        let occupied = vec![false; layout.cell_count()];
        Self { layout, occupied }
    }

    pub fn cell_size(&self) -> f32 {
        self.layout.cell_size
    }

    pub fn bounds(&self) -> Aabb {
        let d = self.layout.dims;
        let size = Vector3::new(d[0] as f32, d[1] as f32, d[2] as f32) * self.layout.cell_size;
        Aabb::new(self.layout.origin, self.layout.origin + size)
    }

    pub fn occupied_count(&self) -> usize {
        self.occupied.iter().filter(|o| **o).count()
    }

    pub fn node(&self, position: &Vector3<f32>) -> Option<DensityNode> {
        let c = self.layout.checked_coords(self.layout.coords(position))?;
        Some(DensityNode {
            bounds: self.layout.cell_bounds(c),
            may_contain_surface: self.occupied[self.layout.linear(c)],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn brute_force(positions: &[Vector3<f32>], center: &Vector3<f32>, radius: f32) -> Vec<usize> {
        positions
            .iter()
            .enumerate()
            .filter(|(_, p)| (*p - center).norm_squared() < radius * radius)
            .map(|(i, _)| i)
            .collect()
    }

    fn lattice() -> Vec<Vector3<f32>> {
        let mut out = Vec::new();
        for z in 0..6 {
            for y in 0..5 {
                for x in 0..7 {
                    out.push(Vector3::new(x as f32 * 0.13, y as f32 * 0.17 - 0.3, z as f32 * 0.11));
                }
            }
        }
        out
    }

    #[test]
    fn test_neighbor_grid_matches_brute_force() {
        let positions = lattice();
        let grid = NeighborGrid::build(&positions, 0.4);

        for center in [
            Vector3::new(0.3, 0.0, 0.2),
            Vector3::new(-0.5, 0.1, 0.0),
            Vector3::new(0.8, 0.5, 0.6),
        ] {
            for radius in [0.2, 0.4] {
                let mut found = Vec::new();
                grid.for_each_within(&positions, &center, radius, &mut |i| found.push(i));
                found.sort_unstable();
                assert_eq!(found, brute_force(&positions, &center, radius));
            }
        }
    }

    #[test]
    fn test_wide_frame_grows_cells_not_count() {
        let positions = vec![
            Vector3::zeros(),
            Vector3::new(1000.0, 0.0, 0.0),
            Vector3::new(1000.05, 0.0, 0.0),
        ];
        let small = NeighborGrid::build(&lattice(), 0.4);
        assert_eq!(small.cell_size(), 0.4);

        let wide = NeighborGrid::build(&positions, 0.1);
        assert!(wide.cell_size() > 0.1);
        assert!(wide.cell_start.len() <= MAX_CELLS_PER_AXIS.pow(3) + 1);

        let center = Vector3::new(1000.0, 0.0, 0.0);
        let mut found = Vec::new();
        wide.for_each_within(&positions, &center, 0.1, &mut |i| found.push(i));
        found.sort_unstable();
        assert_eq!(found, brute_force(&positions, &center, 0.1));
    }

    #[test]
    fn test_query_far_outside_is_empty() {
        let positions = lattice();
        let grid = NeighborGrid::build(&positions, 0.4);
        let mut count = 0;
        grid.for_each_within(&positions, &Vector3::new(50.0, 50.0, 50.0), 0.4, &mut |_| count += 1);
        assert_eq!(count, 0);
    }

    #[test]
    fn test_density_grid_flags() {
        let positions = vec![Vector3::zeros()];
        let grid = DensityGrid::build(&positions, 0.5, 0.25);
        assert_eq!(grid.cell_size(), 0.25);

        let near = grid.node(&Vector3::new(0.1, 0.0, 0.0)).unwrap();
        assert!(near.may_contain_surface);
        assert!(near.bounds.contains(&Vector3::new(0.1, 0.0, 0.0)));

        let corner = grid.bounds().min + Vector3::repeat(0.01);
        assert!(!grid.node(&corner).unwrap().may_contain_surface);

        assert!(grid.node(&Vector3::new(10.0, 0.0, 0.0)).is_none());
    }

    #[test]
    fn test_empty_grid_has_no_occupied_cells() {
        let grid = DensityGrid::empty(Aabb::new(Vector3::zeros(), Vector3::repeat(1.0)), 0.5);
        assert_eq!(grid.occupied_count(), 0);
        assert!(!grid.node(&Vector3::repeat(0.75)).unwrap().may_contain_surface);
    }
}
