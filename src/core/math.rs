//! Small geometric helpers shared by the marcher and the density grid.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// An axis-aligned bounding box.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub min: Vector3<f32>,
    pub max: Vector3<f32>,
}

impl Aabb {
    pub fn new(min: Vector3<f32>, max: Vector3<f32>) -> Self {
        Self { min, max }
    }

    /// Smallest box containing every point. None for an empty slice.
    pub fn from_points(points: &[Vector3<f32>]) -> Option<Self> {
        let first = points.first()?;
        let mut bounds = Self::new(*first, *first);
        for p in &points[1..] {
            bounds.min = bounds.min.inf(p);
            bounds.max = bounds.max.sup(p);
        }
        Some(bounds)
    }

    pub fn padded(&self, amount: f32) -> Self {
        let pad = Vector3::repeat(amount);
        Self::new(self.min - pad, self.max + pad)
    }

    pub fn extent(&self) -> Vector3<f32> {
        self.max - self.min
    }

    pub fn contains(&self, p: &Vector3<f32>) -> bool {
        p.x >= self.min.x
            && p.y >= self.min.y
            && p.z >= self.min.z
            && p.x <= self.max.x
            && p.y <= self.max.y
            && p.z <= self.max.z
    }

    /// Ray parameter at which a ray starting inside the box leaves it (slab method).
    ///
    /// `direction` need not be normalized; the result is in units of `direction`.
    /// Axes with a zero direction component never bound the exit. For an origin
    /// outside the box the result is clamped to 0.
    pub fn exit_distance(&self, origin: &Vector3<f32>, direction: &Vector3<f32>) -> f32 {
        let mut t_exit = f32::INFINITY;
        for axis in 0..3 {
            let d = direction[axis];
            if d > 0.0 {
                t_exit = t_exit.min((self.max[axis] - origin[axis]) / d);
            } else if d < 0.0 {
                t_exit = t_exit.min((self.min[axis] - origin[axis]) / d);
            }
        }
        t_exit.max(0.0)
    }
}
