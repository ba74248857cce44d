//! Per-pixel input and output buffers.
//!
//! `SurfaceBuffers` is written concurrently by the worker pool. Every pixel is
//! claimed by exactly one worker per pass, so the slots only need relaxed atomic
//! stores; the pool's completion handshake publishes them to the reader.

use nalgebra::{Vector3, Vector4};
use std::sync::atomic::{AtomicU32, Ordering};

use super::camera::BACKGROUND_DEPTH;

/// Four f32 lanes stored as atomic bit patterns.
#[derive(Debug, Default)]
struct AtomicVec4([AtomicU32; 4]);

impl AtomicVec4 {
    #[inline]
    fn store(&self, v: Vector4<f32>) {
        for (lane, value) in self.0.iter().zip(v.iter()) {
            lane.store(value.to_bits(), Ordering::Relaxed);
        }
    }

    #[inline]
    fn load(&self) -> Vector4<f32> {
        Vector4::new(
            f32::from_bits(self.0[0].load(Ordering::Relaxed)),
            f32::from_bits(self.0[1].load(Ordering::Relaxed)),
            f32::from_bits(self.0[2].load(Ordering::Relaxed)),
            f32::from_bits(self.0[3].load(Ordering::Relaxed)),
        )
    }
}

/// Surface hit positions and normals, one entry per pixel.
///
/// `w` is 1.0 for a hit and the whole entry is zero otherwise.
#[derive(Debug)]
pub struct SurfaceBuffers {
    width: u32,
    height: u32,
    positions: Box<[AtomicVec4]>,
    normals: Box<[AtomicVec4]>,
}

impl SurfaceBuffers {
    pub fn new(width: u32, height: u32) -> Self {
        let len = width as usize * height as usize;
        Self {
            width,
            height,
            positions: (0..len).map(|_| AtomicVec4::default()).collect(),
            normals: (0..len).map(|_| AtomicVec4::default()).collect(),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    #[inline]
    pub fn write_hit(&self, pixel: usize, position: Vector3<f32>, normal: Vector3<f32>) {
        self.positions[pixel].store(position.push(1.0));
        self.normals[pixel].store(normal.push(1.0));
    }

    #[inline]
    pub fn clear_pixel(&self, pixel: usize) {
        self.positions[pixel].store(Vector4::zeros());
        self.normals[pixel].store(Vector4::zeros());
    }

    pub fn position(&self, pixel: usize) -> Vector4<f32> {
        self.positions[pixel].load()
    }

    pub fn normal(&self, pixel: usize) -> Vector4<f32> {
        self.normals[pixel].load()
    }

    pub fn position_at(&self, x: u32, y: u32) -> Vector4<f32> {
        self.position(self.index(x, y))
    }

    pub fn normal_at(&self, x: u32, y: u32) -> Vector4<f32> {
        self.normal(self.index(x, y))
    }

    pub fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    /// Copy of all positions (for export or comparisons).
    pub fn positions_vec(&self) -> Vec<Vector4<f32>> {
        self.positions.iter().map(AtomicVec4::load).collect()
    }

    pub fn normals_vec(&self) -> Vec<Vector4<f32>> {
        self.normals.iter().map(AtomicVec4::load).collect()
    }

    /// Number of pixels whose ray found the surface in the last pass.
    pub fn hit_count(&self) -> usize {
        self.positions.iter().filter(|p| p.load().w > 0.0).count()
    }
}

/// A depth buffer where every pixel is background.
pub fn background_depth(width: u32, height: u32) -> Vec<f32> {
    vec![BACKGROUND_DEPTH; width as usize * height as usize]
}

/// A depth buffer with every pixel starting at the same NDC depth.
pub fn constant_depth(width: u32, height: u32, depth: f32) -> Vec<f32> {
    vec![depth; width as usize * height as usize]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_buffers_are_zero() {
        let buffers = SurfaceBuffers::new(3, 2);
        assert_eq!(buffers.len(), 6);
        assert!(buffers.positions_vec().iter().all(|p| *p == Vector4::zeros()));
        assert_eq!(buffers.hit_count(), 0);
    }

    #[test]
    fn test_write_and_clear() {
        let buffers = SurfaceBuffers::new(4, 4);
        let idx = buffers.index(1, 2);
        assert_eq!(idx, 9);

        buffers.write_hit(idx, Vector3::new(1.0, 2.0, 3.0), Vector3::z());
        assert_eq!(buffers.position_at(1, 2), Vector4::new(1.0, 2.0, 3.0, 1.0));
        assert_eq!(buffers.normal_at(1, 2), Vector4::new(0.0, 0.0, 1.0, 1.0));
        assert_eq!(buffers.hit_count(), 1);

        buffers.clear_pixel(idx);
        assert_eq!(buffers.position(idx), Vector4::zeros());
        assert_eq!(buffers.normal(idx), Vector4::zeros());
    }
}
