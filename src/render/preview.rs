//! Debug images of a marching pass.

use image::{GrayImage, Luma, Rgb, RgbImage};
use nalgebra::Vector3;

use crate::core::SurfaceBuffers;

/// Map hit normals from [-1, 1] to RGB; misses stay black.
pub fn normals_to_image(buffers: &SurfaceBuffers) -> RgbImage {
    let mut img = RgbImage::new(buffers.width(), buffers.height());
    for (x, y, px) in img.enumerate_pixels_mut() {
        let n = buffers.normal_at(x, y);
        if n.w == 0.0 {
            continue;
        }
        let c = (n.xyz() * 0.5).add_scalar(0.5);
        *px = Rgb([unit_to_u8(c.x), unit_to_u8(c.y), unit_to_u8(c.z)]);
    }
    img
}

/// Distance from `eye` to each hit, nearest white and farthest dark.
/// Misses are black.
pub fn distance_to_image(buffers: &SurfaceBuffers, eye: &Vector3<f32>) -> GrayImage {
    let distances: Vec<Option<f32>> = buffers
        .positions_vec()
        .iter()
        .map(|p| (p.w != 0.0).then(|| (p.xyz() - eye).norm()))
        .collect();

    let (near, far) = distances
        .iter()
        .flatten()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), d| (lo.min(*d), hi.max(*d)));
    let span = (far - near).max(1e-6);

    let mut img = GrayImage::new(buffers.width(), buffers.height());
    for (i, d) in distances.iter().enumerate() {
        let Some(d) = d else { continue };
        let x = (i as u32) % buffers.width();
        let y = (i as u32) / buffers.width();
        // Keep hits visibly brighter than the black background.
        let shade = 1.0 - 0.8 * (d - near) / span;
        img.put_pixel(x, y, Luma([unit_to_u8(shade)]));
    }
    img
}

#[inline]
fn unit_to_u8(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0 + 0.5) as u8
}
