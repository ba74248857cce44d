//! Frame camera used to turn depth-buffer pixels back into world-space rays.
//!
//! Clip-space conventions (matching the depth buffers we consume):
//! - right-handed view space, camera looking down -Z
//! - NDC depth in [0, 1], 0 at the near plane, 1 at the far plane
//! - NDC y grows downwards, so pixel row 0 is the top of the image

use nalgebra::{Matrix4, Point3, Vector2, Vector3, Vector4};
use serde::{Deserialize, Serialize};

/// Depth value marking a background pixel (nothing was rasterized there).
pub const BACKGROUND_DEPTH: f32 = 1.0;

/// Camera state captured once per marching pass.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FrameCamera {
    /// Projection × view (world to clip)
    pub proj_view: Matrix4<f32>,

    /// Inverse of `proj_view` (clip to world)
    pub inv_proj_view: Matrix4<f32>,

    /// Camera center in world space
    pub position: Vector3<f32>,

    /// Frame width (pixels)
    pub width: u32,

    /// Frame height (pixels)
    pub height: u32,
}

impl FrameCamera {
    /// Build a camera from a projection-view matrix.
    ///
    /// Returns None if the matrix is not invertible.
    pub fn new(proj_view: Matrix4<f32>, position: Vector3<f32>, width: u32, height: u32) -> Option<Self> {
        let inv_proj_view = proj_view.try_inverse()?;
        Some(Self {
            proj_view,
            inv_proj_view,
            position,
            width,
            height,
        })
    }

    /// Perspective camera at `eye` looking at `target`.
    ///
    /// `fov_y` is the vertical field of view in radians.
    #[allow(clippy::too_many_arguments)]
    pub fn look_at(
        eye: Vector3<f32>,
        target: Vector3<f32>,
        up: Vector3<f32>,
        fov_y: f32,
        z_near: f32,
        z_far: f32,
        width: u32,
        height: u32,
    ) -> Option<Self> {
        let view = Matrix4::look_at_rh(&Point3::from(eye), &Point3::from(target), &up);
        let projection = perspective_zero_to_one(fov_y, width as f32 / height as f32, z_near, z_far);
        Self::new(projection * view, eye, width, height)
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// NDC coordinates of a pixel center.
    pub fn pixel_to_ndc(&self, x: u32, y: u32) -> Vector2<f32> {
        Vector2::new(
            (x as f32 + 0.5) / self.width as f32 * 2.0 - 1.0,
            (y as f32 + 0.5) / self.height as f32 * 2.0 - 1.0,
        )
    }

    /// World-space position of pixel (x, y) at the given NDC depth.
    pub fn unproject(&self, x: u32, y: u32, depth: f32) -> Vector3<f32> {
        let ndc = self.pixel_to_ndc(x, y);
        let p = self.inv_proj_view * Vector4::new(ndc.x, ndc.y, depth, 1.0);
        p.xyz() / p.w
    }

    /// Project a world point to (pixel x, pixel y, NDC depth).
    ///
    /// Returns None for points behind the camera.
    pub fn project(&self, point_world: &Vector3<f32>) -> Option<Vector3<f32>> {
        let clip = self.proj_view * point_world.push(1.0);
        if clip.w <= 0.0 {
            return None;
        }
        let ndc = clip.xyz() / clip.w;
        Some(Vector3::new(
            (ndc.x + 1.0) * 0.5 * self.width as f32,
            (ndc.y + 1.0) * 0.5 * self.height as f32,
            ndc.z,
        ))
    }
}

/// Right-handed perspective projection with depth mapped to [0, 1] and y pointing down.
#[rustfmt::skip]
pub fn perspective_zero_to_one(fov_y: f32, aspect: f32, z_near: f32, z_far: f32) -> Matrix4<f32> {
    let f = 1.0 / (0.5 * fov_y).tan();
    let range = z_near - z_far;

    // | f/a   0     0          0           |
    // |  0   -f     0          0           |
    // |  0    0   zf/(zn-zf)  zn*zf/(zn-zf) |
    // |  0    0    -1          0           |
    Matrix4::new(
        f / aspect, 0.0, 0.0, 0.0,
        0.0, -f, 0.0, 0.0,
        0.0, 0.0, z_far / range, z_near * z_far / range,
        0.0, 0.0, -1.0, 0.0,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn test_camera() -> FrameCamera {
        FrameCamera::look_at(
            Vector3::new(0.0, 0.0, -5.0),
            Vector3::zeros(),
            Vector3::y(),
            std::f32::consts::FRAC_PI_2,
            0.1,
            100.0,
            9,
            9,
        )
        .unwrap()
    }

    #[test]
    fn test_center_pixel_near_plane() {
        let cam = test_camera();
        let p = cam.unproject(4, 4, 0.0);
        assert_relative_eq!(p.x, 0.0, epsilon = 1e-4);
        assert_relative_eq!(p.y, 0.0, epsilon = 1e-4);
        assert_relative_eq!(p.z, -4.9, epsilon = 1e-3);
    }

    #[test]
    fn test_far_plane_depth_is_one() {
        let cam = test_camera();
        let p = cam.unproject(4, 4, 1.0);
        assert_relative_eq!(p.z, 95.0, max_relative = 1e-2);
    }

    #[test]
    fn test_project_unproject_roundtrip() {
        let cam = test_camera();
        let world = Vector3::new(0.0, 0.0, 1.0);
        let projected = cam.project(&world).unwrap();
        assert_relative_eq!(projected.x, 4.5, epsilon = 1e-3);
        assert_relative_eq!(projected.y, 4.5, epsilon = 1e-3);

        let back = cam.unproject(4, 4, projected.z);
        assert_relative_eq!(back, world, epsilon = 1e-3);
    }

    #[test]
    fn test_rows_grow_downwards() {
        let cam = test_camera();
        let top = cam.unproject(4, 0, 0.5);
        let bottom = cam.unproject(4, 8, 0.5);
        assert!(top.y > bottom.y);
    }

    #[test]
    fn test_point_behind_camera() {
        let cam = test_camera();
        assert!(cam.project(&Vector3::new(0.0, 0.0, -10.0)).is_none());
    }
}
