//! Cubic spline smoothing kernel (3D), normalized so that ∫W = 1.
//!
//! With q = |r| / h and k = 8 / (π h³):
//! W(q) = k · (6q³ − 6q² + 1)   for 0 ≤ q ≤ 0.5
//!        k · 2(1 − q)³          for 0.5 < q ≤ 1
//!        0                      otherwise
//!
//! The support radius is `h` itself (not 2h as in some SPH texts).

use nalgebra::Vector3;
use std::f32::consts::PI;

/// Isotropic cubic spline kernel with support radius `h`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CubicKernel {
    radius: f32,
    inv_radius: f32,
    /// 8 / (π h³)
    k: f32,
    /// 48 / (π h³)
    l: f32,
    /// W(0)
    w_zero: f32,
}

impl CubicKernel {
    pub fn new(radius: f32) -> Self {
        let h3 = radius * radius * radius;
        let k = 8.0 / (PI * h3);
        Self {
            radius,
            inv_radius: 1.0 / radius,
            k,
            l: 48.0 / (PI * h3),
            w_zero: k,
        }
    }

    /// Unit support radius (used by the anisotropic kernel after deformation).
    pub fn unit() -> Self {
        Self::new(1.0)
    }

    pub fn radius(&self) -> f32 {
        self.radius
    }

    pub fn w_zero(&self) -> f32 {
        self.w_zero
    }

    /// Kernel value at distance `r`.
    #[inline]
    pub fn w_scalar(&self, r: f32) -> f32 {
        let q = r * self.inv_radius;
        if q <= 0.5 {
            let q2 = q * q;
            let q3 = q2 * q;
            self.k * (6.0 * q3 - 6.0 * q2 + 1.0)
        } else if q < 1.0 {
            let f = 1.0 - q;
            self.k * 2.0 * f * f * f
        } else {
            0.0
        }
    }

    #[inline]
    pub fn w(&self, r: &Vector3<f32>) -> f32 {
        self.w_scalar(r.norm())
    }

    /// Derivative dW/d|r| at distance `r`.
    #[inline]
    pub fn dw_scalar(&self, r: f32) -> f32 {
        let q = r * self.inv_radius;
        if q <= 0.5 {
            self.l * q * (3.0 * q - 2.0) * self.inv_radius
        } else if q < 1.0 {
            let f = 1.0 - q;
            -self.l * f * f * self.inv_radius
        } else {
            0.0
        }
    }

    /// Gradient ∇W with respect to `r`. Zero at `r = 0` and outside the support.
    #[inline]
    pub fn grad_w(&self, r: &Vector3<f32>) -> Vector3<f32> {
        let rl = r.norm();
        if rl <= 1.0e-9 || rl >= self.radius {
            return Vector3::zeros();
        }
        r * (self.dw_scalar(rl) / rl)
    }
}
