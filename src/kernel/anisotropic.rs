//! Anisotropic kernel driven by a per-sample deformation matrix.
//!
//! W(r, G) = det(G) · P(|G r|), where P is the unit-support cubic spline.
//! With G = I / h this is exactly the isotropic cubic kernel of radius h.

use nalgebra::{Matrix3, Vector3};

use super::cubic::CubicKernel;

/// Symmetric deformation G together with its cached determinant.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Deformation {
    pub matrix: Matrix3<f32>,
    pub determinant: f32,
}

impl Deformation {
    pub fn new(matrix: Matrix3<f32>) -> Self {
        Self {
            matrix,
            determinant: matrix.determinant(),
        }
    }

    /// Isotropic deformation for support radius `h` (G = I / h).
    pub fn isotropic(h: f32) -> Self {
        let inv_h = 1.0 / h;
        Self {
            matrix: Matrix3::from_diagonal_element(inv_h),
            determinant: inv_h * inv_h * inv_h,
        }
    }
}

/// Anisotropic kernel. Holds only the unit-support base spline.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AnisotropicKernel {
    base: CubicKernel,
}

impl AnisotropicKernel {
    pub fn new() -> Self {
        Self {
            base: CubicKernel::unit(),
        }
    }

    #[inline]
    pub fn w(&self, r: &Vector3<f32>, g: &Deformation) -> f32 {
        let gr = g.matrix * r;
        g.determinant * self.base.w_scalar(gr.norm())
    }

    /// ∇W = det(G) · P'(|Gr|) · Gᵀ (Gr) / |Gr|
    #[inline]
    pub fn grad_w(&self, r: &Vector3<f32>, g: &Deformation) -> Vector3<f32> {
        let gr = g.matrix * r;
        let len = gr.norm();
        if len <= 1.0e-9 || len >= 1.0 {
            return Vector3::zeros();
        }
        let scale = g.determinant * self.base.dw_scalar(len) / len;
        g.matrix.transpose() * gr * scale
    }
}

impl Default for AnisotropicKernel {
    fn default() -> Self {
        Self::new()
    }
}
