//! Weighted PCA anisotropy estimate for a single sample point.
//!
//! 1. Weighted mean μ of the extended neighborhood, weights from a cubic kernel
//!    with the extended support radius.
//! 2. Weighted covariance C = Σ wⱼ (xⱼ − μ)(xⱼ − μ)ᵀ / Σ wⱼ.
//! 3. C = R Σ Rᵀ (symmetric eigendecomposition).
//! 4. Regularize Σ: sparse neighborhoods get k_n on every axis; otherwise clamp
//!    to max(Σ)/k_r and scale by k_s.
//! 5. G = (1/h) R Σ⁻¹ Rᵀ.
//!
//! Eigen-pairs are not sorted; only the largest eigenvalue matters.

use log::warn;
use nalgebra::{Matrix3, SymmetricEigen, Vector3};
use thiserror::Error;

use super::anisotropic::Deformation;
use super::cubic::CubicKernel;
use crate::core::AnisotropyParams;

const EIGEN_EPSILON: f32 = 1.0e-7;
const EIGEN_MAX_ITERATIONS: usize = 64;

/// Spectra whose largest eigenvalue is below this are treated as a single point.
const MIN_SPREAD: f32 = 1.0e-12;

/// Numerical failures of the estimate. None of them are fatal.
#[derive(Debug, Error, PartialEq)]
pub enum AnisotropyError {
    #[error("eigendecomposition did not converge")]
    EigenNoConvergence,

    #[error("neighborhood has zero total weight")]
    ZeroWeight,
}

/// Output of one estimate.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Anisotropy {
    pub deformation: Deformation,

    /// Regularized spectrum (after the k_n / k_r / k_s policy)
    pub eigenvalues: Vector3<f32>,
}

/// WPCA estimator with fixed radii and regularization parameters.
#[derive(Clone, Copy, Debug)]
pub struct WpcaEstimator {
    weight_kernel: CubicKernel,
    inv_h: f32,
    params: AnisotropyParams,
}

impl WpcaEstimator {
    /// `radius` is the tight kernel support h, `radius_ext` the extended support.
    pub fn new(radius: f32, radius_ext: f32, params: AnisotropyParams) -> Self {
        Self {
            weight_kernel: CubicKernel::new(radius_ext),
            inv_h: 1.0 / radius,
            params,
        }
    }

    pub fn params(&self) -> &AnisotropyParams {
        &self.params
    }

    /// Estimate the deformation at `x` from the extended neighborhood positions.
    pub fn estimate(&self, x: &Vector3<f32>, neighbors: &[Vector3<f32>]) -> Result<Anisotropy, AnisotropyError> {
        if neighbors.len() <= self.params.n_eps {
            return Ok(self.isotropic_floor());
        }

        let mut weight_sum = 0.0f32;
        let mut mean = Vector3::zeros();
        for xj in neighbors {
            let w = self.weight_kernel.w(&(xj - x));
            weight_sum += w;
            mean += xj * w;
        }
        if weight_sum <= 0.0 {
            return Err(AnisotropyError::ZeroWeight);
        }
        let inv_weight = 1.0 / weight_sum;
        mean *= inv_weight;

        let mut covariance = Matrix3::zeros();
        for xj in neighbors {
            let w = self.weight_kernel.w(&(xj - x));
            if w > 0.0 {
                let d = xj - mean;
                covariance += (d * d.transpose()) * w;
            }
        }
        covariance *= inv_weight;

        let eigen = SymmetricEigen::try_new(covariance, EIGEN_EPSILON, EIGEN_MAX_ITERATIONS)
            .ok_or(AnisotropyError::EigenNoConvergence)?;

        match self.regularize(&eigen.eigenvalues, neighbors.len()) {
            Some(sigma) => Ok(self.compose(&eigen.eigenvectors, sigma)),
            // Flat spectrum (all points coincide): nothing to stretch along.
            None => Ok(self.isotropic_floor()),
        }
    }

    /// Like `estimate`, but degrades gracefully: on failure the warning is logged
    /// and `g` keeps whatever it held before.
    pub fn update(&self, x: &Vector3<f32>, neighbors: &[Vector3<f32>], g: &mut Deformation) {
        match self.estimate(x, neighbors) {
            Ok(a) => *g = a.deformation,
            Err(e) => warn!(
                "anisotropy estimate at ({:.4}, {:.4}, {:.4}) with {} neighbors failed: {}",
                x.x,
                x.y,
                x.z,
                neighbors.len(),
                e
            ),
        }
    }

    /// Apply the sparse-neighborhood floor or the ratio clamp and global scale.
    ///
    /// Returns None when the spectrum has no positive eigenvalue to clamp against.
    pub fn regularize(&self, eigenvalues: &Vector3<f32>, neighbor_count: usize) -> Option<Vector3<f32>> {
        let p = &self.params;
        if neighbor_count <= p.n_eps {
            return Some(Vector3::repeat(p.k_n));
        }

        let max = eigenvalues.max();
        if !(max > MIN_SPREAD) {
            return None;
        }
        let floor = max / p.k_r;
        Some(eigenvalues.map(|v| v.max(floor) * p.k_s))
    }

    fn isotropic_floor(&self) -> Anisotropy {
        let k_n = self.params.k_n;
        let s = self.inv_h / k_n;
        Anisotropy {
            deformation: Deformation {
                matrix: Matrix3::from_diagonal_element(s),
                determinant: s * s * s,
            },
            eigenvalues: Vector3::repeat(k_n),
        }
    }

    fn compose(&self, rotation: &Matrix3<f32>, sigma: Vector3<f32>) -> Anisotropy {
        let inv_sigma = Matrix3::from_diagonal(&sigma.map(|v| 1.0 / v));
        let matrix = rotation * inv_sigma * rotation.transpose() * self.inv_h;
        let determinant = self.inv_h.powi(3) / (sigma.x * sigma.y * sigma.z);
        Anisotropy {
            deformation: Deformation { matrix, determinant },
            eigenvalues: sigma,
        }
    }
}
