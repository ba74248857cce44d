//! Density kernels and the anisotropy estimate that drives the anisotropic one.
//!
//! All kernels are plain `Copy` values with no interior state; they are evaluated
//! concurrently from every worker without synchronization.

pub mod anisotropic;
pub mod cubic;
pub mod wpca;

pub use anisotropic::{AnisotropicKernel, Deformation};
pub use cubic::CubicKernel;
pub use wpca::{Anisotropy, AnisotropyError, WpcaEstimator};

/// Which density strategy a marching pass uses. Chosen once per batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KernelMode {
    Isotropic,
    Anisotropic,
}

impl KernelMode {
    pub fn from_flag(enable_anisotropy: bool) -> Self {
        if enable_anisotropy {
            Self::Anisotropic
        } else {
            Self::Isotropic
        }
    }
}
