//! Anisotropy estimation on small synthetic neighborhoods.

use approx::assert_relative_eq;
use nalgebra::{Matrix3, Vector3};
use sph_surface_rs::core::AnisotropyParams;
use sph_surface_rs::dataset::scene::particle_block;
use sph_surface_rs::kernel::{AnisotropicKernel, Deformation, WpcaEstimator};

fn params() -> AnisotropyParams {
    AnisotropyParams {
        k_n: 0.5,
        k_r: 4.0,
        k_s: 10.0,
        n_eps: 25,
    }
}

/// A thin slab of lattice points in the xy plane.
fn slab() -> Vec<Vector3<f32>> {
    particle_block(Vector3::new(-0.5, -0.5, -0.05), Vector3::new(0.5, 0.5, 0.05), 0.05)
}

#[test]
fn test_below_threshold_uses_floor_for_any_shape() {
    let estimator = WpcaEstimator::new(0.2, 0.4, params());
    let cloud: Vec<_> = slab().into_iter().take(25).collect();

    let a = estimator.estimate(&Vector3::zeros(), &cloud).unwrap();
    assert_eq!(a.eigenvalues, Vector3::repeat(0.5));
    // G = I / (h k_n)
    assert_relative_eq!(a.deformation.matrix, Matrix3::identity() * 10.0, epsilon = 1e-5);
}

#[test]
fn test_slab_compresses_kernel_across_the_sheet() {
    let estimator = WpcaEstimator::new(0.2, 0.4, params());
    let cloud = slab();
    assert!(cloud.len() > 25);

    let a = estimator.estimate(&Vector3::zeros(), &cloud).unwrap();
    let g = a.deformation.matrix;

    // Small spread along z means a large G entry: the support is thin there.
    assert!(g[(2, 2)] > g[(0, 0)]);
    assert!(g[(2, 2)] > g[(1, 1)]);
    assert_relative_eq!(g[(0, 0)], g[(1, 1)], max_relative = 1e-2);
    assert_relative_eq!(g, g.transpose(), epsilon = 1e-4);

    // Ratio clamp: no axis is more than k_r times thinner than the widest.
    let max = a.eigenvalues.max();
    let min = a.eigenvalues.min();
    assert!(max / min <= 4.0 + 1e-3);
}

#[test]
fn test_estimated_kernel_stays_normalized() {
    let estimator = WpcaEstimator::new(0.2, 0.4, params());
    let a = estimator.estimate(&Vector3::zeros(), &slab()).unwrap();
    let g = a.deformation;
    assert_relative_eq!(g.determinant, g.matrix.determinant(), max_relative = 1e-3);

    // Along each principal axis the value at the origin is det(G) · P(0).
    let kernel = AnisotropicKernel::new();
    let w0 = kernel.w(&Vector3::zeros(), &g);
    assert_relative_eq!(w0, g.determinant * 8.0 / std::f32::consts::PI, max_relative = 1e-5);
}

#[test]
fn test_update_on_failure_keeps_state_across_samples() {
    let estimator = WpcaEstimator::new(0.2, 0.4, AnisotropyParams { n_eps: 0, ..params() });
    assert_eq!(estimator.params().n_eps, 0);
    assert_eq!(estimator.params().k_r, params().k_r);
    let mut g = Deformation::isotropic(0.2);

    estimator.update(&Vector3::zeros(), &slab(), &mut g);
    let estimated = g;
    assert_ne!(estimated, Deformation::isotropic(0.2));

    // All neighbors outside the weight support: the estimate fails, g is untouched.
    let far = vec![Vector3::new(3.0, 0.0, 0.0); 40];
    estimator.update(&Vector3::zeros(), &far, &mut g);
    assert_eq!(g, estimated);
}
