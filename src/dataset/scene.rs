//! Deterministic particle layouts for demos and tests.

use nalgebra::Vector3;

/// Particles on a regular lattice filling the box `[min, max]`.
pub fn particle_block(min: Vector3<f32>, max: Vector3<f32>, spacing: f32) -> Vec<Vector3<f32>> {
    let counts = ((max - min) / spacing).map(|c| c.floor() as usize + 1);
    let mut out = Vec::with_capacity(counts.x * counts.y * counts.z);
    for k in 0..counts.z {
        for j in 0..counts.y {
            for i in 0..counts.x {
                out.push(min + Vector3::new(i as f32, j as f32, k as f32) * spacing);
            }
        }
    }
    out
}

/// Lattice particles inside a sphere.
pub fn particle_sphere(center: Vector3<f32>, radius: f32, spacing: f32) -> Vec<Vector3<f32>> {
    let r = Vector3::repeat(radius);
    particle_block(center - r, center + r, spacing)
        .into_iter()
        .filter(|p| (p - center).norm() <= radius)
        .collect()
}

/// A falling column of fluid: the block drops by `drop_per_frame` each frame
/// and flattens once it reaches the floor at y = 0.
pub fn collapsing_column(frames: usize, spacing: f32, drop_per_frame: f32) -> Vec<Vec<Vector3<f32>>> {
    let base = particle_block(Vector3::new(-0.3, 0.5, -0.3), Vector3::new(0.3, 1.1, 0.3), spacing);
    (0..frames)
        .map(|f| {
            let shift = drop_per_frame * f as f32;
            base.iter()
                .map(|p| {
                    let y = p.y - shift;
                    if y >= 0.0 {
                        Vector3::new(p.x, y, p.z)
                    } else {
                        // Spread particles that hit the floor outwards.
                        let spread = 1.0 - y;
                        Vector3::new(p.x * spread, -y * 0.1, p.z * spread)
                    }
                })
                .collect()
        })
        .collect()
}
