//! Surface reconstruction passes (CPU).
//!
//! `raymarch` turns a depth buffer plus a particle frame into per-pixel
//! surface positions and normals. `depth` builds start-depth buffers for
//! particle sets, and `preview` writes the output buffers out as images.

pub mod depth;
pub mod preview;
pub mod raymarch;

pub use depth::rasterize_particle_depth;
pub use preview::{distance_to_image, normals_to_image};
pub use raymarch::{MarchError, MarcherConfig, RayMarcher};
