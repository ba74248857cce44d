//! Core data types shared by every stage of the surface reconstruction:
//! - `VisualizationSettings`: per-pass tunables
//! - `FrameCamera`: clip-space to world-space mapping
//! - `SurfaceBuffers`: per-pixel hit outputs
//! - `ThreadLocals`: bounded per-worker scratch
//!
//! No threading or kernel logic lives here.

mod buffers;
mod camera;
pub mod math;
mod scratch;
mod settings;

pub use buffers::{background_depth, constant_depth, SurfaceBuffers};
pub use camera::{perspective_zero_to_one, FrameCamera, BACKGROUND_DEPTH};
pub use math::Aabb;
pub use scratch::{BoundedBuffer, ThreadLocals, DEFAULT_NEIGHBOR_CAPACITY};
pub use settings::{AnisotropyParams, SettingsError, VisualizationSettings};
