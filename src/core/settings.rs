//! Per-pass visualization settings.
//!
//! Settings are passed by value into every marching pass. Nothing here is global:
//! two marchers can run with different settings side by side.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Errors produced while loading or validating settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid settings JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid setting `{name}`: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Regularization parameters for the WPCA anisotropy estimate.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnisotropyParams {
    /// Eigenvalue used for every axis when the neighborhood is too sparse.
    pub k_n: f32,

    /// Maximum ratio between the largest and any other eigenvalue.
    pub k_r: f32,

    /// Global scale applied to the clamped spectrum.
    pub k_s: f32,

    /// Neighbor count at or below which a sample is treated as isotropic.
    pub n_eps: usize,
}

impl Default for AnisotropyParams {
    fn default() -> Self {
        Self {
            k_n: 0.5,
            k_r: 4.0,
            k_s: 1400.0,
            n_eps: 25,
        }
    }
}

/// Tunables for one marching pass.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisualizationSettings {
    /// Snapshot (simulation frame) to reconstruct.
    pub snapshot: usize,

    /// Maximum number of uniform steps per ray.
    pub max_steps: u32,

    /// Distance between two samples along a ray (world units).
    pub step_length: f32,

    /// Density threshold defining the surface.
    pub iso_density: f32,

    /// Use the WPCA anisotropic kernel instead of the isotropic one.
    pub enable_anisotropy: bool,

    pub anisotropy: AnisotropyParams,
}

impl Default for VisualizationSettings {
    fn default() -> Self {
        Self {
            snapshot: 0,
            max_steps: 512,
            step_length: 0.01,
            iso_density: 0.5,
            enable_anisotropy: false,
            anisotropy: AnisotropyParams::default(),
        }
    }
}

impl VisualizationSettings {
    pub fn from_json_str(json: &str) -> Result<Self, SettingsError> {
        let settings: Self = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from a JSON file. Missing fields fall back to defaults.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn with_snapshot(mut self, snapshot: usize) -> Self {
        self.snapshot = snapshot;
        self
    }

    pub fn with_max_steps(mut self, max_steps: u32) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn with_step_length(mut self, step_length: f32) -> Self {
        self.step_length = step_length;
        self
    }

    pub fn with_iso_density(mut self, iso_density: f32) -> Self {
        self.iso_density = iso_density;
        self
    }

    pub fn with_anisotropy(mut self, enabled: bool) -> Self {
        self.enable_anisotropy = enabled;
        self
    }

    pub fn with_anisotropy_params(mut self, params: AnisotropyParams) -> Self {
        self.anisotropy = params;
        self
    }

    /// Reject values that would make a pass meaningless or divide by zero.
    pub fn validate(&self) -> Result<(), SettingsError> {
        fn invalid(name: &'static str, reason: impl Into<String>) -> SettingsError {
            SettingsError::Invalid {
                name,
                reason: reason.into(),
            }
        }

        if !(self.step_length.is_finite() && self.step_length > 0.0) {
            return Err(invalid("step_length", format!("must be > 0, got {}", self.step_length)));
        }
        if self.max_steps == 0 {
            return Err(invalid("max_steps", "must be at least 1"));
        }
        if !self.iso_density.is_finite() {
            return Err(invalid("iso_density", "must be finite"));
        }

        let a = &self.anisotropy;
        if !(a.k_n.is_finite() && a.k_n > 0.0) {
            return Err(invalid("k_n", format!("must be > 0, got {}", a.k_n)));
        }
        if !(a.k_r.is_finite() && a.k_r >= 1.0) {
            return Err(invalid("k_r", format!("must be >= 1, got {}", a.k_r)));
        }
        if !(a.k_s.is_finite() && a.k_s > 0.0) {
            return Err(invalid("k_s", format!("must be > 0, got {}", a.k_s)));
        }

        Ok(())
    }
}
