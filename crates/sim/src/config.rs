//! Runtime tunables for the simulation.
//!
//! `SimConfig` is what the parameter UI edits and what gets saved to disk.
//! `KernelParams` is the compact per-step snapshot the SPH passes read.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Errors from loading or saving a [`SimConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("config is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// How density/force passes are executed for the session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ExecutionMode {
    /// Worker pool sized from available cores, serial if that fails.
    #[default]
    Auto,
    /// Single-threaded with the cached neighbor pair list.
    Serial,
    /// Worker pool with an explicit worker count (still clamped to 2..=10).
    Parallel { workers: usize },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Domain size in px
    pub width: f32,
    pub height: f32,

    /// SPH interaction cutoff H (also the grid cell size)
    pub kernel_radius: f32,
    /// Collision radius of a fluid particle against the domain edge
    pub particle_radius: f32,

    /// Substeps per rendered frame
    pub substeps: usize,
    /// Largest frame dt accepted before clamping (avoids spiral of death)
    pub max_frame_dt: f32,

    pub gravity: [f32; 2],
    pub rest_density: f32,
    pub gas_const: f32,
    pub near_gas_const: f32,
    pub viscosity: f32,
    pub surface_tension: f32,

    /// Per-substep velocity retention for fluid particles
    pub velocity_damping: f32,
    /// Hard cap on particle speed (px/s)
    pub max_speed: f32,
    /// Fraction of normal velocity kept when bouncing off the domain edge
    pub boundary_restitution: f32,

    pub execution: ExecutionMode,
    /// Milliseconds to wait for all workers to report ready
    pub startup_timeout_ms: u64,

    pub seed: u64,
    /// Particles spawned by `init`
    pub initial_particles: usize,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            width: 1280.0,
            height: 720.0,
            kernel_radius: 16.0,
            particle_radius: 3.0,
            substeps: 4,
            max_frame_dt: 1.0 / 30.0,
            gravity: [0.0, 1200.0],
            rest_density: 4.0,
            gas_const: 8000.0,
            near_gas_const: 6000.0,
            viscosity: 8.0,
            surface_tension: 200.0,
            velocity_damping: 0.999,
            max_speed: 1500.0,
            boundary_restitution: 0.4,
            execution: ExecutionMode::Auto,
            startup_timeout_ms: 2_000,
            seed: 0x5EED,
            initial_particles: 3_000,
        }
    }
}

impl SimConfig {
    /// Load configuration from JSON file
    pub fn load_json(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&json)?;
        Ok(config)
    }

    /// Save configuration to JSON file
    pub fn save_json(&self, path: &Path) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Snapshot of the SPH constants for one substep.
    pub fn kernel_params(&self, dt: f32) -> KernelParams {
        KernelParams {
            h: self.kernel_radius,
            rest_density: self.rest_density,
            gas_const: self.gas_const,
            near_gas_const: self.near_gas_const,
            viscosity: self.viscosity,
            surface_tension: self.surface_tension,
            dt,
        }
    }
}

/// SPH constants read by both execution paths. Copied into the shared
/// region once per substep so workers never see a half-updated set.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct KernelParams {
    pub h: f32,
    pub rest_density: f32,
    pub gas_const: f32,
    pub near_gas_const: f32,
    pub viscosity: f32,
    pub surface_tension: f32,
    /// Substep dt, needed for the viscosity stability ceiling
    pub dt: f32,
}

impl Default for KernelParams {
    fn default() -> Self {
        SimConfig::default().kernel_params(1.0 / 240.0)
    }
}
