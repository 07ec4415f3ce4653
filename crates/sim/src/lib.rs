//! SPH2D - Interactive 2D Fluid Simulation Library
//!
//! Weakly-compressible double-density SPH with:
//! - Spatial hash grid rebuilt every substep
//! - Worker pool with barrier-synchronized density and force phases,
//!   falling back to a serial solver for the rest of the session
//! - Two-way coupled rigid bodies (box, circle, triangle)
//! - A player boat with wake, current drag and yaw
//! - Walls, emitters, drains, portals, explosions and pointer tools
//!
//! This crate is framework-agnostic - it handles simulation only. A renderer
//! reads [`FrameData`] and feeds [`Command`]s back in.

pub mod boat;
pub mod config;
pub mod constants;
pub mod dispatch;
pub mod foam;
pub mod frame;
pub mod lifecycle;
pub mod particle;
pub mod pool;
pub mod rigid;
pub mod rng;
pub mod spatial;
pub mod sph;
pub mod tools;
pub mod world;

pub use boat::{Boat, BoatControls};
pub use config::{ConfigError, ExecutionMode, KernelParams, SimConfig};
pub use dispatch::{Dispatcher, ExecutionModel};
pub use frame::{BoatPose, FrameData, RigidBodyInstance};
pub use particle::Particles;
pub use pool::{PoolError, WorkerPool};
pub use rigid::{RigidBodies, RigidBody, Shape};
pub use spatial::{GridDims, SpatialGrid};
pub use tools::{Tool, ToolKind};
pub use world::{Command, FluidParams, SimulationWorld};
