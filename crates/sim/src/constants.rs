//! Capacities and fixed physical constants for the 2D SPH kernel.
//!
//! Everything in here is compile-time fixed. Tunables that the UI can change at
//! runtime live in [`crate::config::SimConfig`] instead.
//!
//! Units are screen pixels and seconds, +Y pointing down.

// =============================================================================
// CAPACITIES - buffers are allocated once at these sizes and never grown
// =============================================================================

/// Hard cap on fluid particles. Shared worker buffers are sized to this.
pub const MAX_PARTICLES: usize = 20_000;

/// Hard cap on ephemeral foam particles (serial only).
pub const MAX_FOAM: usize = 4_000;

/// Hard cap on rigid bodies (boat not included).
pub const MAX_RIGID_BODIES: usize = 64;

pub const MAX_EMITTERS: usize = 32;
pub const MAX_DRAINS: usize = 32;
pub const MAX_WALLS: usize = 512;
pub const MAX_PORTAL_PAIRS: usize = 16;
pub const MAX_EXPLOSIONS: usize = 16;

/// Upper bound on spatial grid cells held in the shared worker region.
/// Domains larger than this get edge-clamped cells (slower, still correct).
pub const MAX_GRID_CELLS: usize = 1 << 16;

/// Sentinel for "no particle" in the intrusive cell lists.
pub const EMPTY: u32 = u32::MAX;

// =============================================================================
// SPH
// =============================================================================

/// Floor for particle density, keeps `1/density` finite downstream.
pub const MIN_DENSITY: f32 = 0.1;

/// Lower clamp on pressure as a fraction of the gas constant (mild tension).
pub const TENSILE_PRESSURE_FRACTION: f32 = 0.1;

/// Viscosity coefficient ceiling is `VISCOSITY_STABILITY / dt`.
pub const VISCOSITY_STABILITY: f32 = 0.5;

/// Squared separation below which a pair is considered coincident.
pub const COINCIDENT_EPSILON_SQ: f32 = 1e-6;

/// Magnitude of the pseudo-random offset used for coincident pairs.
pub const COINCIDENT_JITTER: f32 = 0.01;

/// Sub-samples per unit of r² in the square-root lookup table.
pub const SQRT_LUT_RESOLUTION: usize = 4;

// =============================================================================
// PARTICLE INTEGRATION
// =============================================================================

/// Vertical impact speed (px/s) that throws up foam at the domain boundary.
pub const SPLASH_SPEED: f32 = 450.0;

/// Seconds a particle is immune to portals after a teleport.
pub const PORTAL_COOLDOWN: f32 = 0.5;

/// Radius (px) around a point within which `erase_wall_near` removes segments.
pub const WALL_ERASE_RADIUS: f32 = 12.0;

/// Half-thickness (px) of wall segments as seen by particles.
pub const WALL_RADIUS: f32 = 4.0;

/// Spring stiffness pushing particles out of walls.
pub const WALL_STIFFNESS: f32 = 4000.0;

/// Damping on the approaching normal velocity at walls.
pub const WALL_DAMPING: f32 = 60.0;

// =============================================================================
// TOOLS AND EXPLOSIONS
// =============================================================================

/// Radius (px) of the pointer tool force field.
pub const TOOL_RADIUS: f32 = 90.0;

/// Base acceleration (px/s²) of the pointer tool at strength 1.0.
pub const TOOL_ACCEL: f32 = 6000.0;

pub const EXPLOSION_RADIUS: f32 = 140.0;

/// Instant radial velocity kick (px/s) at the explosion center.
pub const EXPLOSION_IMPULSE: f32 = 900.0;

/// Radial acceleration of the lingering explosion field at full strength.
pub const EXPLOSION_ACCEL: f32 = 8000.0;

/// Strength multiplier applied per second to a lingering explosion.
pub const EXPLOSION_DECAY: f32 = 0.02;

/// Explosions weaker than this are dropped.
pub const EXPLOSION_MIN_STRENGTH: f32 = 0.02;

// =============================================================================
// RIGID BODIES
// =============================================================================

/// Mass per px² of body area.
pub const RIGID_DENSITY: f32 = 0.03;

/// Mass and inertia floors, avoid singular integration for tiny shapes.
pub const MIN_BODY_MASS: f32 = 1.0;
pub const MIN_BODY_INERTIA: f32 = 10.0;

/// Penalty spring stiffness for particle / body overlap.
pub const CONTACT_STIFFNESS: f32 = 3000.0;

/// Damping on the approaching relative normal velocity.
pub const CONTACT_DAMPING: f32 = 40.0;

/// Per-substep velocity retention for bodies.
pub const BODY_LINEAR_DAMPING: f32 = 0.995;
pub const BODY_ANGULAR_DAMPING: f32 = 0.98;

pub const BODY_MAX_SPEED: f32 = 1500.0;
pub const BODY_MAX_ANGULAR_SPEED: f32 = 12.0;

/// Velocity retention when bouncing off the domain edge.
pub const BODY_WALL_RESTITUTION: f32 = 0.4;

/// Restitution coefficient for body / body impulses. Above 1 on purpose.
pub const BODY_BODY_RESTITUTION: f32 = 1.3;

/// Extra radius (px) beyond the bounding radius counted for buoyancy.
pub const BUOYANCY_MARGIN: f32 = 10.0;

/// Fraction of body weight lifted per submerged particle.
pub const BUOYANCY_PER_PARTICLE: f32 = 0.02;

/// Cap on the lifted fraction of body weight.
pub const MAX_BUOYANCY_FRACTION: f32 = 1.25;

// =============================================================================
// BOAT
// =============================================================================

pub const BOAT_HALF_LENGTH: f32 = 30.0;
pub const BOAT_HALF_WIDTH: f32 = 12.0;
pub const BOAT_MASS: f32 = 40.0;

/// Forward thrust (force units) at full throttle.
pub const BOAT_THRUST: f32 = 24_000.0;

/// Reverse thrust relative to forward.
pub const BOAT_REVERSE_FRACTION: f32 = 0.5;

/// Angular acceleration (rad/s²) at full rudder and reference speed.
pub const BOAT_TURN_ACCEL: f32 = 14.0;

/// Speed (px/s) at which steering reaches full authority.
pub const BOAT_STEER_REF_SPEED: f32 = 120.0;

/// Fraction of sideways velocity kept per substep.
pub const BOAT_LATERAL_KEEP: f32 = 0.9;

pub const BOAT_LINEAR_DAMPING: f32 = 0.997;
pub const BOAT_ANGULAR_DAMPING: f32 = 0.95;
pub const BOAT_MAX_SPEED: f32 = 600.0;
pub const BOAT_MAX_ANGULAR_SPEED: f32 = 4.0;

/// Cap on the per-substep hull reaction force.
pub const BOAT_MAX_HYDRO_FORCE: f32 = 30_000.0;

/// Wake cone length at rest and growth per px/s of speed.
pub const WAKE_BASE_LENGTH: f32 = 30.0;
pub const WAKE_LENGTH_PER_SPEED: f32 = 0.25;

/// Wake cone half-width at the stern and growth per px/s of speed.
pub const WAKE_BASE_HALF_WIDTH: f32 = 8.0;
pub const WAKE_WIDTH_PER_SPEED: f32 = 0.08;

/// Backward acceleration (px/s²) applied inside the wake at full throttle.
pub const WAKE_PUSH: f32 = 2500.0;

/// Chance per substep of a propeller foam puff at top speed.
pub const WAKE_FOAM_CHANCE: f32 = 0.6;

/// Sampling radius (px) for the ambient current under the hull.
pub const CURRENT_RADIUS: f32 = 60.0;

/// Contributing particles at which the current term reaches full weight.
pub const CURRENT_REF_COUNT: f32 = 40.0;

/// Drag rate (1/s) pulling the boat toward the ambient current.
pub const CURRENT_DRAG: f32 = 2.0;

/// Yaw torque per px/s of bow/stern lateral flow difference.
pub const CURRENT_YAW: f32 = 25.0;

// =============================================================================
// FOAM
// =============================================================================

pub const FOAM_LIFETIME: f32 = 1.2;
pub const FOAM_DRAG: f32 = 0.96;

/// Fraction of gravity felt by foam (it rides on top of the water).
pub const FOAM_GRAVITY_SCALE: f32 = 0.3;
