//! SimulationWorld - owns every piece of simulation state and runs the
//! substep loop.
//!
//! Commands from the host are queued and applied strictly between steps, so
//! nothing changes under the SPH passes or the worker pool.

use crate::boat::{Boat, BoatControls};
use crate::config::SimConfig;
use crate::constants::{
    FOAM_LIFETIME, MAX_DRAINS, MAX_EMITTERS, MAX_EXPLOSIONS, MAX_GRID_CELLS, MAX_PARTICLES,
    MAX_PORTAL_PAIRS, MAX_WALLS, SPLASH_SPEED,
};
use crate::dispatch::{Dispatcher, ExecutionModel};
use crate::foam::Foam;
use crate::frame::{BoatPose, FrameData, RigidBodyInstance, Throughput};
use crate::lifecycle::{
    apply_drains, apply_portals, apply_walls, decay_explosions, erase_walls_near, Drain, Emitter,
    Explosion, PortalPair, Wall,
};
use crate::particle::Particles;
use crate::rigid::{RigidBodies, Shape};
use crate::spatial::{GridDims, SpatialGrid};
use crate::tools::{Pointer, Tool, ToolKind};
use glam::Vec2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;
use std::time::Duration;

/// Runtime-editable fluid parameters (`setParams`).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FluidParams {
    pub gravity: Vec2,
    pub gas_const: f32,
    pub near_gas_const: f32,
    pub viscosity: f32,
    pub surface_tension: f32,
}

/// Everything the host can ask for. Queued with [`SimulationWorld::queue`].
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    Init { width: f32, height: f32 },
    Resize { width: f32, height: f32 },
    SetTool { tool: ToolKind, strength: Option<f32> },
    Pointer { position: Vec2, active: bool },
    AddParticles { count: usize, position: Vec2 },
    Reset,
    AddEmitter { position: Vec2, angle: f32, speed: f32, rate: f32 },
    RemoveEmitter { id: u32 },
    AddDrain { position: Vec2, radius: f32 },
    RemoveDrain { id: u32 },
    AddWall { a: Vec2, b: Vec2 },
    ClearWalls,
    EraseWallNear { position: Vec2 },
    SetParams(FluidParams),
    ExplosionAt { position: Vec2 },
    FreezeAt { position: Vec2, radius: f32 },
    ThawAt { position: Vec2, radius: f32 },
    AddPortalPair { a: Vec2, b: Vec2, radius: f32 },
    ClearPortals,
    AddRigidBody { shape: Shape, position: Vec2, angle: f32, color: Option<[f32; 4]> },
    RemoveRigidBody { id: u32 },
    ClearRigidBodies,
    PlaceBoat { position: Vec2 },
    RemoveBoat,
    SetBoatControls(BoatControls),
}

pub struct SimulationWorld {
    config: SimConfig,
    particles: Particles,
    grid: SpatialGrid,
    dispatcher: Dispatcher,

    bodies: RigidBodies,
    boat: Option<Boat>,
    foam: Foam,

    emitters: Vec<Emitter>,
    drains: Vec<Drain>,
    walls: Vec<Wall>,
    portals: Vec<PortalPair>,
    explosions: Vec<Explosion>,

    tool: Tool,
    pointer: Pointer,

    rng: StdRng,
    commands: VecDeque<Command>,
    next_id: u32,
    throughput: Throughput,

    /// Simulated seconds since init
    pub time: f32,
    pub frame: u64,
}

impl SimulationWorld {
    /// Build an empty world. The worker pool (if any) starts here; call
    /// [`init`](Self::init) to fill the domain.
    pub fn new(config: SimConfig) -> Self {
        let dims = grid_dims(&config);
        let dispatcher = Dispatcher::new(
            config.execution,
            config.kernel_radius,
            Duration::from_millis(config.startup_timeout_ms),
        );
        log::info!(
            "simulation world {}x{}, grid {}x{}, {:?}",
            config.width,
            config.height,
            dims.cols,
            dims.rows,
            dispatcher.execution_model()
        );

        Self {
            rng: StdRng::seed_from_u64(config.seed),
            particles: Particles::new(),
            grid: SpatialGrid::new(dims, MAX_PARTICLES),
            dispatcher,
            bodies: RigidBodies::new(),
            boat: None,
            foam: Foam::new(),
            emitters: Vec::new(),
            drains: Vec::new(),
            walls: Vec::new(),
            portals: Vec::new(),
            explosions: Vec::new(),
            tool: Tool::default(),
            pointer: Pointer::default(),
            commands: VecDeque::new(),
            next_id: 1,
            throughput: Throughput::new(),
            time: 0.0,
            frame: 0,
            config,
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn particles(&self) -> &Particles {
        &self.particles
    }

    pub fn particles_mut(&mut self) -> &mut Particles {
        &mut self.particles
    }

    pub fn grid(&self) -> &SpatialGrid {
        &self.grid
    }

    pub fn bodies(&self) -> &RigidBodies {
        &self.bodies
    }

    pub fn bodies_mut(&mut self) -> &mut RigidBodies {
        &mut self.bodies
    }

    pub fn boat(&self) -> Option<&Boat> {
        self.boat.as_ref()
    }

    pub fn foam(&self) -> &Foam {
        &self.foam
    }

    pub fn emitters(&self) -> &[Emitter] {
        &self.emitters
    }

    pub fn drains(&self) -> &[Drain] {
        &self.drains
    }

    pub fn walls(&self) -> &[Wall] {
        &self.walls
    }

    pub fn portals(&self) -> &[PortalPair] {
        &self.portals
    }

    pub fn explosions(&self) -> &[Explosion] {
        &self.explosions
    }

    pub fn tool(&self) -> &Tool {
        &self.tool
    }

    pub fn execution_model(&self) -> ExecutionModel {
        self.dispatcher.execution_model()
    }

    #[doc(hidden)]
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn throughput(&self) -> f32 {
        self.throughput.rate()
    }

    /// Gravity actually applied this step: none while the boat is out.
    pub fn effective_gravity(&self) -> Vec2 {
        if self.boat.is_some() {
            Vec2::ZERO
        } else {
            Vec2::from(self.config.gravity)
        }
    }

    // ========================================================================
    // Commands
    // ========================================================================

    /// Buffer a command for the start of the next step.
    pub fn queue(&mut self, command: Command) {
        self.commands.push_back(command);
    }

    /// Apply everything queued so far, in order.
    pub fn apply_commands(&mut self) {
        while let Some(command) = self.commands.pop_front() {
            self.apply(command);
        }
    }

    pub fn apply(&mut self, command: Command) {
        match command {
            Command::Init { width, height } => self.init(width, height),
            Command::Resize { width, height } => self.resize(width, height),
            Command::SetTool { tool, strength } => self.set_tool(tool, strength),
            Command::Pointer { position, active } => self.set_pointer(position, active),
            Command::AddParticles { count, position } => {
                self.add_particles(count, position);
            }
            Command::Reset => self.reset(),
            Command::AddEmitter {
                position,
                angle,
                speed,
                rate,
            } => {
                self.add_emitter(position, angle, speed, rate);
            }
            Command::RemoveEmitter { id } => {
                self.remove_emitter(id);
            }
            Command::AddDrain { position, radius } => {
                self.add_drain(position, radius);
            }
            Command::RemoveDrain { id } => {
                self.remove_drain(id);
            }
            Command::AddWall { a, b } => {
                self.add_wall(a, b);
            }
            Command::ClearWalls => self.clear_walls(),
            Command::EraseWallNear { position } => {
                self.erase_wall_near(position);
            }
            Command::SetParams(params) => self.set_params(params),
            Command::ExplosionAt { position } => self.explosion_at(position),
            Command::FreezeAt { position, radius } => {
                self.freeze_at(position, radius);
            }
            Command::ThawAt { position, radius } => {
                self.thaw_at(position, radius);
            }
            Command::AddPortalPair { a, b, radius } => {
                self.add_portal_pair(a, b, radius);
            }
            Command::ClearPortals => self.clear_portals(),
            Command::AddRigidBody {
                shape,
                position,
                angle,
                color,
            } => {
                self.add_rigid_body(shape, position, angle, color);
            }
            Command::RemoveRigidBody { id } => {
                self.remove_rigid_body(id);
            }
            Command::ClearRigidBodies => self.clear_rigid_bodies(),
            Command::PlaceBoat { position } => self.place_boat(position),
            Command::RemoveBoat => self.remove_boat(),
            Command::SetBoatControls(controls) => self.set_boat_controls(controls),
        }
    }

    /// Start over in a `width × height` domain with the initial fluid block.
    /// Drops all placed geometry too.
    pub fn init(&mut self, width: f32, height: f32) {
        self.particles.clear();
        self.foam.clear();
        self.explosions.clear();
        self.emitters.clear();
        self.drains.clear();
        self.walls.clear();
        self.portals.clear();
        self.bodies.clear();
        self.boat = None;
        self.throughput.reset();
        self.time = 0.0;
        self.frame = 0;

        self.resize(width, height);
        self.spawn_initial_block();
    }

    /// Jittered lattice filling the lower-left of the domain.
    fn spawn_initial_block(&mut self) {
        let count = self.config.initial_particles.min(MAX_PARTICLES);
        if count == 0 {
            return;
        }
        let spacing = self.config.particle_radius * 2.0;
        let margin = spacing;
        let cols = ((self.config.width * 0.5 - margin) / spacing).floor().max(1.0) as usize;
        let bottom = self.config.height - margin;

        for k in 0..count {
            let (col, row) = (k % cols, k / cols);
            let jitter = Vec2::new(self.rng.gen_range(-0.5..0.5), self.rng.gen_range(-0.5..0.5));
            let p = Vec2::new(
                margin + col as f32 * spacing,
                bottom - row as f32 * spacing,
            ) + jitter;
            if p.y < margin {
                break;
            }
            let p = self.clamp_to_domain(p);
            if !self.particles.spawn(p, Vec2::ZERO) {
                break;
            }
        }
        log::debug!("initial block: {} particles", self.particles.len());
    }

    /// Change the domain. Grid dimensions are recomputed (clamped to the
    /// shared grid capacity) and everything is pulled inside.
    pub fn resize(&mut self, width: f32, height: f32) {
        let min_size = self.config.kernel_radius;
        self.config.width = if width.is_finite() { width.max(min_size) } else { self.config.width };
        self.config.height = if height.is_finite() { height.max(min_size) } else { self.config.height };
        self.grid.set_dims(grid_dims(&self.config));

        for i in 0..self.particles.len() {
            let p = self.clamp_to_domain(self.particles.position[i]);
            self.particles.position[i] = p;
        }
        let (w, h) = (self.config.width, self.config.height);
        for body in self.bodies.iter_mut() {
            body.contain(w, h);
        }
        if let Some(boat) = self.boat.as_mut() {
            boat.contain(w, h);
        }
    }

    pub fn set_tool(&mut self, kind: ToolKind, strength: Option<f32>) {
        self.tool = Tool::new(kind, strength);
    }

    pub fn set_pointer(&mut self, position: Vec2, active: bool) {
        self.pointer.move_to(position, active);
    }

    /// Spawn up to `count` particles in a small jittered square at
    /// `position`. Returns how many fit.
    pub fn add_particles(&mut self, count: usize, position: Vec2) -> usize {
        let spacing = self.config.particle_radius * 2.0;
        let side = (count as f32).sqrt().ceil().max(1.0) as usize;
        let origin = position - Vec2::splat((side - 1) as f32 * spacing * 0.5);

        let mut spawned = 0;
        for k in 0..count {
            let jitter = Vec2::new(self.rng.gen_range(-0.5..0.5), self.rng.gen_range(-0.5..0.5));
            let p = origin + Vec2::new((k % side) as f32, (k / side) as f32) * spacing + jitter;
            let p = self.clamp_to_domain(p);
            if !self.particles.spawn(p, Vec2::ZERO) {
                log::debug!("particle capacity reached, dropped {}", count - spawned);
                break;
            }
            spawned += 1;
        }
        spawned
    }

    /// Clear fluid, foam and explosions. Placed geometry stays.
    pub fn reset(&mut self) {
        self.particles.clear();
        self.foam.clear();
        self.explosions.clear();
        self.throughput.reset();
    }

    fn take_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1).max(1);
        id
    }

    pub fn add_emitter(&mut self, position: Vec2, angle: f32, speed: f32, rate: f32) -> Option<u32> {
        if self.emitters.len() >= MAX_EMITTERS {
            log::debug!("emitter dropped, {} already placed", MAX_EMITTERS);
            return None;
        }
        let id = self.take_id();
        self.emitters.push(Emitter::new(id, position, angle, speed, rate));
        Some(id)
    }

    pub fn remove_emitter(&mut self, id: u32) -> bool {
        let before = self.emitters.len();
        self.emitters.retain(|e| e.id != id);
        self.emitters.len() != before
    }

    pub fn add_drain(&mut self, position: Vec2, radius: f32) -> Option<u32> {
        if self.drains.len() >= MAX_DRAINS {
            log::debug!("drain dropped, {} already placed", MAX_DRAINS);
            return None;
        }
        let id = self.take_id();
        self.drains.push(Drain {
            id,
            position,
            radius: radius.abs(),
        });
        Some(id)
    }

    pub fn remove_drain(&mut self, id: u32) -> bool {
        let before = self.drains.len();
        self.drains.retain(|d| d.id != id);
        self.drains.len() != before
    }

    pub fn add_wall(&mut self, a: Vec2, b: Vec2) -> bool {
        if self.walls.len() >= MAX_WALLS {
            log::debug!("wall dropped, {} already placed", MAX_WALLS);
            return false;
        }
        self.walls.push(Wall { a, b });
        true
    }

    pub fn clear_walls(&mut self) {
        self.walls.clear();
    }

    pub fn erase_wall_near(&mut self, position: Vec2) -> usize {
        erase_walls_near(&mut self.walls, position)
    }

    pub fn set_params(&mut self, params: FluidParams) {
        self.config.gravity = params.gravity.to_array();
        self.config.gas_const = params.gas_const;
        self.config.near_gas_const = params.near_gas_const;
        self.config.viscosity = params.viscosity.max(0.0);
        self.config.surface_tension = params.surface_tension;
    }

    /// Immediate radial kick plus a force field that fades over the next
    /// fraction of a second.
    pub fn explosion_at(&mut self, position: Vec2) {
        if self.explosions.len() >= MAX_EXPLOSIONS {
            log::debug!("explosion dropped, {} still active", MAX_EXPLOSIONS);
            return;
        }
        let explosion = Explosion::new(position);
        explosion.detonate(&mut self.particles, &mut self.bodies);
        self.explosions.push(explosion);
        self.foam
            .splash(&mut self.rng, position, Vec2::new(0.0, -SPLASH_SPEED), 24);
    }

    pub fn freeze_at(&mut self, position: Vec2, radius: f32) -> usize {
        self.particles.set_frozen_within(position, radius, true)
    }

    pub fn thaw_at(&mut self, position: Vec2, radius: f32) -> usize {
        self.particles.set_frozen_within(position, radius, false)
    }

    pub fn add_portal_pair(&mut self, a: Vec2, b: Vec2, radius: f32) -> bool {
        if self.portals.len() >= MAX_PORTAL_PAIRS {
            log::debug!("portal pair dropped, {} already placed", MAX_PORTAL_PAIRS);
            return false;
        }
        self.portals.push(PortalPair {
            a,
            b,
            radius: radius.abs(),
        });
        true
    }

    pub fn clear_portals(&mut self) {
        self.portals.clear();
    }

    pub fn add_rigid_body(
        &mut self,
        shape: Shape,
        position: Vec2,
        angle: f32,
        color: Option<[f32; 4]>,
    ) -> Option<u32> {
        self.bodies.add(shape, position, angle, color)
    }

    pub fn remove_rigid_body(&mut self, id: u32) -> bool {
        self.bodies.remove(id)
    }

    pub fn clear_rigid_bodies(&mut self) {
        self.bodies.clear();
    }

    /// Put the boat at `position`, replacing any existing one.
    pub fn place_boat(&mut self, position: Vec2) {
        let mut boat = Boat::new(self.clamp_to_domain(position));
        boat.contain(self.config.width, self.config.height);
        self.boat = Some(boat);
    }

    pub fn remove_boat(&mut self) {
        self.boat = None;
    }

    pub fn set_boat_controls(&mut self, controls: BoatControls) {
        if let Some(boat) = self.boat.as_mut() {
            boat.controls = controls;
        }
    }

    // ========================================================================
    // Stepping
    // ========================================================================

    /// Apply queued commands, then advance by `frame_dt` seconds split into
    /// the configured number of substeps.
    pub fn step(&mut self, frame_dt: f32) {
        self.apply_commands();

        if !frame_dt.is_finite() || frame_dt <= 0.0 {
            return;
        }
        let dt = frame_dt.min(self.config.max_frame_dt);
        let substeps = self.config.substeps.max(1);
        let sub_dt = dt / substeps as f32;

        let mut work = 0;
        for _ in 0..substeps {
            work += self.particles.len();
            self.substep(sub_dt);
        }

        let gravity = self.effective_gravity();
        self.foam
            .update(dt, gravity, self.config.width, self.config.height);

        self.time += dt;
        self.frame += 1;
        self.throughput.record(work);
    }

    /// One substep, in order: grid, SPH fields, walls, body and boat
    /// coupling, particle integration and lifecycle, body and boat motion.
    pub fn substep(&mut self, dt: f32) {
        let gravity = self.effective_gravity();
        let pr = self.config.particle_radius;

        self.grid.rebuild(self.particles.positions());
        let params = self.config.kernel_params(dt);
        self.dispatcher
            .compute_fields(&mut self.particles, &self.grid, &params);

        apply_walls(&self.walls, &mut self.particles, &self.grid);
        self.bodies
            .couple_particles(&mut self.particles, &self.grid, pr, gravity);
        if let Some(boat) = self.boat.as_mut() {
            boat.couple_hull(&mut self.particles, &self.grid, pr);
            boat.apply_wake(&mut self.particles, &self.grid, &mut self.foam, &mut self.rng);
            boat.sample_current(&self.particles, &self.grid);
        }

        decay_explosions(&mut self.explosions, dt);
        self.integrate_particles(gravity, dt);

        apply_portals(&self.portals, &mut self.particles, dt);
        apply_drains(&self.drains, &mut self.particles);
        let (lo, hi) = self.domain_bounds();
        for emitter in &mut self.emitters {
            emitter.emit(&mut self.particles, &mut self.rng, dt, lo, hi);
        }

        let (w, h) = (self.config.width, self.config.height);
        self.bodies.integrate(gravity, dt, w, h);
        if let Some(boat) = self.boat.as_mut() {
            boat.integrate(dt, w, h);
        }
    }

    fn integrate_particles(&mut self, gravity: Vec2, dt: f32) {
        let Self {
            config,
            particles,
            foam,
            rng,
            explosions,
            tool,
            pointer,
            ..
        } = self;

        let damping = config.velocity_damping;
        let max_speed = config.max_speed;
        let restitution = config.boundary_restitution;
        let lo = Vec2::splat(config.particle_radius);
        let hi = Vec2::new(config.width, config.height) - lo;
        let center = (lo + hi) * 0.5;

        for i in 0..particles.len() {
            if particles.frozen[i] {
                particles.velocity[i] = Vec2::ZERO;
                continue;
            }

            let mut p = particles.position[i];
            let mut accel = particles.force[i] + gravity;
            for e in explosions.iter() {
                accel += e.acceleration(p);
            }

            let mut v = (particles.velocity[i] + accel * dt) * damping;
            v = v.clamp_length_max(max_speed);
            v += tool.acceleration(pointer, p) * dt;
            p += v * dt;

            if !p.is_finite() || !v.is_finite() {
                particles.position[i] = center;
                particles.velocity[i] = Vec2::ZERO;
                continue;
            }

            if p.x < lo.x {
                p.x = lo.x;
                if v.x < 0.0 {
                    v.x = -v.x * restitution;
                }
            } else if p.x > hi.x {
                p.x = hi.x;
                if v.x > 0.0 {
                    v.x = -v.x * restitution;
                }
            }
            if p.y < lo.y {
                p.y = lo.y;
                if v.y < 0.0 {
                    v.y = -v.y * restitution;
                }
            } else if p.y > hi.y {
                p.y = hi.y;
                if v.y > 0.0 {
                    if v.y > SPLASH_SPEED {
                        foam.splash(rng, p, Vec2::new(v.x, -v.y), 2);
                    }
                    v.y = -v.y * restitution;
                }
            }

            particles.position[i] = p;
            particles.velocity[i] = v;
        }
    }

    /// Where a particle center may sit: one radius in from every edge.
    fn domain_bounds(&self) -> (Vec2, Vec2) {
        let lo = Vec2::splat(self.config.particle_radius);
        let hi = (Vec2::new(self.config.width, self.config.height) - lo).max(lo);
        (lo, hi)
    }

    fn clamp_to_domain(&self, p: Vec2) -> Vec2 {
        let (lo, hi) = self.domain_bounds();
        if p.is_finite() {
            p.clamp(lo, hi)
        } else {
            (lo + hi) * 0.5
        }
    }

    // ========================================================================
    // Output
    // ========================================================================

    /// Copy this frame's state into reusable buffers.
    pub fn write_frame(&self, frame: &mut FrameData) {
        let n = self.particles.len();
        frame.particle_count = n;

        frame.positions.clear();
        frame.positions.extend_from_slice(self.particles.positions());
        frame.velocities.clear();
        frame.velocities.extend_from_slice(self.particles.velocities());
        frame.densities.clear();
        frame.densities.extend_from_slice(self.particles.densities());

        frame.foam_positions.clear();
        frame.foam_positions.extend_from_slice(&self.foam.position);
        frame.foam_life.clear();
        frame.foam_life.extend(
            self.foam
                .life
                .iter()
                .map(|l| (l / FOAM_LIFETIME).clamp(0.0, 1.0)),
        );
        frame.foam_size.clear();
        frame.foam_size.extend_from_slice(&self.foam.size);

        frame.bodies.clear();
        frame
            .bodies
            .extend(self.bodies.iter().map(RigidBodyInstance::from));
        frame.boat = self.boat.as_ref().map(BoatPose::from);

        frame.throughput = self.throughput.rate();
        frame.execution = self.execution_model();
    }

    /// Convenience for callers that don't keep a buffer around.
    pub fn frame_data(&self) -> FrameData {
        let mut frame = FrameData::default();
        self.write_frame(&mut frame);
        frame
    }
}

fn grid_dims(config: &SimConfig) -> GridDims {
    GridDims::for_domain(
        config.width,
        config.height,
        config.kernel_radius,
        MAX_GRID_CELLS,
    )
}
