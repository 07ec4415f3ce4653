//! Placed scenery that creates, removes, moves or pushes particles:
//! emitters, drains, wall segments, portal pairs and explosions.

use crate::constants::{
    EXPLOSION_ACCEL, EXPLOSION_DECAY, EXPLOSION_IMPULSE, EXPLOSION_MIN_STRENGTH, EXPLOSION_RADIUS,
    PORTAL_COOLDOWN, WALL_DAMPING, WALL_ERASE_RADIUS, WALL_RADIUS, WALL_STIFFNESS,
};
use crate::particle::Particles;
use crate::rigid::RigidBodies;
use crate::spatial::SpatialGrid;
use glam::Vec2;
use rand::Rng;

#[derive(Clone, Debug, PartialEq)]
pub struct Emitter {
    pub id: u32,
    pub position: Vec2,
    /// Direction of the jet, radians
    pub angle: f32,
    pub speed: f32,
    /// Particles per second
    pub rate: f32,
    /// Half-angle of the random cone, radians
    pub spread: f32,
    accumulator: f32,
}

impl Emitter {
    pub fn new(id: u32, position: Vec2, angle: f32, speed: f32, rate: f32) -> Self {
        Self {
            id,
            position,
            angle,
            speed,
            rate: rate.max(0.0),
            spread: 0.15,
            accumulator: 0.0,
        }
    }

    /// Spawn however many particles are due, inside `[lo, hi]`. Returns how
    /// many went in.
    pub fn emit(
        &mut self,
        particles: &mut Particles,
        rng: &mut impl Rng,
        dt: f32,
        lo: Vec2,
        hi: Vec2,
    ) -> usize {
        self.accumulator += self.rate * dt;
        let due = self.accumulator.floor() as usize;
        self.accumulator -= due as f32;

        let mut spawned = 0;
        for _ in 0..due {
            let angle = self.angle + rng.gen_range(-1.0..=1.0) * self.spread;
            let speed = self.speed * rng.gen_range(0.9..=1.1);
            let jitter = Vec2::new(rng.gen_range(-2.0..=2.0), rng.gen_range(-2.0..=2.0));
            let p = (self.position + jitter).clamp(lo, hi);
            if !particles.spawn(p, Vec2::from_angle(angle) * speed) {
                // Full: drop the rest of this batch
                self.accumulator = 0.0;
                break;
            }
            spawned += 1;
        }
        spawned
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Drain {
    pub id: u32,
    pub position: Vec2,
    pub radius: f32,
}

impl Drain {
    #[inline]
    pub fn captures(&self, p: Vec2) -> bool {
        p.distance_squared(self.position) < self.radius * self.radius
    }
}

/// Remove every particle inside any drain. Swap-with-last, so order changes.
pub fn apply_drains(drains: &[Drain], particles: &mut Particles) -> usize {
    if drains.is_empty() {
        return 0;
    }
    particles.remove_where(|p| drains.iter().any(|d| d.captures(p)))
}

/// Free-form wall segment.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Wall {
    pub a: Vec2,
    pub b: Vec2,
}

impl Wall {
    pub fn closest_point(&self, p: Vec2) -> Vec2 {
        let ab = self.b - self.a;
        let len2 = ab.length_squared();
        if len2 < 1e-12 {
            return self.a;
        }
        let t = ((p - self.a).dot(ab) / len2).clamp(0.0, 1.0);
        self.a + ab * t
    }

    pub fn distance(&self, p: Vec2) -> f32 {
        p.distance(self.closest_point(p))
    }
}

/// Penalty push out of every wall. Runs serially on the coordinator after
/// the force pass and adds into the force accumulator.
pub fn apply_walls(walls: &[Wall], particles: &mut Particles, grid: &SpatialGrid) {
    if walls.is_empty() {
        return;
    }
    let n = particles.len();
    let positions = &particles.position[..n];
    let velocities = &particles.velocity[..n];
    let forces = &mut particles.force[..n];

    for wall in walls {
        let mid = (wall.a + wall.b) * 0.5;
        let reach = wall.a.distance(wall.b) * 0.5 + WALL_RADIUS;
        grid.for_each_within(positions, mid, reach, |i, _, _| {
            let p = positions[i];
            let c = wall.closest_point(p);
            let d = p - c;
            let dist = d.length();
            if dist >= WALL_RADIUS {
                return;
            }
            let normal = if dist > 1e-5 {
                d / dist
            } else {
                // Dead on the line: push along the segment normal
                (wall.b - wall.a).perp().try_normalize().unwrap_or(Vec2::NEG_Y)
            };
            let mut f = normal * ((WALL_RADIUS - dist) * WALL_STIFFNESS);
            let vn = velocities[i].dot(normal);
            if vn < 0.0 {
                f -= normal * (vn * WALL_DAMPING);
            }
            forces[i] += f;
        });
    }
}

/// Drop walls passing within the erase radius of `p`. Returns how many went.
pub fn erase_walls_near(walls: &mut Vec<Wall>, p: Vec2) -> usize {
    let before = walls.len();
    walls.retain(|w| w.distance(p) > WALL_ERASE_RADIUS);
    before - walls.len()
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PortalPair {
    pub a: Vec2,
    pub b: Vec2,
    pub radius: f32,
}

/// Tick cooldowns, then move particles that entered either mouth to the
/// other one, keeping their offset and velocity.
pub fn apply_portals(portals: &[PortalPair], particles: &mut Particles, dt: f32) -> usize {
    let n = particles.len();
    for c in &mut particles.teleport_cooldown[..n] {
        *c = (*c - dt).max(0.0);
    }
    if portals.is_empty() {
        return 0;
    }

    let mut moved = 0;
    for i in 0..n {
        if particles.teleport_cooldown[i] > 0.0 || particles.frozen[i] {
            continue;
        }
        let p = particles.position[i];
        for portal in portals {
            let r2 = portal.radius * portal.radius;
            let target = if p.distance_squared(portal.a) < r2 {
                Some(portal.b + (p - portal.a))
            } else if p.distance_squared(portal.b) < r2 {
                Some(portal.a + (p - portal.b))
            } else {
                None
            };
            if let Some(target) = target {
                particles.position[i] = target;
                particles.teleport_cooldown[i] = PORTAL_COOLDOWN;
                moved += 1;
                break;
            }
        }
    }
    moved
}

/// Radial force field left behind by an explosion.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Explosion {
    pub center: Vec2,
    pub radius: f32,
    /// 1.0 at detonation, decays every substep
    pub strength: f32,
}

impl Explosion {
    pub fn new(center: Vec2) -> Self {
        Self {
            center,
            radius: EXPLOSION_RADIUS,
            strength: 1.0,
        }
    }

    /// Outward unit direction and linear falloff at `p`, or `None` outside.
    #[inline]
    fn falloff(&self, p: Vec2) -> Option<(Vec2, f32)> {
        let d = p - self.center;
        let dist = d.length();
        if dist >= self.radius {
            return None;
        }
        let dir = if dist > 1e-4 { d / dist } else { Vec2::NEG_Y };
        Some((dir, 1.0 - dist / self.radius))
    }

    /// Instant kick to everything in range.
    pub fn detonate(&self, particles: &mut Particles, bodies: &mut RigidBodies) {
        let n = particles.len();
        for i in 0..n {
            if particles.frozen[i] {
                continue;
            }
            if let Some((dir, k)) = self.falloff(particles.position[i]) {
                particles.velocity[i] += dir * (EXPLOSION_IMPULSE * k);
            }
        }
        for body in bodies.iter_mut() {
            if let Some((dir, k)) = self.falloff(body.position) {
                body.velocity += dir * (EXPLOSION_IMPULSE * 0.5 * k);
            }
        }
    }

    pub fn acceleration(&self, p: Vec2) -> Vec2 {
        match self.falloff(p) {
            Some((dir, k)) => dir * (EXPLOSION_ACCEL * self.strength * k),
            None => Vec2::ZERO,
        }
    }

    pub fn decay(&mut self, dt: f32) {
        self.strength *= EXPLOSION_DECAY.powf(dt);
    }

    pub fn is_spent(&self) -> bool {
        self.strength < EXPLOSION_MIN_STRENGTH
    }
}

/// Decay every explosion and forget the spent ones.
pub fn decay_explosions(explosions: &mut Vec<Explosion>, dt: f32) {
    for e in explosions.iter_mut() {
        e.decay(dt);
    }
    explosions.retain(|e| !e.is_spent());
}
