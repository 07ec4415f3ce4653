//! The player boat. Top-down: while it exists the world drops gravity.
//!
//! The hull is a box that collides with particles exactly like a rigid body.
//! On top of that the propeller pushes water out of a cone behind the stern,
//! and the surrounding flow drags and yaws the hull.

use crate::constants::{
    BOAT_ANGULAR_DAMPING, BOAT_HALF_LENGTH, BOAT_HALF_WIDTH, BOAT_LATERAL_KEEP,
    BOAT_LINEAR_DAMPING, BOAT_MASS, BOAT_MAX_ANGULAR_SPEED, BOAT_MAX_HYDRO_FORCE, BOAT_MAX_SPEED,
    BOAT_REVERSE_FRACTION, BOAT_STEER_REF_SPEED, BOAT_THRUST, BOAT_TURN_ACCEL, BODY_WALL_RESTITUTION,
    CURRENT_DRAG, CURRENT_RADIUS, CURRENT_REF_COUNT, CURRENT_YAW, WAKE_BASE_HALF_WIDTH,
    WAKE_BASE_LENGTH, WAKE_FOAM_CHANCE, WAKE_LENGTH_PER_SPEED, WAKE_PUSH, WAKE_WIDTH_PER_SPEED,
};
use crate::foam::Foam;
use crate::particle::Particles;
use crate::rigid::{contact_response, Contact, Shape};
use crate::spatial::SpatialGrid;
use glam::Vec2;
use rand::Rng;
use rayon::prelude::*;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BoatControls {
    /// 0..=1
    pub throttle: f32,
    pub left: bool,
    pub right: bool,
    pub reverse: bool,
}

impl BoatControls {
    pub fn new(throttle: f32, left: bool, right: bool, reverse: bool) -> Self {
        Self {
            throttle: if throttle.is_finite() {
                throttle.clamp(0.0, 1.0)
            } else {
                0.0
            },
            left,
            right,
            reverse,
        }
    }

    /// +1 turns clockwise on screen (y down), -1 counter-clockwise.
    fn turn(&self) -> f32 {
        (self.right as i32 - self.left as i32) as f32
    }

    fn thrusting(&self) -> bool {
        self.throttle > 0.0
    }
}

/// Flow around the hull from the last sample.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CurrentSample {
    /// Inverse-distance weighted particle velocity around the hull center
    pub velocity: Vec2,
    pub count: usize,
    /// Lateral flow at the bow and stern, positive to starboard
    pub bow_lateral: f32,
    pub stern_lateral: f32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Boat {
    pub position: Vec2,
    /// Heading, radians; local +x is the bow
    pub angle: f32,
    pub velocity: Vec2,
    pub angular_velocity: f32,
    pub controls: BoatControls,
    /// Reaction from hull contacts, accumulated over a substep
    pub hydro_force: Vec2,
    pub hydro_torque: f32,
    pub current: CurrentSample,
    pub mass: f32,
    pub inertia: f32,
    pub shape: Shape,
}

impl Boat {
    pub fn new(position: Vec2) -> Self {
        let shape = Shape::Box {
            half_extents: Vec2::new(BOAT_HALF_LENGTH, BOAT_HALF_WIDTH),
        };
        Self {
            position,
            angle: -std::f32::consts::FRAC_PI_2,
            velocity: Vec2::ZERO,
            angular_velocity: 0.0,
            controls: BoatControls::default(),
            hydro_force: Vec2::ZERO,
            hydro_torque: 0.0,
            current: CurrentSample::default(),
            mass: BOAT_MASS,
            inertia: BOAT_MASS * shape.inertia_per_mass(),
            shape,
        }
    }

    #[inline]
    pub fn forward(&self) -> Vec2 {
        Vec2::from_angle(self.angle)
    }

    pub fn stern(&self) -> Vec2 {
        self.position - self.forward() * BOAT_HALF_LENGTH
    }

    pub fn bow(&self) -> Vec2 {
        self.position + self.forward() * BOAT_HALF_LENGTH
    }

    fn contact(&self, p: Vec2, particle_radius: f32) -> Option<Contact> {
        let rot = self.forward();
        let local = Vec2::new(rot.x, -rot.y).rotate(p - self.position);
        let c = self.shape.contact_local(local, particle_radius)?;
        Some(Contact {
            penetration: c.penetration,
            normal: rot.rotate(c.normal),
            local_point: c.point,
        })
    }

    /// Hull vs particles. Particles get pushed out, the boat keeps the
    /// reaction as hydrodynamic resistance.
    pub fn couple_hull(&mut self, particles: &mut Particles, grid: &SpatialGrid, particle_radius: f32) {
        let n = particles.len();
        let positions = &particles.position[..n];
        let velocities = &particles.velocity[..n];
        let forces = &mut particles.force[..n];

        let reach = self.shape.bounding_radius() + particle_radius;
        let rot = self.forward();
        let mut force = Vec2::ZERO;
        let mut torque = 0.0;
        grid.for_each_within(positions, self.position, reach, |i, _, _| {
            let Some(contact) = self.contact(positions[i], particle_radius) else {
                return;
            };
            let r = rot.rotate(contact.local_point);
            let hull_velocity = self.velocity + r.perp() * self.angular_velocity;
            let f = contact_response(&contact, velocities[i], hull_velocity);
            forces[i] += f;
            force -= f;
            torque += r.perp_dot(-f);
        });
        self.hydro_force += force;
        self.hydro_torque += torque;
    }

    /// Push water out of the cone behind the stern while the throttle is
    /// open, and throw up some spray.
    pub fn apply_wake(
        &self,
        particles: &mut Particles,
        grid: &SpatialGrid,
        foam: &mut Foam,
        rng: &mut impl Rng,
    ) {
        if !self.controls.thrusting() {
            return;
        }
        let speed = self.velocity.length();
        let length = WAKE_BASE_LENGTH + speed * WAKE_LENGTH_PER_SPEED;
        let half_width = WAKE_BASE_HALF_WIDTH + speed * WAKE_WIDTH_PER_SPEED;

        let forward = self.forward();
        let side = forward.perp();
        let stern = self.stern();
        // Reverse pulls water forward under the hull instead
        let push_dir = if self.controls.reverse { forward } else { -forward };
        let push = WAKE_PUSH * self.controls.throttle;

        let n = particles.len();
        let positions = &particles.position[..n];
        let forces = &mut particles.force[..n];
        let center = stern - forward * (length * 0.5);
        let reach = length * 0.5 + half_width;

        grid.for_each_within(positions, center, reach, |i, _, _| {
            let rel = positions[i] - stern;
            let behind = -rel.dot(forward);
            if behind < 0.0 || behind > length {
                return;
            }
            let t = behind / length;
            // Narrow at the propeller, full width at the far end
            let width = half_width * (0.35 + 0.65 * t);
            if rel.dot(side).abs() > width {
                return;
            }
            forces[i] += push_dir * (push * (1.0 - t));
        });

        let chance = WAKE_FOAM_CHANCE * (speed / BOAT_MAX_SPEED).min(1.0) * self.controls.throttle;
        if rng.gen::<f32>() < chance {
            let jitter = side * rng.gen_range(-half_width..=half_width);
            let spray = push_dir * speed * 0.3 + side * rng.gen_range(-40.0..40.0);
            foam.spawn(rng, stern + jitter, spray);
        }
    }

    /// Inverse-distance weighted flow at the hull center, bow and stern.
    /// The three lookups are independent and run in parallel.
    pub fn sample_current(&mut self, particles: &Particles, grid: &SpatialGrid) {
        let positions = particles.positions();
        let velocities = particles.velocities();
        let points = [self.position, self.bow(), self.stern()];

        let samples: Vec<(Vec2, usize)> = points
            .par_iter()
            .map(|&point| {
                let mut sum = Vec2::ZERO;
                let mut weight = 0.0;
                let mut count = 0;
                grid.for_each_within(positions, point, CURRENT_RADIUS, |i, _, d2| {
                    let w = 1.0 / (d2.sqrt() + 1.0);
                    sum += velocities[i] * w;
                    weight += w;
                    count += 1;
                });
                let mean = if weight > 0.0 { sum / weight } else { Vec2::ZERO };
                (mean, count)
            })
            .collect();

        let side = self.forward().perp();
        self.current = CurrentSample {
            velocity: samples[0].0,
            count: samples[0].1,
            bow_lateral: samples[1].0.dot(side),
            stern_lateral: samples[2].0.dot(side),
        };
    }

    /// Drive, steer, apply water resistance and integrate. Clears the
    /// hydrodynamic accumulators.
    pub fn integrate(&mut self, dt: f32, width: f32, height: f32) {
        let forward = self.forward();
        let side = forward.perp();
        let controls = self.controls;

        let thrust = if controls.reverse {
            -forward * (BOAT_THRUST * BOAT_REVERSE_FRACTION * controls.throttle)
        } else {
            forward * (BOAT_THRUST * controls.throttle)
        };

        let hydro = self.hydro_force.clamp_length_max(BOAT_MAX_HYDRO_FORCE);

        // More water around the hull, more grip, but sub-linearly
        let current = self.current;
        let grip = (current.count as f32 / CURRENT_REF_COUNT).sqrt().min(1.5);
        let drag = (current.velocity - self.velocity) * (CURRENT_DRAG * self.mass * grip);
        let yaw = (current.bow_lateral - current.stern_lateral) * CURRENT_YAW * grip;

        self.velocity += (thrust + hydro + drag) / self.mass * dt;

        // No rudder authority at rest
        let speed = self.velocity.length();
        let authority = (speed / BOAT_STEER_REF_SPEED).min(1.0);
        let going_back = self.velocity.dot(forward) < 0.0;
        let turn = if going_back { -controls.turn() } else { controls.turn() };
        self.angular_velocity += turn * BOAT_TURN_ACCEL * authority * dt;
        self.angular_velocity += (self.hydro_torque + yaw) / self.inertia * dt;

        // Keel: bleed off sideways slip
        let lateral = self.velocity.dot(side);
        self.velocity -= side * (lateral * (1.0 - BOAT_LATERAL_KEEP));

        self.velocity *= BOAT_LINEAR_DAMPING;
        self.angular_velocity *= BOAT_ANGULAR_DAMPING;
        self.velocity = self.velocity.clamp_length_max(BOAT_MAX_SPEED);
        self.angular_velocity = self
            .angular_velocity
            .clamp(-BOAT_MAX_ANGULAR_SPEED, BOAT_MAX_ANGULAR_SPEED);
        if !self.velocity.is_finite() {
            self.velocity = Vec2::ZERO;
        }
        if !self.angular_velocity.is_finite() {
            self.angular_velocity = 0.0;
        }

        self.position += self.velocity * dt;
        self.angle += self.angular_velocity * dt;
        self.contain(width, height);

        self.hydro_force = Vec2::ZERO;
        self.hydro_torque = 0.0;
    }

    pub fn contain(&mut self, width: f32, height: f32) {
        let (min, max) = self.shape.aabb(self.angle);
        if self.position.x + min.x < 0.0 {
            self.position.x = -min.x;
            self.velocity.x = self.velocity.x.abs() * BODY_WALL_RESTITUTION;
        } else if self.position.x + max.x > width {
            self.position.x = width - max.x;
            self.velocity.x = -self.velocity.x.abs() * BODY_WALL_RESTITUTION;
        }
        if self.position.y + min.y < 0.0 {
            self.position.y = -min.y;
            self.velocity.y = self.velocity.y.abs() * BODY_WALL_RESTITUTION;
        } else if self.position.y + max.y > height {
            self.position.y = height - max.y;
            self.velocity.y = -self.velocity.y.abs() * BODY_WALL_RESTITUTION;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial::GridDims;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const DT: f32 = 1.0 / 240.0;

    #[test]
    fn test_no_steering_at_rest() {
        let mut boat = Boat::new(Vec2::new(300.0, 300.0));
        boat.controls = BoatControls::new(0.0, true, false, false);
        let angle = boat.angle;
        for _ in 0..100 {
            boat.integrate(DT, 600.0, 600.0);
        }
        assert_eq!(boat.angular_velocity, 0.0);
        assert_eq!(boat.angle, angle);
    }

    #[test]
    fn test_throttle_moves_boat_forward_and_steering_turns_it() {
        let mut boat = Boat::new(Vec2::new(500.0, 500.0));
        boat.controls = BoatControls::new(1.0, false, false, false);
        for _ in 0..120 {
            boat.integrate(DT, 1000.0, 1000.0);
        }
        assert!(boat.velocity.dot(boat.forward()) > 50.0);

        boat.controls = BoatControls::new(1.0, false, true, false);
        let angle = boat.angle;
        for _ in 0..60 {
            boat.integrate(DT, 1000.0, 1000.0);
        }
        assert!(boat.angle > angle);
    }

    #[test]
    fn test_lateral_slip_is_damped() {
        let mut boat = Boat::new(Vec2::new(500.0, 500.0));
        boat.angle = 0.0;
        boat.velocity = Vec2::new(0.0, 200.0);
        boat.integrate(DT, 1000.0, 1000.0);
        assert!(boat.velocity.y < 200.0 * BOAT_LATERAL_KEEP + 1.0);
    }

    #[test]
    fn test_throttle_is_clamped() {
        assert_eq!(BoatControls::new(3.0, false, false, false).throttle, 1.0);
        assert_eq!(BoatControls::new(-1.0, false, false, false).throttle, 0.0);
        assert_eq!(BoatControls::new(f32::NAN, false, false, false).throttle, 0.0);
    }

    #[test]
    fn test_wake_pushes_water_behind_stern() {
        let mut boat = Boat::new(Vec2::new(200.0, 200.0));
        boat.angle = 0.0;
        boat.controls = BoatControls::new(1.0, false, false, false);

        let mut particles = Particles::with_capacity(8);
        // Just behind the stern, and well off to the side
        particles.spawn(boat.stern() - Vec2::new(10.0, 0.0), Vec2::ZERO);
        particles.spawn(boat.stern() + Vec2::new(-10.0, 60.0), Vec2::ZERO);
        let dims = GridDims::for_domain(400.0, 400.0, 16.0, 4096);
        let mut grid = SpatialGrid::new(dims, 8);
        grid.rebuild(particles.positions());

        let mut foam = Foam::new();
        let mut rng = StdRng::seed_from_u64(9);
        boat.apply_wake(&mut particles, &grid, &mut foam, &mut rng);
        assert!(particles.force[0].x < 0.0);
        assert_eq!(particles.force[1], Vec2::ZERO);
    }

    #[test]
    fn test_current_drags_boat_along() {
        let mut boat = Boat::new(Vec2::new(200.0, 200.0));
        let mut particles = Particles::with_capacity(128);
        for k in 0..64 {
            let p = Vec2::new(150.0 + (k % 8) as f32 * 12.0, 150.0 + (k / 8) as f32 * 12.0);
            particles.spawn(p, Vec2::new(100.0, 0.0));
        }
        let dims = GridDims::for_domain(400.0, 400.0, 16.0, 4096);
        let mut grid = SpatialGrid::new(dims, 128);
        grid.rebuild(particles.positions());

        boat.sample_current(&particles, &grid);
        assert!(boat.current.count > 0);
        assert!((boat.current.velocity.x - 100.0).abs() < 1e-2);

        boat.integrate(DT, 400.0, 400.0);
        assert!(boat.velocity.x > 0.0);
    }

    /// Bow cluster flows one way across the hull, stern cluster the other.
    fn shear_flow(bow_flow: f32) -> Boat {
        let mut boat = Boat::new(Vec2::new(200.0, 200.0));
        boat.angle = 0.0;
        let mut particles = Particles::with_capacity(64);
        for (end, flow) in [(boat.bow(), bow_flow), (boat.stern(), -bow_flow)] {
            for k in 0..16 {
                let offset = Vec2::new((k % 4) as f32 * 4.0 - 6.0, (k / 4) as f32 * 4.0 - 6.0);
                particles.spawn(end + offset, Vec2::new(0.0, flow));
            }
        }
        let dims = GridDims::for_domain(400.0, 400.0, 16.0, 4096);
        let mut grid = SpatialGrid::new(dims, 64);
        grid.rebuild(particles.positions());

        boat.sample_current(&particles, &grid);
        boat.integrate(DT, 400.0, 400.0);
        boat
    }

    #[test]
    fn test_cross_flow_at_bow_and_stern_yaws_boat() {
        let boat = shear_flow(80.0);
        assert!(boat.current.bow_lateral > 0.0);
        assert!(boat.current.stern_lateral < 0.0);
        assert!(boat.angular_velocity > 0.0, "no yaw: {}", boat.angular_velocity);

        let mirrored = shear_flow(-80.0);
        assert!(mirrored.angular_velocity < 0.0);
        assert!((mirrored.angular_velocity + boat.angular_velocity).abs() < 1e-4);
    }
}
