//! 2D rigid bodies two-way coupled to the fluid with penalty contacts.
//!
//! Particles overlapping a body get a spring force out along the contact
//! normal, the body gets the reaction plus its torque. A damping term only
//! acts while the particle is still approaching, so bodies don't get sucked
//! back onto particles that are leaving.
//!
//! Reference: Becker, Tessendorf & Teschner 2009, "Direct forcing for
//! Lagrangian rigid-fluid coupling" (penalty variant).

use crate::constants::{
    BODY_ANGULAR_DAMPING, BODY_BODY_RESTITUTION, BODY_LINEAR_DAMPING, BODY_MAX_ANGULAR_SPEED,
    BODY_MAX_SPEED, BODY_WALL_RESTITUTION, BUOYANCY_MARGIN, BUOYANCY_PER_PARTICLE,
    CONTACT_DAMPING, CONTACT_STIFFNESS, MAX_BUOYANCY_FRACTION, MAX_RIGID_BODIES, MIN_BODY_INERTIA,
    MIN_BODY_MASS, RIGID_DENSITY,
};
use crate::particle::Particles;
use crate::spatial::SpatialGrid;
use glam::Vec2;
use rayon::prelude::*;

/// Default body colors, picked by id.
const PALETTE: [[f32; 4]; 6] = [
    [0.85, 0.45, 0.25, 1.0],
    [0.35, 0.70, 0.40, 1.0],
    [0.90, 0.80, 0.30, 1.0],
    [0.55, 0.45, 0.80, 1.0],
    [0.80, 0.35, 0.55, 1.0],
    [0.45, 0.60, 0.65, 1.0],
];

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Shape {
    Box { half_extents: Vec2 },
    Circle { radius: f32 },
    /// Local vertices, re-centered on the centroid when a body is built
    Triangle { vertices: [Vec2; 3] },
}

impl Shape {
    pub fn rect(width: f32, height: f32) -> Self {
        Shape::Box {
            half_extents: Vec2::new(width.abs() * 0.5, height.abs() * 0.5),
        }
    }

    pub fn circle(radius: f32) -> Self {
        Shape::Circle {
            radius: radius.abs(),
        }
    }

    /// Equilateral triangle with the given side length, apex up.
    pub fn triangle(side: f32) -> Self {
        let h = side.abs() * 3f32.sqrt() * 0.5;
        Shape::Triangle {
            vertices: [
                Vec2::new(0.0, -h * 2.0 / 3.0),
                Vec2::new(side * 0.5, h / 3.0),
                Vec2::new(-side * 0.5, h / 3.0),
            ],
        }
    }

    pub fn area(&self) -> f32 {
        match *self {
            Shape::Box { half_extents } => 4.0 * half_extents.x * half_extents.y,
            Shape::Circle { radius } => std::f32::consts::PI * radius * radius,
            Shape::Triangle { vertices: [a, b, c] } => 0.5 * (b - a).perp_dot(c - a).abs(),
        }
    }

    /// Polar moment of inertia per unit mass about the centroid.
    pub fn inertia_per_mass(&self) -> f32 {
        match *self {
            Shape::Box { half_extents } => half_extents.length_squared() / 3.0,
            Shape::Circle { radius } => 0.5 * radius * radius,
            Shape::Triangle { vertices: [a, b, c] } => {
                ((b - a).length_squared() + (c - b).length_squared() + (a - c).length_squared())
                    / 36.0
            }
        }
    }

    pub fn bounding_radius(&self) -> f32 {
        match *self {
            Shape::Box { half_extents } => half_extents.length(),
            Shape::Circle { radius } => radius,
            Shape::Triangle { vertices } => vertices
                .iter()
                .map(|v| v.length())
                .fold(0.0, f32::max),
        }
    }

    /// Axis-aligned bounds of the rotated shape, as offsets from its center.
    pub fn aabb(&self, angle: f32) -> (Vec2, Vec2) {
        let rot = Vec2::from_angle(angle);
        match *self {
            Shape::Box { half_extents } => {
                let (c, s) = (rot.x.abs(), rot.y.abs());
                let ext = Vec2::new(
                    c * half_extents.x + s * half_extents.y,
                    s * half_extents.x + c * half_extents.y,
                );
                (-ext, ext)
            }
            Shape::Circle { radius } => (Vec2::splat(-radius), Vec2::splat(radius)),
            Shape::Triangle { vertices } => {
                let world = vertices.map(|v| rot.rotate(v));
                let min = world[0].min(world[1]).min(world[2]);
                let max = world[0].max(world[1]).max(world[2]);
                (min, max)
            }
        }
    }

    /// Overlap test for a disc of radius `particle_radius` at local `p`.
    pub fn contact_local(&self, p: Vec2, particle_radius: f32) -> Option<LocalContact> {
        match *self {
            Shape::Circle { radius } => circle_contact(radius, p, particle_radius),
            Shape::Box { half_extents } => box_contact(half_extents, p, particle_radius),
            Shape::Triangle { vertices } => triangle_contact(&vertices, p, particle_radius),
        }
    }

    /// Small integer tag for renderers.
    pub fn kind(&self) -> u32 {
        match self {
            Shape::Box { .. } => 0,
            Shape::Circle { .. } => 1,
            Shape::Triangle { .. } => 2,
        }
    }

    /// Shape parameters flattened for renderers: box `[hx, hy]`, circle
    /// `[r]`, triangle `[x0, y0, x1, y1, x2, y2]`, zero padded.
    pub fn dims(&self) -> [f32; 6] {
        match *self {
            Shape::Box { half_extents } => [half_extents.x, half_extents.y, 0.0, 0.0, 0.0, 0.0],
            Shape::Circle { radius } => [radius, 0.0, 0.0, 0.0, 0.0, 0.0],
            Shape::Triangle { vertices: [a, b, c] } => [a.x, a.y, b.x, b.y, c.x, c.y],
        }
    }
}

/// Contact in the body frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LocalContact {
    pub penetration: f32,
    pub normal: Vec2,
    pub point: Vec2,
}

/// Contact as seen by the coupling code.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Contact {
    pub penetration: f32,
    /// World-space normal, pointing out of the body
    pub normal: Vec2,
    /// Contact point in the body frame
    pub local_point: Vec2,
}

fn circle_contact(radius: f32, p: Vec2, pr: f32) -> Option<LocalContact> {
    let reach = radius + pr;
    let d2 = p.length_squared();
    if d2 >= reach * reach {
        return None;
    }
    let d = d2.sqrt();
    let normal = if d > 1e-6 { p / d } else { Vec2::NEG_Y };
    Some(LocalContact {
        penetration: reach - d,
        normal,
        point: normal * radius,
    })
}

fn box_contact(he: Vec2, p: Vec2, pr: f32) -> Option<LocalContact> {
    let a = p.abs();
    if a.x >= he.x + pr || a.y >= he.y + pr {
        return None;
    }

    if a.x <= he.x && a.y <= he.y {
        // Center inside: leave through the nearest face
        let dx = he.x - a.x;
        let dy = he.y - a.y;
        let sx = if p.x < 0.0 { -1.0 } else { 1.0 };
        let sy = if p.y < 0.0 { -1.0 } else { 1.0 };
        return Some(if dx < dy {
            LocalContact {
                penetration: dx + pr,
                normal: Vec2::new(sx, 0.0),
                point: Vec2::new(sx * he.x, p.y),
            }
        } else {
            LocalContact {
                penetration: dy + pr,
                normal: Vec2::new(0.0, sy),
                point: Vec2::new(p.x, sy * he.y),
            }
        });
    }

    let closest = p.clamp(-he, he);
    let delta = p - closest;
    let dist = delta.length();
    if dist >= pr || dist < 1e-6 {
        return None;
    }
    Some(LocalContact {
        penetration: pr - dist,
        normal: delta / dist,
        point: closest,
    })
}

fn closest_on_segment(a: Vec2, b: Vec2, p: Vec2) -> Vec2 {
    let ab = b - a;
    let len2 = ab.length_squared();
    if len2 < 1e-12 {
        return a;
    }
    let t = ((p - a).dot(ab) / len2).clamp(0.0, 1.0);
    a + ab * t
}

fn triangle_contact(v: &[Vec2; 3], p: Vec2, pr: f32) -> Option<LocalContact> {
    let winding = (v[1] - v[0]).perp_dot(v[2] - v[0]).signum();

    let mut inside = true;
    let mut best_dist = f32::MAX;
    let mut best_point = v[0];
    let mut best_edge_normal = Vec2::ZERO;

    for k in 0..3 {
        let a = v[k];
        let b = v[(k + 1) % 3];
        let edge = b - a;
        // Point is on the outer side of this edge
        if edge.perp_dot(p - a) * winding < 0.0 {
            inside = false;
        }
        let c = closest_on_segment(a, b, p);
        let d = p.distance(c);
        if d < best_dist {
            best_dist = d;
            best_point = c;
            best_edge_normal = Vec2::new(edge.y, -edge.x).normalize_or_zero() * winding;
        }
    }

    if inside {
        return Some(LocalContact {
            penetration: best_dist + pr,
            normal: best_edge_normal,
            point: best_point,
        });
    }

    if best_dist >= pr || best_dist < 1e-6 {
        return None;
    }
    Some(LocalContact {
        penetration: pr - best_dist,
        normal: (p - best_point) / best_dist,
        point: best_point,
    })
}

#[derive(Clone, Debug, PartialEq)]
pub struct RigidBody {
    pub id: u32,
    pub shape: Shape,
    pub position: Vec2,
    pub angle: f32,
    pub velocity: Vec2,
    pub angular_velocity: f32,
    pub force: Vec2,
    pub torque: f32,
    /// Contact plus buoyancy force consumed by the last `integrate`.
    pub last_force: Vec2,
    pub mass: f32,
    pub inertia: f32,
    pub color: [f32; 4],
}

impl RigidBody {
    pub fn new(id: u32, shape: Shape, position: Vec2, angle: f32, color: [f32; 4]) -> Self {
        let (shape, position) = recenter(shape, position, angle);
        let mass = (shape.area() * RIGID_DENSITY).max(MIN_BODY_MASS);
        let inertia = (mass * shape.inertia_per_mass()).max(MIN_BODY_INERTIA);
        Self {
            id,
            shape,
            position,
            angle,
            velocity: Vec2::ZERO,
            angular_velocity: 0.0,
            force: Vec2::ZERO,
            torque: 0.0,
            last_force: Vec2::ZERO,
            mass,
            inertia,
            color,
        }
    }

    #[inline]
    pub fn rotation(&self) -> Vec2 {
        Vec2::from_angle(self.angle)
    }

    #[inline]
    pub fn to_local(&self, p: Vec2) -> Vec2 {
        let rot = self.rotation();
        Vec2::new(rot.x, -rot.y).rotate(p - self.position)
    }

    /// Overlap of a particle with this body, in the shape's own frame.
    pub fn contact(&self, p: Vec2, particle_radius: f32) -> Option<Contact> {
        let local = self.shape.contact_local(self.to_local(p), particle_radius)?;
        Some(Contact {
            penetration: local.penetration,
            normal: self.rotation().rotate(local.normal),
            local_point: local.point,
        })
    }

    /// Velocity of the material point at world-space lever arm `r`.
    #[inline]
    pub fn velocity_at(&self, r: Vec2) -> Vec2 {
        self.velocity + r.perp() * self.angular_velocity
    }

    #[inline]
    pub fn apply_force_at(&mut self, force: Vec2, r: Vec2) {
        self.force += force;
        self.torque += r.perp_dot(force);
    }

    pub fn bounding_radius(&self) -> f32 {
        self.shape.bounding_radius()
    }

    /// Semi-implicit Euler with damping and speed clamps. Clears accumulators.
    pub fn integrate(&mut self, gravity: Vec2, dt: f32) {
        self.velocity += (self.force / self.mass + gravity) * dt;
        self.angular_velocity += self.torque / self.inertia * dt;

        self.velocity *= BODY_LINEAR_DAMPING;
        self.angular_velocity *= BODY_ANGULAR_DAMPING;
        self.velocity = self.velocity.clamp_length_max(BODY_MAX_SPEED);
        self.angular_velocity = self
            .angular_velocity
            .clamp(-BODY_MAX_ANGULAR_SPEED, BODY_MAX_ANGULAR_SPEED);
        if !self.velocity.is_finite() {
            self.velocity = Vec2::ZERO;
        }
        if !self.angular_velocity.is_finite() {
            self.angular_velocity = 0.0;
        }

        self.position += self.velocity * dt;
        self.angle += self.angular_velocity * dt;

        self.last_force = self.force;
        self.force = Vec2::ZERO;
        self.torque = 0.0;
    }

    /// Keep the rotated bounds inside `[0, width] × [0, height]`.
    pub fn contain(&mut self, width: f32, height: f32) {
        let (min, max) = self.shape.aabb(self.angle);
        let mut hit = false;

        if self.position.x + min.x < 0.0 {
            self.position.x = -min.x;
            if self.velocity.x < 0.0 {
                self.velocity.x = -self.velocity.x * BODY_WALL_RESTITUTION;
            }
            hit = true;
        } else if self.position.x + max.x > width {
            self.position.x = width - max.x;
            if self.velocity.x > 0.0 {
                self.velocity.x = -self.velocity.x * BODY_WALL_RESTITUTION;
            }
            hit = true;
        }

        if self.position.y + min.y < 0.0 {
            self.position.y = -min.y;
            if self.velocity.y < 0.0 {
                self.velocity.y = -self.velocity.y * BODY_WALL_RESTITUTION;
            }
            hit = true;
        } else if self.position.y + max.y > height {
            self.position.y = height - max.y;
            if self.velocity.y > 0.0 {
                self.velocity.y = -self.velocity.y * BODY_WALL_RESTITUTION;
            }
            hit = true;
        }

        if hit {
            self.angular_velocity *= 0.9;
        }
    }
}

/// Move triangle vertices so the centroid is the body origin.
fn recenter(shape: Shape, position: Vec2, angle: f32) -> (Shape, Vec2) {
    match shape {
        Shape::Triangle { vertices } => {
            let centroid = (vertices[0] + vertices[1] + vertices[2]) / 3.0;
            let shifted = vertices.map(|v| v - centroid);
            (
                Shape::Triangle { vertices: shifted },
                position + Vec2::from_angle(angle).rotate(centroid),
            )
        }
        other => (other, position),
    }
}

/// Penalty force on a particle and the reaction on the body.
#[inline]
pub fn contact_response(contact: &Contact, particle_velocity: Vec2, body_velocity: Vec2) -> Vec2 {
    let mut force = contact.normal * (contact.penetration * CONTACT_STIFFNESS);
    let vn = (particle_velocity - body_velocity).dot(contact.normal);
    if vn < 0.0 {
        force -= contact.normal * (vn * CONTACT_DAMPING);
    }
    force
}

/// The rigid-body collection. Capacity-bounded, ids never reused.
#[derive(Clone, Debug, Default)]
pub struct RigidBodies {
    bodies: Vec<RigidBody>,
    next_id: u32,
}

impl RigidBodies {
    pub fn new() -> Self {
        Self {
            bodies: Vec::with_capacity(MAX_RIGID_BODIES),
            next_id: 1,
        }
    }

    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RigidBody> {
        self.bodies.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut RigidBody> {
        self.bodies.iter_mut()
    }

    pub fn get(&self, id: u32) -> Option<&RigidBody> {
        self.bodies.iter().find(|b| b.id == id)
    }

    pub fn get_mut(&mut self, id: u32) -> Option<&mut RigidBody> {
        self.bodies.iter_mut().find(|b| b.id == id)
    }

    /// Add a body, returning its id, or `None` when the collection is full.
    pub fn add(
        &mut self,
        shape: Shape,
        position: Vec2,
        angle: f32,
        color: Option<[f32; 4]>,
    ) -> Option<u32> {
        if self.bodies.len() >= MAX_RIGID_BODIES {
            log::debug!("rigid body dropped, collection full");
            return None;
        }
        let id = self.next_id.max(1);
        self.next_id = id.wrapping_add(1);
        let color = color.unwrap_or(PALETTE[id as usize % PALETTE.len()]);
        self.bodies
            .push(RigidBody::new(id, shape, position, angle, color));
        Some(id)
    }

    pub fn remove(&mut self, id: u32) -> bool {
        let before = self.bodies.len();
        self.bodies.retain(|b| b.id != id);
        self.bodies.len() != before
    }

    pub fn clear(&mut self) {
        self.bodies.clear();
    }

    /// Penalty contacts between every body and nearby particles, then
    /// buoyancy. Adds into both particle and body accumulators.
    pub fn couple_particles(
        &mut self,
        particles: &mut Particles,
        grid: &SpatialGrid,
        particle_radius: f32,
        gravity: Vec2,
    ) {
        if self.bodies.is_empty() || particles.is_empty() {
            return;
        }
        let n = particles.len();

        let counts = self.buoyancy_counts(&particles.position[..n], grid);

        let positions = &particles.position[..n];
        let velocities = &particles.velocity[..n];
        let forces = &mut particles.force[..n];

        for (body, count) in self.bodies.iter_mut().zip(counts) {
            let reach = body.bounding_radius() + particle_radius;
            grid.for_each_within(positions, body.position, reach, |i, _, _| {
                let Some(contact) = body.contact(positions[i], particle_radius) else {
                    return;
                };
                let r = body.rotation().rotate(contact.local_point);
                let f = contact_response(&contact, velocities[i], body.velocity_at(r));
                forces[i] += f;
                body.apply_force_at(-f, r);
            });

            let g = gravity.length();
            if g > 0.0 && count > 0 {
                let fraction = (count as f32 * BUOYANCY_PER_PARTICLE).min(MAX_BUOYANCY_FRACTION);
                body.force += -gravity * (body.mass * fraction);
            }
        }
    }

    /// Particles near each body, counted in parallel (read-only).
    fn buoyancy_counts(&self, positions: &[Vec2], grid: &SpatialGrid) -> Vec<usize> {
        self.bodies
            .par_iter()
            .map(|body| {
                let mut count = 0;
                let radius = body.bounding_radius() + BUOYANCY_MARGIN;
                grid.for_each_within(positions, body.position, radius, |_, _, _| count += 1);
                count
            })
            .collect()
    }

    /// Integrate all bodies, resolve body/body overlaps, contain in domain.
    pub fn integrate(&mut self, gravity: Vec2, dt: f32, width: f32, height: f32) {
        for body in &mut self.bodies {
            body.integrate(gravity, dt);
        }
        self.resolve_body_collisions();
        for body in &mut self.bodies {
            body.contain(width, height);
        }
    }

    /// Bounding-circle overlap, mass-weighted separation, bouncy impulse.
    pub fn resolve_body_collisions(&mut self) {
        let n = self.bodies.len();
        for i in 0..n {
            for j in (i + 1)..n {
                let (left, right) = self.bodies.split_at_mut(j);
                collide_pair(&mut left[i], &mut right[0]);
            }
        }
    }
}

fn collide_pair(a: &mut RigidBody, b: &mut RigidBody) {
    let d = b.position - a.position;
    let reach = a.bounding_radius() + b.bounding_radius();
    let dist2 = d.length_squared();
    if dist2 >= reach * reach {
        return;
    }
    let dist = dist2.sqrt();
    let normal = if dist > 1e-6 { d / dist } else { Vec2::X };
    let penetration = reach - dist;

    let total = a.mass + b.mass;
    a.position -= normal * (penetration * b.mass / total);
    b.position += normal * (penetration * a.mass / total);

    let vn = (b.velocity - a.velocity).dot(normal);
    if vn < 0.0 {
        let impulse = -(1.0 + BODY_BODY_RESTITUTION) * vn / (1.0 / a.mass + 1.0 / b.mass);
        a.velocity -= normal * (impulse / a.mass);
        b.velocity += normal * (impulse / b.mass);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial::GridDims;

    #[test]
    fn test_circle_contact_normal_points_out() {
        let body = RigidBody::new(1, Shape::circle(10.0), Vec2::new(50.0, 50.0), 0.0, [1.0; 4]);
        let c = body.contact(Vec2::new(61.0, 50.0), 3.0).unwrap();
        assert!((c.penetration - 2.0).abs() < 1e-4);
        assert!((c.normal - Vec2::X).length() < 1e-5);
        assert!(body.contact(Vec2::new(70.0, 50.0), 3.0).is_none());
    }

    #[test]
    fn test_rotated_box_contact() {
        // Quarter turn: the long axis now runs along y
        let body = RigidBody::new(
            1,
            Shape::rect(40.0, 10.0),
            Vec2::ZERO,
            std::f32::consts::FRAC_PI_2,
            [1.0; 4],
        );
        assert!(body.contact(Vec2::new(0.0, 18.0), 1.0).is_some());
        assert!(body.contact(Vec2::new(18.0, 0.0), 1.0).is_none());

        let c = body.contact(Vec2::new(5.5, 0.0), 1.0).unwrap();
        assert!((c.normal - Vec2::X).length() < 1e-4, "normal {:?}", c.normal);
        assert!((c.penetration - 0.5).abs() < 1e-4);
    }

    #[test]
    fn test_box_inside_exits_nearest_face() {
        let he = Vec2::new(10.0, 5.0);
        let c = box_contact(he, Vec2::new(2.0, 4.0), 1.0).unwrap();
        assert_eq!(c.normal, Vec2::Y);
        assert!((c.penetration - 2.0).abs() < 1e-5);
    }

    #[test]
    fn test_triangle_inside_and_outside() {
        let body = RigidBody::new(1, Shape::triangle(30.0), Vec2::new(100.0, 100.0), 0.0, [1.0; 4]);
        // Centroid is inside
        let c = body.contact(Vec2::new(100.0, 100.0), 2.0).unwrap();
        assert!(c.penetration > 2.0);
        // Far away is not
        assert!(body.contact(Vec2::new(160.0, 100.0), 2.0).is_none());
        // Just below the flat bottom edge, normal points down (+y)
        let bottom = body.contact(Vec2::new(100.0, 100.0 + 30.0 * 3f32.sqrt() / 6.0 + 1.0), 2.0);
        let bottom = bottom.unwrap();
        assert!(bottom.normal.y > 0.9, "normal {:?}", bottom.normal);
    }

    #[test]
    fn test_mass_and_inertia_are_floored() {
        let tiny = RigidBody::new(1, Shape::circle(0.01), Vec2::ZERO, 0.0, [1.0; 4]);
        assert_eq!(tiny.mass, MIN_BODY_MASS);
        assert_eq!(tiny.inertia, MIN_BODY_INERTIA);
    }

    #[test]
    fn test_contact_reaction_is_equal_and_opposite() {
        let mut bodies = RigidBodies::new();
        bodies.add(Shape::circle(10.0), Vec2::new(50.0, 50.0), 0.0, None);

        let mut particles = Particles::with_capacity(4);
        particles.spawn(Vec2::new(61.0, 52.0), Vec2::ZERO);
        let dims = GridDims::for_domain(100.0, 100.0, 16.0, 1024);
        let mut grid = SpatialGrid::new(dims, 4);
        grid.rebuild(particles.positions());

        bodies.couple_particles(&mut particles, &grid, 3.0, Vec2::ZERO);
        let body = bodies.iter().next().unwrap();
        assert!(particles.force[0].length() > 0.0);
        assert!((particles.force[0] + body.force).length() < 1e-3);
    }

    /// Upward force on a circle with `k` particles on a ring just outside
    /// contact range.
    fn buoyant_force(k: usize) -> Vec2 {
        let center = Vec2::new(50.0, 50.0);
        let mut bodies = RigidBodies::new();
        bodies.add(Shape::circle(10.0), center, 0.0, None);

        let mut particles = Particles::with_capacity(256);
        for j in 0..k {
            let a = j as f32 / k as f32 * std::f32::consts::TAU;
            particles.spawn(center + Vec2::from_angle(a) * 16.0, Vec2::ZERO);
        }
        let dims = GridDims::for_domain(100.0, 100.0, 16.0, 1024);
        let mut grid = SpatialGrid::new(dims, 256);
        grid.rebuild(particles.positions());

        bodies.couple_particles(&mut particles, &grid, 3.0, Vec2::new(0.0, 1200.0));
        assert!(particles.forces().iter().all(|f| *f == Vec2::ZERO));
        let force = bodies.iter().next().unwrap().force;
        force
    }

    #[test]
    fn test_buoyancy_grows_with_nearby_particles() {
        let mass = RigidBody::new(1, Shape::circle(10.0), Vec2::ZERO, 0.0, [1.0; 4]).mass;
        let weight = mass * 1200.0;

        assert_eq!(buoyant_force(0), Vec2::ZERO);
        let few = buoyant_force(10);
        let more = buoyant_force(30);
        assert!((few.y + weight * 0.2).abs() < weight * 1e-4, "{:?}", few);
        assert!((more.y + weight * 0.6).abs() < weight * 1e-4, "{:?}", more);
        assert!(few.x.abs() < 1e-3);

        // Capped once the body is well surrounded
        let full = buoyant_force(200);
        assert!((full.y + weight * MAX_BUOYANCY_FRACTION).abs() < weight * 1e-4);
    }

    #[test]
    fn test_body_collision_separates_and_bounces() {
        let mut bodies = RigidBodies::new();
        let a = bodies.add(Shape::circle(10.0), Vec2::new(50.0, 50.0), 0.0, None).unwrap();
        let b = bodies.add(Shape::circle(10.0), Vec2::new(65.0, 50.0), 0.0, None).unwrap();
        bodies.get_mut(a).unwrap().velocity = Vec2::new(100.0, 0.0);

        bodies.resolve_body_collisions();

        let (pa, pb) = (bodies.get(a).unwrap(), bodies.get(b).unwrap());
        assert!((pb.position.x - pa.position.x) >= 20.0 - 1e-3);
        assert!(pa.velocity.x < 0.0, "a should bounce back, got {:?}", pa.velocity);
        assert!(pb.velocity.x > 0.0);
    }

    #[test]
    fn test_containment_keeps_rotated_box_inside() {
        let mut body = RigidBody::new(1, Shape::rect(40.0, 10.0), Vec2::new(5.0, 95.0), 0.7, [1.0; 4]);
        body.velocity = Vec2::new(-50.0, 80.0);
        body.contain(100.0, 100.0);
        let (min, max) = body.shape.aabb(body.angle);
        assert!(body.position.x + min.x >= -1e-4);
        assert!(body.position.y + max.y <= 100.0 + 1e-4);
        assert!(body.velocity.x > 0.0 && body.velocity.y < 0.0);
    }

    #[test]
    fn test_capacity_drops_extra_bodies() {
        let mut bodies = RigidBodies::new();
        for _ in 0..MAX_RIGID_BODIES {
            assert!(bodies.add(Shape::circle(5.0), Vec2::ZERO, 0.0, None).is_some());
        }
        assert!(bodies.add(Shape::circle(5.0), Vec2::ZERO, 0.0, None).is_none());
        assert_eq!(bodies.len(), MAX_RIGID_BODIES);
    }
}
