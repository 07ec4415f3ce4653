//! Cosmetic spray. Never read by the solver, only drawn.

use crate::constants::{FOAM_DRAG, FOAM_GRAVITY_SCALE, FOAM_LIFETIME, MAX_FOAM};
use glam::Vec2;
use rand::Rng;

/// Foam pool, struct of arrays like [`crate::Particles`]. Always serial.
#[derive(Clone, Debug, Default)]
pub struct Foam {
    pub position: Vec<Vec2>,
    pub velocity: Vec<Vec2>,
    /// Seconds left; removed at zero
    pub life: Vec<f32>,
    /// 0 = fine mist .. 2 = big blob
    pub size: Vec<u8>,
}

impl Foam {
    pub fn new() -> Self {
        Self {
            position: Vec::with_capacity(MAX_FOAM),
            velocity: Vec::with_capacity(MAX_FOAM),
            life: Vec::with_capacity(MAX_FOAM),
            size: Vec::with_capacity(MAX_FOAM),
        }
    }

    pub fn len(&self) -> usize {
        self.position.len()
    }

    pub fn is_empty(&self) -> bool {
        self.position.is_empty()
    }

    pub fn clear(&mut self) {
        self.position.clear();
        self.velocity.clear();
        self.life.clear();
        self.size.clear();
    }

    /// Spawn one foam particle with a randomized lifetime and size. Dropped
    /// when the pool is full.
    pub fn spawn(&mut self, rng: &mut impl Rng, position: Vec2, velocity: Vec2) -> bool {
        if self.len() >= MAX_FOAM {
            return false;
        }
        self.position.push(position);
        self.velocity.push(velocity);
        self.life.push(FOAM_LIFETIME * rng.gen_range(0.5..1.0));
        self.size.push(rng.gen_range(0..3));
        true
    }

    /// A small burst spreading around `velocity`.
    pub fn splash(&mut self, rng: &mut impl Rng, position: Vec2, velocity: Vec2, count: usize) {
        for _ in 0..count {
            let spread = Vec2::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..0.2));
            let v = velocity * rng.gen_range(0.2..0.6) + spread * velocity.length() * 0.3;
            if !self.spawn(rng, position, v) {
                break;
            }
        }
    }

    /// Age, drift and cull. Called once per frame.
    pub fn update(&mut self, dt: f32, gravity: Vec2, width: f32, height: f32) {
        let mut i = 0;
        while i < self.len() {
            self.life[i] -= dt;
            self.velocity[i] = (self.velocity[i] + gravity * FOAM_GRAVITY_SCALE * dt) * FOAM_DRAG;
            self.position[i] += self.velocity[i] * dt;

            let p = self.position[i];
            let outside = p.x < 0.0 || p.y < 0.0 || p.x > width || p.y > height;
            if self.life[i] <= 0.0 || outside {
                self.position.swap_remove(i);
                self.velocity.swap_remove(i);
                self.life.swap_remove(i);
                self.size.swap_remove(i);
            } else {
                i += 1;
            }
        }
    }
}
