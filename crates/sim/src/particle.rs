//! Fluid particles as a fixed-capacity structure of arrays.
//!
//! Every array is allocated once at [`MAX_PARTICLES`] and only the prefix
//! `0..len()` is meaningful. Removal is swap-with-last, so indices are not
//! stable across drains.

use crate::constants::MAX_PARTICLES;
use glam::Vec2;

#[derive(Clone, Debug)]
pub struct Particles {
    count: usize,
    pub position: Vec<Vec2>,
    pub velocity: Vec<Vec2>,
    /// Force accumulator, rebuilt every substep
    pub force: Vec<Vec2>,
    pub density: Vec<f32>,
    pub near_density: Vec<f32>,
    pub pressure: Vec<f32>,
    pub near_pressure: Vec<f32>,
    /// Frozen particles keep their place and act as static obstacles
    pub frozen: Vec<bool>,
    /// Seconds until portals may move this particle again
    pub teleport_cooldown: Vec<f32>,
}

impl Default for Particles {
    fn default() -> Self {
        Self::new()
    }
}

impl Particles {
    pub fn new() -> Self {
        Self::with_capacity(MAX_PARTICLES)
    }

    /// Smaller pools for tests and tools; the cap is still hard.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            count: 0,
            position: vec![Vec2::ZERO; capacity],
            velocity: vec![Vec2::ZERO; capacity],
            force: vec![Vec2::ZERO; capacity],
            density: vec![1.0; capacity],
            near_density: vec![1.0; capacity],
            pressure: vec![0.0; capacity],
            near_pressure: vec![0.0; capacity],
            frozen: vec![false; capacity],
            teleport_cooldown: vec![0.0; capacity],
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.count
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.position.len()
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.count >= self.capacity()
    }

    /// Append a particle. Returns false (and drops it) when full.
    pub fn spawn(&mut self, position: Vec2, velocity: Vec2) -> bool {
        if self.is_full() {
            return false;
        }
        let i = self.count;
        self.position[i] = position;
        self.velocity[i] = velocity;
        self.force[i] = Vec2::ZERO;
        self.density[i] = 1.0;
        self.near_density[i] = 1.0;
        self.pressure[i] = 0.0;
        self.near_pressure[i] = 0.0;
        self.frozen[i] = false;
        self.teleport_cooldown[i] = 0.0;
        self.count += 1;
        true
    }

    /// Remove particle `i` by moving the last particle into its slot.
    pub fn swap_remove(&mut self, i: usize) {
        debug_assert!(i < self.count);
        if i >= self.count {
            return;
        }
        let last = self.count - 1;
        if i != last {
            self.position[i] = self.position[last];
            self.velocity[i] = self.velocity[last];
            self.force[i] = self.force[last];
            self.density[i] = self.density[last];
            self.near_density[i] = self.near_density[last];
            self.pressure[i] = self.pressure[last];
            self.near_pressure[i] = self.near_pressure[last];
            self.frozen[i] = self.frozen[last];
            self.teleport_cooldown[i] = self.teleport_cooldown[last];
        }
        self.count = last;
    }

    /// Remove every particle matching `pred`, returning how many went.
    pub fn remove_where(&mut self, mut pred: impl FnMut(Vec2) -> bool) -> usize {
        let before = self.count;
        let mut i = 0;
        while i < self.count {
            if pred(self.position[i]) {
                // Re-test slot i, it now holds the old last particle
                self.swap_remove(i);
            } else {
                i += 1;
            }
        }
        before - self.count
    }

    pub fn clear(&mut self) {
        self.count = 0;
    }

    pub fn clear_forces(&mut self) {
        self.force[..self.count].fill(Vec2::ZERO);
    }

    pub fn positions(&self) -> &[Vec2] {
        &self.position[..self.count]
    }

    pub fn velocities(&self) -> &[Vec2] {
        &self.velocity[..self.count]
    }

    pub fn densities(&self) -> &[f32] {
        &self.density[..self.count]
    }

    pub fn forces(&self) -> &[Vec2] {
        &self.force[..self.count]
    }

    /// Set or clear the frozen flag on every particle within `radius`.
    pub fn set_frozen_within(&mut self, center: Vec2, radius: f32, frozen: bool) -> usize {
        let r2 = radius * radius;
        let mut touched = 0;
        for i in 0..self.count {
            if self.position[i].distance_squared(center) <= r2 {
                self.frozen[i] = frozen;
                if frozen {
                    self.velocity[i] = Vec2::ZERO;
                }
                touched += 1;
            }
        }
        touched
    }
}
