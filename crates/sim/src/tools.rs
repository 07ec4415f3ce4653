//! Pointer-driven force fields applied during integration.

use crate::constants::{TOOL_ACCEL, TOOL_RADIUS};
use glam::Vec2;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ToolKind {
    #[default]
    None,
    Push,
    Vortex,
    Wind,
    Attractor,
    /// Point-mass pull toward the pointer, stronger up close
    LocalGravity,
}

/// Active tool parameters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Tool {
    pub kind: ToolKind,
    pub radius: f32,
    pub strength: f32,
}

impl Default for Tool {
    fn default() -> Self {
        Self::new(ToolKind::None, None)
    }
}

impl Tool {
    pub fn new(kind: ToolKind, strength: Option<f32>) -> Self {
        Self {
            kind,
            radius: TOOL_RADIUS,
            strength: strength.unwrap_or(1.0).max(0.0),
        }
    }

    /// Acceleration at `p` for the current pointer. Zero outside the radius
    /// or when the pointer is up.
    pub fn acceleration(&self, pointer: &Pointer, p: Vec2) -> Vec2 {
        if !pointer.active || self.kind == ToolKind::None {
            return Vec2::ZERO;
        }
        let d = p - pointer.position;
        let dist = d.length();
        if dist >= self.radius {
            return Vec2::ZERO;
        }
        let falloff = 1.0 - dist / self.radius;
        let outward = if dist > 1e-4 { d / dist } else { Vec2::ZERO };
        let accel = TOOL_ACCEL * self.strength;

        match self.kind {
            ToolKind::None => Vec2::ZERO,
            ToolKind::Push => outward * accel * falloff,
            ToolKind::Attractor => -outward * accel * falloff,
            // Mostly tangential with a little inward pull to keep the swirl tight
            ToolKind::Vortex => (outward.perp() - outward * 0.2) * accel * falloff,
            ToolKind::Wind => pointer.direction * accel * 0.6 * falloff,
            ToolKind::LocalGravity => {
                let softened = (dist * dist + 100.0) / (self.radius * self.radius);
                -outward * (accel * 0.05 / softened).min(accel * 2.0)
            }
        }
    }
}

/// Pointer state fed in by the host.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Pointer {
    pub position: Vec2,
    pub active: bool,
    /// Smoothed unit direction of recent motion, used by wind
    pub direction: Vec2,
}

impl Default for Pointer {
    fn default() -> Self {
        Self {
            position: Vec2::ZERO,
            active: false,
            direction: Vec2::X,
        }
    }
}

impl Pointer {
    pub fn move_to(&mut self, position: Vec2, active: bool) {
        let delta = position - self.position;
        // Ignore the jump when a drag starts somewhere new
        if self.active && active && delta.length_squared() > 0.25 {
            let blended = self.direction * 0.7 + delta.normalize() * 0.3;
            self.direction = blended.try_normalize().unwrap_or(self.direction);
        }
        self.position = position;
        self.active = active;
    }
}
