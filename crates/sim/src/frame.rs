//! Per-frame output for a renderer. Buffers are reused between frames.

use crate::boat::Boat;
use crate::dispatch::ExecutionModel;
use crate::rigid::RigidBody;
use bytemuck::{Pod, Zeroable};
use glam::Vec2;
use std::time::Instant;

/// One rigid body, laid out for direct upload as instance data.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Default, Debug, PartialEq)]
pub struct RigidBodyInstance {
    pub position: [f32; 2],
    pub angle: f32,
    /// 0 box, 1 circle, 2 triangle
    pub kind: u32,
    pub dims: [f32; 6],
    pub id: u32,
    pub _pad: u32,
    pub color: [f32; 4],
}

impl From<&RigidBody> for RigidBodyInstance {
    fn from(body: &RigidBody) -> Self {
        Self {
            position: body.position.to_array(),
            angle: body.angle,
            kind: body.shape.kind(),
            dims: body.shape.dims(),
            id: body.id,
            _pad: 0,
            color: body.color,
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Default, Debug, PartialEq)]
pub struct BoatPose {
    pub position: [f32; 2],
    pub angle: f32,
    pub speed: f32,
    pub half_extents: [f32; 2],
    pub throttle: f32,
    pub _pad: f32,
}

impl From<&Boat> for BoatPose {
    fn from(boat: &Boat) -> Self {
        let half = match boat.shape {
            crate::rigid::Shape::Box { half_extents } => half_extents,
            _ => Vec2::ZERO,
        };
        Self {
            position: boat.position.to_array(),
            angle: boat.angle,
            speed: boat.velocity.length(),
            half_extents: half.to_array(),
            throttle: boat.controls.throttle,
            _pad: 0.0,
        }
    }
}

#[derive(Clone, Debug)]
pub struct FrameData {
    pub particle_count: usize,
    pub positions: Vec<Vec2>,
    pub velocities: Vec<Vec2>,
    pub densities: Vec<f32>,

    pub foam_positions: Vec<Vec2>,
    /// Remaining life as a 0..1 fraction, for fading
    pub foam_life: Vec<f32>,
    pub foam_size: Vec<u8>,

    pub bodies: Vec<RigidBodyInstance>,
    pub boat: Option<BoatPose>,

    /// Particle-substeps per second, smoothed
    pub throughput: f32,
    pub execution: ExecutionModel,
}

impl Default for FrameData {
    fn default() -> Self {
        Self {
            particle_count: 0,
            positions: Vec::new(),
            velocities: Vec::new(),
            densities: Vec::new(),
            foam_positions: Vec::new(),
            foam_life: Vec::new(),
            foam_size: Vec::new(),
            bodies: Vec::new(),
            boat: None,
            throughput: 0.0,
            execution: ExecutionModel::Serial,
        }
    }
}

impl FrameData {
    /// Instance bytes for upload.
    pub fn body_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.bodies)
    }
}

/// Exponentially smoothed particle-substeps per second.
#[derive(Clone, Debug)]
pub struct Throughput {
    last: Option<Instant>,
    rate: f32,
}

impl Default for Throughput {
    fn default() -> Self {
        Self::new()
    }
}

impl Throughput {
    const SMOOTHING: f32 = 0.1;

    pub fn new() -> Self {
        Self {
            last: None,
            rate: 0.0,
        }
    }

    /// Record a finished step of `work` particle-substeps.
    pub fn record(&mut self, work: usize) {
        let now = Instant::now();
        if let Some(last) = self.last {
            let secs = now.duration_since(last).as_secs_f32();
            if secs > 0.0 {
                let sample = work as f32 / secs;
                self.rate += (sample - self.rate) * Self::SMOOTHING;
            }
        }
        self.last = Some(now);
    }

    pub fn rate(&self) -> f32 {
        self.rate
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rigid::Shape;

    #[test]
    fn test_instance_layout_is_tightly_packed() {
        assert_eq!(std::mem::size_of::<RigidBodyInstance>(), 64);
        assert_eq!(std::mem::size_of::<BoatPose>(), 32);
    }

    #[test]
    fn test_instance_from_body() {
        let body = RigidBody::new(7, Shape::rect(20.0, 10.0), Vec2::new(1.0, 2.0), 0.5, [1.0, 0.0, 0.0, 1.0]);
        let inst = RigidBodyInstance::from(&body);
        assert_eq!(inst.position, [1.0, 2.0]);
        assert_eq!(inst.kind, 0);
        assert_eq!(inst.dims[..2], [10.0, 5.0]);
        assert_eq!(inst.id, 7);

        let frame = FrameData {
            bodies: vec![inst],
            ..Default::default()
        };
        assert_eq!(frame.body_bytes().len(), 64);
    }

    #[test]
    fn test_throughput_needs_two_samples() {
        let mut t = Throughput::new();
        t.record(1000);
        assert_eq!(t.rate(), 0.0);
        std::thread::sleep(std::time::Duration::from_millis(2));
        t.record(1000);
        assert!(t.rate() > 0.0);
    }
}
