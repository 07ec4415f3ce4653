//! Headless run of the full scene: dam break, a few bodies, an emitter and
//! a drain. Prints throughput and the execution model.
//!
//! Run with: RUST_LOG=info cargo run --release --example headless -p sph2d
//! Serial path: cargo run --release --example headless -p sph2d -- serial
//! With a config file: cargo run --release --example headless -p sph2d -- path/to/config.json

use glam::Vec2;
use sph2d::{Command, ExecutionMode, FrameData, Shape, SimConfig, SimulationWorld, ToolKind};
use std::path::Path;
use std::time::Instant;

fn main() {
    env_logger::init();

    const FRAMES: usize = 600; // 10 seconds at 60 FPS
    const DT: f32 = 1.0 / 60.0;

    let mut config = SimConfig::default();
    match std::env::args().nth(1).as_deref() {
        Some("serial") => config.execution = ExecutionMode::Serial,
        Some(path) => match SimConfig::load_json(Path::new(path)) {
            Ok(loaded) => config = loaded,
            Err(e) => log::error!("could not load {}: {}, using defaults", path, e),
        },
        None => {}
    }

    let (width, height) = (config.width, config.height);
    let mut world = SimulationWorld::new(config);

    world.queue(Command::Init { width, height });
    world.queue(Command::AddRigidBody {
        shape: Shape::rect(60.0, 30.0),
        position: Vec2::new(width * 0.7, height * 0.3),
        angle: 0.2,
        color: None,
    });
    world.queue(Command::AddRigidBody {
        shape: Shape::circle(20.0),
        position: Vec2::new(width * 0.55, height * 0.2),
        angle: 0.0,
        color: None,
    });
    world.queue(Command::AddEmitter {
        position: Vec2::new(width * 0.9, height * 0.15),
        angle: std::f32::consts::PI,
        speed: 300.0,
        rate: 120.0,
    });
    world.queue(Command::AddDrain {
        position: Vec2::new(width * 0.95, height * 0.95),
        radius: 30.0,
    });
    world.queue(Command::AddWall {
        a: Vec2::new(width * 0.4, height * 0.6),
        b: Vec2::new(width * 0.6, height * 0.7),
    });
    world.queue(Command::SetTool {
        tool: ToolKind::Vortex,
        strength: None,
    });

    println!(
        "Running {} frames, {} particles, {:?}",
        FRAMES,
        world.config().initial_particles,
        world.execution_model()
    );

    let mut frame = FrameData::default();
    let start = Instant::now();

    for n in 0..FRAMES {
        // Stir the middle of the tank for a second
        if n == 180 {
            world.queue(Command::Pointer {
                position: Vec2::new(width * 0.3, height * 0.8),
                active: true,
            });
        }
        if n == 240 {
            world.queue(Command::Pointer {
                position: Vec2::new(width * 0.3, height * 0.8),
                active: false,
            });
            world.queue(Command::ExplosionAt {
                position: Vec2::new(width * 0.2, height * 0.9),
            });
        }

        world.step(DT);
        world.write_frame(&mut frame);

        if n % 60 == 0 {
            println!(
                "  Frame {}: {} particles, {} foam, {:.0} particle-substeps/s",
                n,
                frame.particle_count,
                frame.foam_positions.len(),
                frame.throughput
            );
        }
    }

    let elapsed = start.elapsed();
    let avg_frame_time = elapsed.as_secs_f64() / FRAMES as f64;

    println!("\n=== Results ===");
    println!("Execution: {:?}", frame.execution);
    println!("Total time: {:.2?}", elapsed);
    println!("Avg frame time: {:.2}ms", avg_frame_time * 1000.0);
    println!("Effective FPS: {:.1}", 1.0 / avg_frame_time);
    println!("Final particles: {}", frame.particle_count);
    for body in &frame.bodies {
        println!(
            "  body {} at ({:.1}, {:.1}) angle {:.2}",
            body.id, body.position[0], body.position[1], body.angle
        );
    }
}
