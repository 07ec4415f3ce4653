//! Particle bookkeeping through whole world steps: capacity, drains,
//! portals, freezing and domain containment.

use glam::Vec2;
use proptest::prelude::*;
use sph2d::constants::{MAX_GRID_CELLS, MAX_PARTICLES};
use sph2d::{
    Command, ExecutionMode, ExecutionModel, GridDims, Particles, SimConfig, SimulationWorld,
    SpatialGrid,
};

const DT: f32 = 1.0 / 60.0;

fn world(width: f32, height: f32, initial: usize) -> SimulationWorld {
    let config = SimConfig {
        width,
        height,
        initial_particles: initial,
        execution: ExecutionMode::Serial,
        ..Default::default()
    };
    let mut world = SimulationWorld::new(config);
    world.init(width, height);
    world
}

#[test]
fn test_boundary_containment_2000_particles() {
    let mut world = world(640.0, 480.0, 2000);
    assert_eq!(world.particles().len(), 2000);

    for frame in 0..180 {
        world.step(DT);
        if frame % 30 == 0 {
            eprintln!("frame {}: {} particles", frame, world.particles().len());
        }
    }

    let r = world.config().particle_radius;
    assert_eq!(world.particles().len(), 2000, "no particle may be lost");
    for (i, p) in world.particles().positions().iter().enumerate() {
        assert!(p.is_finite(), "particle {} not finite", i);
        assert!(
            p.x >= r && p.x <= 640.0 - r && p.y >= r && p.y <= 480.0 - r,
            "particle {} escaped to {:?}",
            i,
            p
        );
    }
    for v in world.particles().velocities() {
        assert!(v.length() <= world.config().max_speed + 1.0);
    }
}

#[test]
fn test_worker_pool_world_matches_serial_and_stays_contained() {
    let config = |execution| SimConfig {
        width: 400.0,
        height: 300.0,
        initial_particles: 1500,
        execution,
        ..Default::default()
    };
    let mut serial = SimulationWorld::new(config(ExecutionMode::Serial));
    let mut parallel = SimulationWorld::new(config(ExecutionMode::Parallel { workers: 2 }));
    serial.init(400.0, 300.0);
    parallel.init(400.0, 300.0);
    assert_eq!(parallel.execution_model(), ExecutionModel::Parallel { workers: 2 });
    assert_eq!(serial.particles().positions(), parallel.particles().positions());

    serial.substep(DT / 4.0);
    parallel.substep(DT / 4.0);
    for i in 0..serial.particles().len() {
        let (a, b) = (serial.particles().density[i], parallel.particles().density[i]);
        assert!((a - b).abs() <= 1e-4 * a.abs().max(1.0), "density {}: {} vs {}", i, a, b);
    }

    for _ in 0..60 {
        parallel.step(DT);
    }
    assert!(parallel.execution_model().is_parallel(), "pool was dropped");
    let r = parallel.config().particle_radius;
    assert_eq!(parallel.particles().len(), 1500);
    for p in parallel.particles().positions() {
        assert!(p.is_finite());
        assert!(p.x >= r && p.x <= 400.0 - r && p.y >= r && p.y <= 300.0 - r, "escaped to {:?}", p);
    }
}

#[test]
fn test_drain_removes_exactly_captured_particles() {
    let mut world = world(400.0, 300.0, 0);
    world.set_params(sph2d::FluidParams {
        gravity: Vec2::ZERO,
        ..fluid_defaults()
    });

    // Two clusters far apart; the drain sits on the first one only
    world.add_particles(16, Vec2::new(80.0, 80.0));
    world.add_particles(16, Vec2::new(300.0, 200.0));
    let captured = world
        .particles()
        .positions()
        .iter()
        .filter(|p| p.distance(Vec2::new(80.0, 80.0)) < 30.0)
        .count();
    assert_eq!(captured, 16);

    let survivors: Vec<Vec2> = world.particles().positions()[16..].to_vec();
    world.add_drain(Vec2::new(80.0, 80.0), 30.0);
    world.substep(1e-4);

    assert_eq!(world.particles().len(), 32 - captured);
    // Survivors are untouched apart from one tiny substep of motion
    for p in world.particles().positions() {
        assert!(survivors.iter().any(|s| s.distance(*p) < 0.5));
    }
}

fn fluid_defaults() -> sph2d::FluidParams {
    let config = SimConfig::default();
    sph2d::FluidParams {
        gravity: Vec2::from(config.gravity),
        gas_const: config.gas_const,
        near_gas_const: config.near_gas_const,
        viscosity: config.viscosity,
        surface_tension: config.surface_tension,
    }
}

#[test]
fn test_teleport_relocates_and_sets_cooldown() {
    let mut world = world(600.0, 400.0, 0);
    world.set_params(sph2d::FluidParams {
        gravity: Vec2::ZERO,
        ..fluid_defaults()
    });
    let a = Vec2::new(100.0, 100.0);
    let b = Vec2::new(450.0, 300.0);
    world.add_portal_pair(a, b, 20.0);

    let start = a + Vec2::new(4.0, -3.0);
    world.particles_mut().spawn(start, Vec2::ZERO);
    world.substep(1e-4);

    let p = world.particles().position[0];
    assert!(p.distance(b + (start - a)) < 0.01, "landed at {:?}", p);
    assert!(world.particles().teleport_cooldown[0] > 0.0);

    // Still inside mouth B, but the cooldown stops it bouncing straight back
    world.substep(1e-4);
    assert!(world.particles().position[0].distance(b) < 20.0);
}

#[test]
fn test_frozen_particles_do_not_move() {
    let mut world = world(400.0, 300.0, 300);
    let frozen = world.freeze_at(Vec2::new(60.0, 280.0), 20.0);
    assert!(frozen > 0);

    let before: Vec<(usize, Vec2)> = (0..world.particles().len())
        .filter(|&i| world.particles().frozen[i])
        .map(|i| (i, world.particles().position[i]))
        .collect();

    for _ in 0..20 {
        world.step(DT);
    }
    for &(i, p) in &before {
        assert_eq!(world.particles().position[i], p);
        assert_eq!(world.particles().velocity[i], Vec2::ZERO);
    }

    // Neighbors may have drifted into the circle too
    let thawed = world.thaw_at(Vec2::new(60.0, 280.0), 20.0);
    assert!(thawed >= frozen);
    assert!(before.iter().all(|&(i, _)| !world.particles().frozen[i]));
}

#[test]
fn test_emitter_fills_to_capacity_and_stops() {
    let mut world = world(1280.0, 720.0, 0);
    let cols = 200;
    for k in 0..MAX_PARTICLES - 50 {
        let p = Vec2::new(10.0 + (k % cols) as f32 * 6.0, 710.0 - (k / cols) as f32 * 6.0);
        assert!(world.particles_mut().spawn(p, Vec2::ZERO));
    }
    world.queue(Command::AddEmitter {
        position: Vec2::new(900.0, 100.0),
        angle: 0.0,
        speed: 100.0,
        rate: 6000.0,
    });
    // 100 due per frame, only 50 fit
    world.step(DT);
    assert_eq!(world.particles().len(), MAX_PARTICLES);
    assert_eq!(world.add_particles(10, Vec2::new(600.0, 300.0)), 0);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Count stays within [0, capacity] whatever mix of spawns and removals.
    #[test]
    fn prop_count_stays_in_bounds(ops in prop::collection::vec((any::<bool>(), 0usize..40), 1..60)) {
        let capacity = 64;
        let mut particles = Particles::with_capacity(capacity);
        let mut expected = 0usize;
        for (spawn, k) in ops {
            if spawn {
                for j in 0..k {
                    let ok = particles.spawn(Vec2::new(j as f32, k as f32), Vec2::ZERO);
                    prop_assert_eq!(ok, expected < capacity);
                    if ok {
                        expected += 1;
                    }
                }
            } else {
                let removed = particles.remove_where(|p| (p.x as usize) < k);
                prop_assert!(removed <= expected);
                expected -= removed;
            }
            prop_assert_eq!(particles.len(), expected);
            prop_assert!(particles.len() <= capacity);
        }
    }

    /// Rebuilding from the same positions gives the same lists.
    #[test]
    fn prop_grid_rebuild_is_idempotent(
        points in prop::collection::vec((0.0f32..300.0, 0.0f32..200.0), 0..300)
    ) {
        let positions: Vec<Vec2> = points.iter().map(|&(x, y)| Vec2::new(x, y)).collect();
        let dims = GridDims::for_domain(300.0, 200.0, 16.0, MAX_GRID_CELLS);
        let mut grid = SpatialGrid::new(dims, 512);

        grid.rebuild(&positions);
        let heads = grid.cell_head.clone();
        let next = grid.particle_next[..positions.len()].to_vec();

        grid.rebuild(&positions);
        prop_assert_eq!(&grid.cell_head, &heads);
        prop_assert_eq!(&grid.particle_next[..positions.len()], &next[..]);
    }

    /// Every particle within H shows up as a neighbor, never itself.
    #[test]
    fn prop_neighbors_cover_kernel_radius(
        points in prop::collection::vec((0.0f32..200.0, 0.0f32..200.0), 2..150)
    ) {
        let positions: Vec<Vec2> = points.iter().map(|&(x, y)| Vec2::new(x, y)).collect();
        let dims = GridDims::for_domain(200.0, 200.0, 16.0, MAX_GRID_CELLS);
        let mut grid = SpatialGrid::new(dims, 256);
        grid.rebuild(&positions);

        let found = grid.neighbors(&positions, 0, 16.0);
        for (j, p) in positions.iter().enumerate().skip(1) {
            if p.distance(positions[0]) < 16.0 {
                prop_assert!(found.contains(&j), "missing neighbor {}", j);
            }
        }
        prop_assert!(!found.contains(&0));
    }
}
