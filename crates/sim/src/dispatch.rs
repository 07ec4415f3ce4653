//! Picks the execution model once per session and runs the two SPH phases.
//!
//! Parallel when a worker pool starts, serial otherwise. The first worker
//! failure drops the pool for good; the substep that failed is recomputed
//! serially so the caller never sees a partial result.

use crate::config::{ExecutionMode, KernelParams};
use crate::particle::Particles;
use crate::pool::{default_worker_count, WorkerPool};
use crate::spatial::SpatialGrid;
use crate::sph::{SerialSolver, SqrtLut};
use std::time::Duration;

/// Which path is producing the fields. Reported with every frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecutionModel {
    Parallel { workers: usize },
    Serial,
}

impl ExecutionModel {
    pub fn is_parallel(&self) -> bool {
        matches!(self, ExecutionModel::Parallel { .. })
    }

    pub fn worker_count(&self) -> usize {
        match self {
            ExecutionModel::Parallel { workers } => *workers,
            ExecutionModel::Serial => 0,
        }
    }
}

pub struct Dispatcher {
    pool: Option<WorkerPool>,
    serial: SerialSolver,
    lut: SqrtLut,
}

impl Dispatcher {
    pub fn new(mode: ExecutionMode, h: f32, startup_timeout: Duration) -> Self {
        Self::with_ready_delay(mode, h, startup_timeout, Duration::ZERO)
    }

    /// `new`, with pool workers slow to report ready.
    #[doc(hidden)]
    pub fn with_ready_delay(
        mode: ExecutionMode,
        h: f32,
        startup_timeout: Duration,
        ready_delay: Duration,
    ) -> Self {
        let workers = match mode {
            ExecutionMode::Serial => None,
            ExecutionMode::Auto => Some(default_worker_count()),
            ExecutionMode::Parallel { workers } => Some(workers),
        };

        let pool = workers.and_then(|n| {
            match WorkerPool::start_with_ready_delay(n, h, startup_timeout, ready_delay) {
                Ok(pool) => Some(pool),
                Err(e) => {
                    log::error!("worker pool unavailable, running serial: {}", e);
                    None
                }
            }
        });

        Self {
            pool,
            serial: SerialSolver::new(),
            lut: SqrtLut::new(h),
        }
    }

    pub fn serial(h: f32) -> Self {
        Self::new(ExecutionMode::Serial, h, Duration::ZERO)
    }

    pub fn execution_model(&self) -> ExecutionModel {
        match &self.pool {
            Some(pool) => ExecutionModel::Parallel {
                workers: pool.worker_count(),
            },
            None => ExecutionModel::Serial,
        }
    }

    pub fn lut(&self) -> &SqrtLut {
        &self.lut
    }

    #[doc(hidden)]
    pub fn pool(&self) -> Option<&WorkerPool> {
        self.pool.as_ref()
    }

    /// Density, pressure and SPH force for every particle. `grid` must have
    /// been rebuilt from the current positions.
    pub fn compute_fields(
        &mut self,
        particles: &mut Particles,
        grid: &SpatialGrid,
        params: &KernelParams,
    ) {
        if let Some(pool) = self.pool.as_mut() {
            match pool.compute(particles, grid, params) {
                Ok(()) => return,
                Err(e) => {
                    log::error!("parallel pass failed, switching to serial for good: {}", e);
                    self.pool = None;
                }
            }
        }

        self.serial.density_pass(particles, grid, &self.lut, params);
        self.serial.force_pass(particles, params);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::MAX_GRID_CELLS;
    use crate::spatial::GridDims;
    use glam::Vec2;

    #[test]
    fn test_serial_mode_reports_serial() {
        let dispatcher = Dispatcher::serial(16.0);
        assert_eq!(dispatcher.execution_model(), ExecutionModel::Serial);
    }

    #[test]
    fn test_startup_timeout_falls_back_to_serial() {
        let mut dispatcher = Dispatcher::with_ready_delay(
            ExecutionMode::Parallel { workers: 2 },
            16.0,
            Duration::from_millis(20),
            Duration::from_millis(500),
        );
        assert_eq!(dispatcher.execution_model(), ExecutionModel::Serial);
        assert!(dispatcher.pool().is_none());

        let mut particles = Particles::with_capacity(4);
        particles.spawn(Vec2::new(40.0, 40.0), Vec2::ZERO);
        particles.spawn(Vec2::new(45.0, 40.0), Vec2::ZERO);
        let dims = GridDims::for_domain(100.0, 100.0, 16.0, MAX_GRID_CELLS);
        let mut grid = SpatialGrid::new(dims, 4);
        grid.rebuild(particles.positions());
        dispatcher.compute_fields(&mut particles, &grid, &KernelParams::default());
        assert!(particles.density[0] > 1.0);
    }

    #[test]
    fn test_worker_fault_downgrades_permanently() {
        let mut dispatcher = Dispatcher::new(
            ExecutionMode::Parallel { workers: 2 },
            16.0,
            Duration::from_secs(5),
        );
        assert!(dispatcher.execution_model().is_parallel());

        let mut particles = Particles::with_capacity(16);
        particles.spawn(Vec2::new(40.0, 40.0), Vec2::ZERO);
        particles.spawn(Vec2::new(45.0, 40.0), Vec2::ZERO);
        let dims = GridDims::for_domain(100.0, 100.0, 16.0, MAX_GRID_CELLS);
        let mut grid = SpatialGrid::new(dims, 16);
        grid.rebuild(particles.positions());

        dispatcher.pool().unwrap().inject_fault();
        dispatcher.compute_fields(&mut particles, &grid, &KernelParams::default());

        assert_eq!(dispatcher.execution_model(), ExecutionModel::Serial);
        // The failed substep was still computed
        assert!(particles.density[0] > 1.0);
        assert_ne!(particles.force[0].x, 0.0);
    }
}
