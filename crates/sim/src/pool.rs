//! Fixed worker pool for the density and force passes.
//!
//! Protocol, one substep:
//! 1. coordinator uploads positions, velocities and grid lists into the
//!    shared region (workers are parked, nobody else is touching it)
//! 2. `run_phase(Density)`: store task + count + grid dims, zero the
//!    completion counter, bump the phase counter and wake everyone, then block
//!    until the completion counter reaches the worker count
//! 3. `run_phase(Force)`: same barrier, workers now read the densities every
//!    other worker finalized in phase 1
//! 4. coordinator copies density/pressure/force back out
//!
//! Each worker owns a fixed contiguous slice of `[0, MAX_PARTICLES)` chosen at
//! startup and only ever writes indices in that slice. All shared fields are
//! atomics loaded/stored `Relaxed`; ordering comes from the phase and
//! completion counters (release on publish, acquire on observe).

use crate::config::KernelParams;
use crate::constants::{EMPTY, MAX_GRID_CELLS, MAX_PARTICLES};
use crate::particle::Particles;
use crate::spatial::{CellLists, GridDims, SpatialGrid};
use crate::sph::{gather_density, gather_force, ParticleFields, SqrtLut};
use glam::Vec2;
use parking_lot::{Condvar, Mutex};
use std::ops::Range;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Smallest and largest pool the coordinator will start.
pub const MIN_WORKERS: usize = 2;
pub const MAX_WORKERS: usize = 10;

#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("only {ready} of {expected} workers ready after {timeout:?}")]
    StartupTimeout {
        ready: usize,
        expected: usize,
        timeout: Duration,
    },
    #[error("a worker panicked during the {0:?} phase")]
    WorkerPanicked(Task),
}

/// What the workers run on the next phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Task {
    Idle = 0,
    Density = 1,
    Force = 2,
}

impl Task {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Task::Density,
            2 => Task::Force,
            _ => Task::Idle,
        }
    }
}

/// Workers for a machine: cores minus two (UI + coordinator), clamped.
pub fn default_worker_count() -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    cores.saturating_sub(2).clamp(MIN_WORKERS, MAX_WORKERS)
}

/// Static slice of the particle index space owned by worker `w`.
pub fn worker_slice(w: usize, workers: usize, capacity: usize) -> Range<usize> {
    let chunk = capacity.div_ceil(workers.max(1));
    let start = (w * chunk).min(capacity);
    let end = (start + chunk).min(capacity);
    start..end
}

// =============================================================================
// SHARED REGION
// =============================================================================

/// f32 array stored as bit patterns so it can be shared without locks.
struct AtomicF32Buffer(Box<[AtomicU32]>);

impl AtomicF32Buffer {
    fn new(len: usize) -> Self {
        Self((0..len).map(|_| AtomicU32::new(0)).collect())
    }

    #[inline]
    fn load(&self, i: usize) -> f32 {
        f32::from_bits(self.0[i].load(Ordering::Relaxed))
    }

    #[inline]
    fn store(&self, i: usize, v: f32) {
        self.0[i].store(v.to_bits(), Ordering::Relaxed);
    }
}

fn atomic_u32_buffer(len: usize) -> Box<[AtomicU32]> {
    (0..len).map(|_| AtomicU32::new(EMPTY)).collect()
}

struct ControlBlock {
    phase: AtomicU64,
    completed: AtomicUsize,
    ready: AtomicUsize,
    particle_count: AtomicUsize,
    task: AtomicU8,
    grid_cols: AtomicUsize,
    grid_rows: AtomicUsize,
    cell_size: AtomicU32,
    failed: AtomicBool,
    shutdown: AtomicBool,
    /// Test hook: the next task panics inside a worker
    inject_fault: AtomicBool,
    params: Mutex<KernelParams>,
    wake_lock: Mutex<()>,
    wake: Condvar,
    done_lock: Mutex<()>,
    done: Condvar,
}

struct SharedRegion {
    ctl: ControlBlock,
    pos_x: AtomicF32Buffer,
    pos_y: AtomicF32Buffer,
    vel_x: AtomicF32Buffer,
    vel_y: AtomicF32Buffer,
    density: AtomicF32Buffer,
    near_density: AtomicF32Buffer,
    pressure: AtomicF32Buffer,
    near_pressure: AtomicF32Buffer,
    force_x: AtomicF32Buffer,
    force_y: AtomicF32Buffer,
    cell_head: Box<[AtomicU32]>,
    particle_next: Box<[AtomicU32]>,
    lut: SqrtLut,
}

impl SharedRegion {
    fn new(capacity: usize, grid_capacity: usize, h: f32) -> Self {
        Self {
            ctl: ControlBlock {
                phase: AtomicU64::new(0),
                completed: AtomicUsize::new(0),
                ready: AtomicUsize::new(0),
                particle_count: AtomicUsize::new(0),
                task: AtomicU8::new(Task::Idle as u8),
                grid_cols: AtomicUsize::new(1),
                grid_rows: AtomicUsize::new(1),
                cell_size: AtomicU32::new(h.to_bits()),
                failed: AtomicBool::new(false),
                shutdown: AtomicBool::new(false),
                inject_fault: AtomicBool::new(false),
                params: Mutex::new(KernelParams::default()),
                wake_lock: Mutex::new(()),
                wake: Condvar::new(),
                done_lock: Mutex::new(()),
                done: Condvar::new(),
            },
            pos_x: AtomicF32Buffer::new(capacity),
            pos_y: AtomicF32Buffer::new(capacity),
            vel_x: AtomicF32Buffer::new(capacity),
            vel_y: AtomicF32Buffer::new(capacity),
            density: AtomicF32Buffer::new(capacity),
            near_density: AtomicF32Buffer::new(capacity),
            pressure: AtomicF32Buffer::new(capacity),
            near_pressure: AtomicF32Buffer::new(capacity),
            force_x: AtomicF32Buffer::new(capacity),
            force_y: AtomicF32Buffer::new(capacity),
            cell_head: atomic_u32_buffer(grid_capacity),
            particle_next: atomic_u32_buffer(capacity),
            lut: SqrtLut::new(h),
        }
    }

    fn dims(&self) -> GridDims {
        GridDims {
            cols: self.ctl.grid_cols.load(Ordering::Relaxed),
            rows: self.ctl.grid_rows.load(Ordering::Relaxed),
            cell_size: f32::from_bits(self.ctl.cell_size.load(Ordering::Relaxed)),
        }
    }

    fn signal_done(&self) {
        let _guard = self.ctl.done_lock.lock();
        self.ctl.done.notify_all();
    }
}

/// Worker-side read view with the grid dims latched for the phase.
struct SharedView<'a> {
    region: &'a SharedRegion,
    dims: GridDims,
}

impl ParticleFields for SharedView<'_> {
    #[inline]
    fn position(&self, i: usize) -> Vec2 {
        Vec2::new(self.region.pos_x.load(i), self.region.pos_y.load(i))
    }
    #[inline]
    fn velocity(&self, i: usize) -> Vec2 {
        Vec2::new(self.region.vel_x.load(i), self.region.vel_y.load(i))
    }
    #[inline]
    fn density(&self, i: usize) -> f32 {
        self.region.density.load(i)
    }
    #[inline]
    fn pressure(&self, i: usize) -> f32 {
        self.region.pressure.load(i)
    }
    #[inline]
    fn near_pressure(&self, i: usize) -> f32 {
        self.region.near_pressure.load(i)
    }
}

impl CellLists for SharedView<'_> {
    #[inline]
    fn dims(&self) -> GridDims {
        self.dims
    }
    #[inline]
    fn head(&self, cell: usize) -> u32 {
        self.region.cell_head[cell].load(Ordering::Relaxed)
    }
    #[inline]
    fn next(&self, particle: usize) -> u32 {
        self.region.particle_next[particle].load(Ordering::Relaxed)
    }
}

// =============================================================================
// WORKERS
// =============================================================================

fn worker_main(id: usize, slice: Range<usize>, shared: Arc<SharedRegion>, ready_delay: Duration) {
    let ctl = &shared.ctl;
    if !ready_delay.is_zero() {
        std::thread::sleep(ready_delay);
    }
    ctl.ready.fetch_add(1, Ordering::AcqRel);
    shared.signal_done();
    log::debug!("worker {} ready, slice {:?}", id, slice);

    let mut seen_phase = 0u64;
    loop {
        {
            let mut guard = ctl.wake_lock.lock();
            while ctl.phase.load(Ordering::Acquire) == seen_phase
                && !ctl.shutdown.load(Ordering::Acquire)
            {
                ctl.wake.wait(&mut guard);
            }
        }
        if ctl.shutdown.load(Ordering::Acquire) {
            break;
        }
        seen_phase = ctl.phase.load(Ordering::Acquire);

        let task = Task::from_u8(ctl.task.load(Ordering::Relaxed));
        let count = ctl.particle_count.load(Ordering::Relaxed);
        let params = *ctl.params.lock();
        let view = SharedView {
            region: &shared,
            dims: shared.dims(),
        };
        let range = slice.start..slice.end.min(count);

        let result = catch_unwind(AssertUnwindSafe(|| {
            if ctl.inject_fault.swap(false, Ordering::AcqRel) {
                panic!("injected fault in worker {}", id);
            }
            run_task(task, range.clone(), &view, &params);
        }));

        if result.is_err() {
            log::error!("worker {} panicked during {:?}", id, task);
            ctl.failed.store(true, Ordering::Release);
        }

        ctl.completed.fetch_add(1, Ordering::AcqRel);
        shared.signal_done();
    }
    log::debug!("worker {} exiting", id);
}

fn run_task(task: Task, range: Range<usize>, view: &SharedView<'_>, params: &KernelParams) {
    let region = view.region;
    match task {
        Task::Idle => {}
        Task::Density => {
            for i in range {
                let s = gather_density(i, view, view, &region.lut, params);
                region.density.store(i, s.density);
                region.near_density.store(i, s.near_density);
                region.pressure.store(i, s.pressure);
                region.near_pressure.store(i, s.near_pressure);
            }
        }
        Task::Force => {
            for i in range {
                let f = gather_force(i, view, view, &region.lut, params);
                region.force_x.store(i, f.x);
                region.force_y.store(i, f.y);
            }
        }
    }
}

// =============================================================================
// COORDINATOR
// =============================================================================

pub struct WorkerPool {
    shared: Arc<SharedRegion>,
    handles: Vec<JoinHandle<()>>,
    slices: Vec<Range<usize>>,
}

impl WorkerPool {
    /// Spawn `workers` threads and wait up to `timeout` for all of them to
    /// report ready. `h` is the kernel radius the lookup table is built for.
    pub fn start(workers: usize, h: f32, timeout: Duration) -> Result<Self, PoolError> {
        Self::start_with_ready_delay(workers, h, timeout, Duration::ZERO)
    }

    /// `start`, with every worker sleeping `ready_delay` before it reports
    /// ready. Exercises the startup timeout.
    #[doc(hidden)]
    pub fn start_with_ready_delay(
        workers: usize,
        h: f32,
        timeout: Duration,
        ready_delay: Duration,
    ) -> Result<Self, PoolError> {
        let workers = workers.clamp(MIN_WORKERS, MAX_WORKERS);
        let shared = Arc::new(SharedRegion::new(MAX_PARTICLES, MAX_GRID_CELLS, h));
        let slices: Vec<Range<usize>> = (0..workers)
            .map(|w| worker_slice(w, workers, MAX_PARTICLES))
            .collect();

        let mut pool = Self {
            shared,
            handles: Vec::with_capacity(workers),
            slices,
        };

        for (id, slice) in pool.slices.clone().into_iter().enumerate() {
            let shared = Arc::clone(&pool.shared);
            let handle = std::thread::Builder::new()
                .name(format!("sph-worker-{}", id))
                .spawn(move || worker_main(id, slice, shared, ready_delay))?;
            pool.handles.push(handle);
        }

        pool.wait_ready(timeout)?;
        log::info!("started {} SPH workers", workers);
        Ok(pool)
    }

    fn wait_ready(&mut self, timeout: Duration) -> Result<(), PoolError> {
        let shared = Arc::clone(&self.shared);
        let ctl = &shared.ctl;
        let expected = self.slices.len();
        let deadline = Instant::now() + timeout;
        let mut guard = ctl.done_lock.lock();
        while ctl.ready.load(Ordering::Acquire) < expected {
            if ctl.done.wait_until(&mut guard, deadline).timed_out() {
                let ready = ctl.ready.load(Ordering::Acquire);
                if ready < expected {
                    drop(guard);
                    self.abandon();
                    return Err(PoolError::StartupTimeout {
                        ready,
                        expected,
                        timeout,
                    });
                }
            }
        }
        Ok(())
    }

    pub fn worker_count(&self) -> usize {
        self.slices.len()
    }

    pub fn slices(&self) -> &[Range<usize>] {
        &self.slices
    }

    /// Make the next phase panic inside a worker. Exercises the downgrade.
    #[doc(hidden)]
    pub fn inject_fault(&self) {
        self.shared.ctl.inject_fault.store(true, Ordering::Release);
    }

    /// Density/pressure, barrier, force, barrier. Results land in
    /// `particles`; the force accumulator is overwritten.
    pub fn compute(
        &mut self,
        particles: &mut Particles,
        grid: &SpatialGrid,
        params: &KernelParams,
    ) -> Result<(), PoolError> {
        let n = particles.len().min(MAX_PARTICLES);
        self.upload(particles, grid, params, n);

        self.run_phase(Task::Density, n)?;
        self.run_phase(Task::Force, n)?;

        self.download(particles, n);
        Ok(())
    }

    fn upload(&self, particles: &Particles, grid: &SpatialGrid, params: &KernelParams, n: usize) {
        let s = &*self.shared;
        for i in 0..n {
            let p = particles.position[i];
            let v = particles.velocity[i];
            s.pos_x.store(i, p.x);
            s.pos_y.store(i, p.y);
            s.vel_x.store(i, v.x);
            s.vel_y.store(i, v.y);
            s.particle_next[i].store(grid.particle_next[i], Ordering::Relaxed);
        }

        let dims = grid.dims();
        let cells = dims.cell_count().min(s.cell_head.len());
        for (c, &head) in grid.cell_head.iter().enumerate().take(cells) {
            s.cell_head[c].store(head, Ordering::Relaxed);
        }

        s.ctl.grid_cols.store(dims.cols, Ordering::Relaxed);
        s.ctl.grid_rows.store(dims.rows, Ordering::Relaxed);
        s.ctl.cell_size.store(dims.cell_size.to_bits(), Ordering::Relaxed);
        *s.ctl.params.lock() = *params;
    }

    fn download(&self, particles: &mut Particles, n: usize) {
        let s = &*self.shared;
        for i in 0..n {
            particles.density[i] = s.density.load(i);
            particles.near_density[i] = s.near_density.load(i);
            particles.pressure[i] = s.pressure.load(i);
            particles.near_pressure[i] = s.near_pressure.load(i);
            particles.force[i] = Vec2::new(s.force_x.load(i), s.force_y.load(i));
        }
    }

    fn run_phase(&self, task: Task, count: usize) -> Result<(), PoolError> {
        let ctl = &self.shared.ctl;
        let workers = self.slices.len();

        ctl.particle_count.store(count, Ordering::Relaxed);
        ctl.task.store(task as u8, Ordering::Relaxed);
        ctl.completed.store(0, Ordering::Relaxed);
        {
            let _guard = ctl.wake_lock.lock();
            ctl.phase.fetch_add(1, Ordering::Release);
            ctl.wake.notify_all();
        }

        {
            let mut guard = ctl.done_lock.lock();
            while ctl.completed.load(Ordering::Acquire) < workers {
                ctl.done.wait(&mut guard);
            }
        }

        if ctl.failed.load(Ordering::Acquire) {
            return Err(PoolError::WorkerPanicked(task));
        }
        Ok(())
    }

    fn signal_shutdown(&self) {
        let ctl = &self.shared.ctl;
        ctl.shutdown.store(true, Ordering::Release);
        let _guard = ctl.wake_lock.lock();
        ctl.wake.notify_all();
    }

    /// Tell workers to exit without waiting for them (they may be stuck).
    fn abandon(&mut self) {
        self.signal_shutdown();
        self.handles.clear();
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.signal_shutdown();
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slices_are_disjoint_and_cover_capacity() {
        for workers in MIN_WORKERS..=MAX_WORKERS {
            let slices: Vec<_> = (0..workers)
                .map(|w| worker_slice(w, workers, MAX_PARTICLES))
                .collect();
            assert_eq!(slices[0].start, 0);
            assert_eq!(slices.last().unwrap().end, MAX_PARTICLES);
            for pair in slices.windows(2) {
                assert_eq!(pair[0].end, pair[1].start);
            }
        }
    }

    #[test]
    fn test_default_worker_count_in_range() {
        let n = default_worker_count();
        assert!((MIN_WORKERS..=MAX_WORKERS).contains(&n));
    }

    #[test]
    fn test_pool_starts_and_shuts_down() {
        let pool = WorkerPool::start(3, 16.0, Duration::from_secs(5)).unwrap();
        assert_eq!(pool.worker_count(), 3);
        drop(pool);
    }

    #[test]
    fn test_empty_compute_is_a_no_op() {
        let mut pool = WorkerPool::start(2, 16.0, Duration::from_secs(5)).unwrap();
        let mut particles = Particles::with_capacity(8);
        let dims = GridDims::for_domain(100.0, 100.0, 16.0, MAX_GRID_CELLS);
        let grid = SpatialGrid::new(dims, 8);
        pool.compute(&mut particles, &grid, &KernelParams::default())
            .unwrap();
        assert!(particles.is_empty());
    }

    #[test]
    fn test_slow_workers_hit_startup_timeout() {
        let result = WorkerPool::start_with_ready_delay(
            2,
            16.0,
            Duration::from_millis(20),
            Duration::from_millis(500),
        );
        match result {
            Err(PoolError::StartupTimeout { ready, expected, .. }) => {
                assert_eq!(expected, 2);
                assert!(ready < expected);
            }
            Err(e) => panic!("wrong error: {}", e),
            Ok(_) => panic!("pool started despite slow workers"),
        }
    }

    #[test]
    fn test_injected_fault_reports_error() {
        let mut pool = WorkerPool::start(2, 16.0, Duration::from_secs(5)).unwrap();
        let mut particles = Particles::with_capacity(8);
        particles.spawn(Vec2::new(10.0, 10.0), Vec2::ZERO);
        let dims = GridDims::for_domain(100.0, 100.0, 16.0, MAX_GRID_CELLS);
        let mut grid = SpatialGrid::new(dims, 8);
        grid.rebuild(particles.positions());

        pool.inject_fault();
        let result = pool.compute(&mut particles, &grid, &KernelParams::default());
        assert!(matches!(result, Err(PoolError::WorkerPanicked(Task::Density))));
    }
}
