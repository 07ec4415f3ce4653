//! Weakly-compressible SPH with a double-density (near-pressure) term.
//!
//! The pair math lives in free functions shared by both execution paths:
//! - the serial path visits each unordered pair once, caches it during the
//!   density pass and replays the cache for forces
//! - the parallel path gathers per particle so a worker only ever writes the
//!   particles it owns
//!
//! Every pair is always evaluated in (lower index, higher index) order and the
//! lower index is the pair's "source" for the density divisor, so both paths
//! produce the same per-pair numbers and differ only in summation order.

use crate::config::KernelParams;
use crate::constants::{
    COINCIDENT_EPSILON_SQ, COINCIDENT_JITTER, MIN_DENSITY, SQRT_LUT_RESOLUTION,
    TENSILE_PRESSURE_FRACTION, VISCOSITY_STABILITY,
};
use crate::particle::Particles;
use crate::rng::XorShift32;
use crate::spatial::CellLists;
use glam::Vec2;

// =============================================================================
// DISTANCE LOOKUP
// =============================================================================

/// `sqrt` over `[1, H²]` as a linearly interpolated table. Below 1.0 the
/// exact root is used, the table is too coarse there.
#[derive(Clone, Debug)]
pub struct SqrtLut {
    table: Vec<f32>,
    max_r2: f32,
}

impl SqrtLut {
    pub fn new(h: f32) -> Self {
        let max_r2 = (h * h).max(1.0);
        let len = (max_r2 as usize + 2) * SQRT_LUT_RESOLUTION + 1;
        let table = (0..len)
            .map(|k| (k as f32 / SQRT_LUT_RESOLUTION as f32).sqrt())
            .collect();
        Self { table, max_r2 }
    }

    #[inline]
    pub fn distance(&self, r2: f32) -> f32 {
        if r2 < 1.0 || r2 >= self.max_r2 {
            return r2.sqrt();
        }
        let x = r2 * SQRT_LUT_RESOLUTION as f32;
        let k = x as usize;
        let t = x - k as f32;
        let a = self.table[k];
        let b = self.table[k + 1];
        a + (b - a) * t
    }

    pub fn covers(&self, h: f32) -> bool {
        (self.max_r2 - (h * h).max(1.0)).abs() < f32::EPSILON
    }
}

// =============================================================================
// READ VIEW
// =============================================================================

/// Read access to particle fields during a pass. Implemented by the owned
/// [`Particles`] and by the worker-shared region.
pub trait ParticleFields {
    fn position(&self, i: usize) -> Vec2;
    fn velocity(&self, i: usize) -> Vec2;
    fn density(&self, i: usize) -> f32;
    fn pressure(&self, i: usize) -> f32;
    fn near_pressure(&self, i: usize) -> f32;
}

impl ParticleFields for Particles {
    #[inline]
    fn position(&self, i: usize) -> Vec2 {
        self.position[i]
    }
    #[inline]
    fn velocity(&self, i: usize) -> Vec2 {
        self.velocity[i]
    }
    #[inline]
    fn density(&self, i: usize) -> f32 {
        self.density[i]
    }
    #[inline]
    fn pressure(&self, i: usize) -> f32 {
        self.pressure[i]
    }
    #[inline]
    fn near_pressure(&self, i: usize) -> f32 {
        self.near_pressure[i]
    }
}

// =============================================================================
// PAIR MATH
// =============================================================================

/// Unit-ish separation from `lo` to `hi` and the kernel weight `q = 1 - r/H`,
/// or `None` when the pair is out of range. Requires `lo < hi`.
#[inline]
pub fn pair_geometry(
    lo: usize,
    hi: usize,
    p_lo: Vec2,
    p_hi: Vec2,
    lut: &SqrtLut,
    h: f32,
) -> Option<(Vec2, f32)> {
    debug_assert!(lo < hi);
    let mut d = p_hi - p_lo;
    let mut r2 = d.length_squared();
    if r2 >= h * h {
        return None;
    }
    if r2 < COINCIDENT_EPSILON_SQ {
        let mut rng = XorShift32::for_pair(lo, hi);
        d = Vec2::new(rng.next_signed(), rng.next_signed()) * COINCIDENT_JITTER;
        if d == Vec2::ZERO {
            d = Vec2::new(COINCIDENT_JITTER, 0.0);
        }
        r2 = d.length_squared();
    }
    let r = lut.distance(r2);
    let q = (1.0 - r / h).max(0.0);
    Some((d / r, q))
}

/// Density and pressure of one particle after summation.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct DensitySample {
    pub density: f32,
    pub near_density: f32,
    pub pressure: f32,
    pub near_pressure: f32,
}

/// Clamp raw kernel sums and derive both pressures.
#[inline]
pub fn finish_density(density: f32, near_density: f32, params: &KernelParams) -> DensitySample {
    let density = density.max(MIN_DENSITY);
    let pressure = (params.gas_const * (density - params.rest_density))
        .max(-params.gas_const * TENSILE_PRESSURE_FRACTION);
    DensitySample {
        density,
        near_density,
        pressure,
        near_pressure: params.near_gas_const * near_density,
    }
}

/// Force on the lower-index particle of a pair. The other particle receives
/// the negation.
#[inline]
pub fn pair_force<F: ParticleFields + ?Sized>(
    fields: &F,
    lo: usize,
    hi: usize,
    dir: Vec2,
    q: f32,
    params: &KernelParams,
) -> Vec2 {
    let density = fields.density(lo);
    let avg_pressure = 0.5 * (fields.pressure(lo) + fields.pressure(hi));
    let avg_near = 0.5 * (fields.near_pressure(lo) + fields.near_pressure(hi));

    // Positive pushes apart; cohesion pulls together at mid range
    let magnitude = (avg_pressure * q + avg_near * q * q) / density
        - params.surface_tension * q * (1.0 - q);
    let mut force = -dir * magnitude;

    let ceiling = VISCOSITY_STABILITY / params.dt.max(1e-6);
    let visc = (params.viscosity * q / density).min(ceiling);
    force += (fields.velocity(hi) - fields.velocity(lo)) * visc;

    force
}

// =============================================================================
// PER-PARTICLE GATHER (parallel path)
// =============================================================================

/// Density sums for particle `i` from scratch.
pub fn gather_density<F, L>(
    i: usize,
    fields: &F,
    lists: &L,
    lut: &SqrtLut,
    params: &KernelParams,
) -> DensitySample
where
    F: ParticleFields + ?Sized,
    L: CellLists + ?Sized,
{
    let p_i = fields.position(i);
    let mut density = 1.0;
    let mut near = 1.0;

    lists.for_each_in_block(lists.dims().cell_coords(p_i), |j| {
        if j == i {
            return;
        }
        let (lo, hi, p_lo, p_hi) = ordered(i, j, p_i, fields.position(j));
        if let Some((_, q)) = pair_geometry(lo, hi, p_lo, p_hi, lut, params.h) {
            let q2 = q * q;
            density += q2;
            near += q2 * q;
        }
    });

    finish_density(density, near, params)
}

/// Net SPH force on particle `i`. Needs finished densities for all neighbors.
pub fn gather_force<F, L>(
    i: usize,
    fields: &F,
    lists: &L,
    lut: &SqrtLut,
    params: &KernelParams,
) -> Vec2
where
    F: ParticleFields + ?Sized,
    L: CellLists + ?Sized,
{
    let p_i = fields.position(i);
    let mut force = Vec2::ZERO;

    lists.for_each_in_block(lists.dims().cell_coords(p_i), |j| {
        if j == i {
            return;
        }
        let (lo, hi, p_lo, p_hi) = ordered(i, j, p_i, fields.position(j));
        if let Some((dir, q)) = pair_geometry(lo, hi, p_lo, p_hi, lut, params.h) {
            let f_lo = pair_force(fields, lo, hi, dir, q, params);
            if i == lo {
                force += f_lo;
            } else {
                force -= f_lo;
            }
        }
    });

    force
}

#[inline]
fn ordered(i: usize, j: usize, p_i: Vec2, p_j: Vec2) -> (usize, usize, Vec2, Vec2) {
    if i < j {
        (i, j, p_i, p_j)
    } else {
        (j, i, p_j, p_i)
    }
}

// =============================================================================
// SERIAL PATH
// =============================================================================

/// One in-range pair, recorded during the serial density pass.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NeighborPair {
    pub lo: u32,
    pub hi: u32,
    pub dir: Vec2,
    pub q: f32,
}

/// Single-threaded solver. Keeps the pair list between the two passes so
/// forces don't repeat the distance work.
#[derive(Clone, Debug, Default)]
pub struct SerialSolver {
    pairs: Vec<NeighborPair>,
}

impl SerialSolver {
    pub fn new() -> Self {
        Self {
            pairs: Vec::with_capacity(1 << 16),
        }
    }

    pub fn pairs(&self) -> &[NeighborPair] {
        &self.pairs
    }

    /// Phase 1: densities and pressures for every particle.
    pub fn density_pass<L: CellLists + ?Sized>(
        &mut self,
        particles: &mut Particles,
        lists: &L,
        lut: &SqrtLut,
        params: &KernelParams,
    ) {
        let n = particles.len();
        self.pairs.clear();
        particles.density[..n].fill(1.0);
        particles.near_density[..n].fill(1.0);

        let dims = lists.dims();
        for i in 0..n {
            let p_i = particles.position[i];
            lists.for_each_in_block(dims.cell_coords(p_i), |j| {
                // Each unordered pair once, from its lower index
                if j <= i {
                    return;
                }
                if let Some((dir, q)) =
                    pair_geometry(i, j, p_i, particles.position[j], lut, params.h)
                {
                    let q2 = q * q;
                    particles.density[i] += q2;
                    particles.density[j] += q2;
                    particles.near_density[i] += q2 * q;
                    particles.near_density[j] += q2 * q;
                    self.pairs.push(NeighborPair {
                        lo: i as u32,
                        hi: j as u32,
                        dir,
                        q,
                    });
                }
            });
        }

        for i in 0..n {
            let s = finish_density(particles.density[i], particles.near_density[i], params);
            particles.density[i] = s.density;
            particles.near_density[i] = s.near_density;
            particles.pressure[i] = s.pressure;
            particles.near_pressure[i] = s.near_pressure;
        }
    }

    /// Phase 2: pair forces from the cached list. Overwrites the accumulator.
    pub fn force_pass(&self, particles: &mut Particles, params: &KernelParams) {
        particles.clear_forces();
        for pair in &self.pairs {
            let (lo, hi) = (pair.lo as usize, pair.hi as usize);
            let f = pair_force(&*particles, lo, hi, pair.dir, pair.q, params);
            particles.force[lo] += f;
            particles.force[hi] -= f;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial::{GridDims, SpatialGrid};

    fn params() -> KernelParams {
        KernelParams::default()
    }

    #[test]
    fn test_lut_close_to_sqrt() {
        let lut = SqrtLut::new(16.0);
        let mut r2: f32 = 0.0;
        while r2 < 256.0 {
            let exact = r2.sqrt();
            let approx = lut.distance(r2);
            assert!((exact - approx).abs() < 0.02, "r2={} exact={} lut={}", r2, exact, approx);
            r2 += 0.173;
        }
    }

    #[test]
    fn test_isolated_particle_has_self_density() {
        let mut particles = Particles::with_capacity(4);
        particles.spawn(Vec2::new(50.0, 50.0), Vec2::ZERO);
        let dims = GridDims::for_domain(100.0, 100.0, 16.0, 1024);
        let mut grid = SpatialGrid::new(dims, 4);
        grid.rebuild(particles.positions());

        let lut = SqrtLut::new(16.0);
        let mut solver = SerialSolver::new();
        solver.density_pass(&mut particles, &grid, &lut, &params());

        assert_eq!(particles.density[0], 1.0);
        assert_eq!(particles.near_density[0], 1.0);
        let expected = (params().gas_const * (1.0 - params().rest_density))
            .max(-params().gas_const * TENSILE_PRESSURE_FRACTION);
        assert_eq!(particles.pressure[0], expected);
    }

    #[test]
    fn test_pair_forces_cancel() {
        let mut particles = Particles::with_capacity(64);
        for k in 0..40 {
            let x = 20.0 + (k % 8) as f32 * 4.0;
            let y = 20.0 + (k / 8) as f32 * 4.0;
            particles.spawn(Vec2::new(x, y), Vec2::new((k as f32).sin() * 10.0, 0.0));
        }
        let dims = GridDims::for_domain(100.0, 100.0, 16.0, 1024);
        let mut grid = SpatialGrid::new(dims, 64);
        grid.rebuild(particles.positions());

        let lut = SqrtLut::new(16.0);
        let mut solver = SerialSolver::new();
        solver.density_pass(&mut particles, &grid, &lut, &params());
        solver.force_pass(&mut particles, &params());

        let total: Vec2 = particles.forces().iter().copied().sum();
        let scale: f32 = particles.forces().iter().map(|f| f.length()).sum();
        assert!(total.length() <= scale * 1e-4 + 1e-3, "net force {:?}", total);
    }

    #[test]
    fn test_coincident_particles_do_not_produce_nan() {
        let mut particles = Particles::with_capacity(4);
        particles.spawn(Vec2::new(30.0, 30.0), Vec2::ZERO);
        particles.spawn(Vec2::new(30.0, 30.0), Vec2::ZERO);
        let dims = GridDims::for_domain(100.0, 100.0, 16.0, 1024);
        let mut grid = SpatialGrid::new(dims, 4);
        grid.rebuild(particles.positions());

        let lut = SqrtLut::new(16.0);
        let mut solver = SerialSolver::new();
        solver.density_pass(&mut particles, &grid, &lut, &params());
        solver.force_pass(&mut particles, &params());

        for f in particles.forces() {
            assert!(f.is_finite(), "force {:?}", f);
        }
        // Near-contact pair pushes apart
        assert!(particles.force[0].length() > 0.0);
        assert!((particles.force[0] + particles.force[1]).length() < 1e-3);
    }

    #[test]
    fn test_gather_matches_serial_for_single_pair() {
        let mut particles = Particles::with_capacity(4);
        particles.spawn(Vec2::new(40.0, 40.0), Vec2::new(1.0, 0.0));
        particles.spawn(Vec2::new(46.0, 43.0), Vec2::new(-2.0, 1.0));
        let dims = GridDims::for_domain(100.0, 100.0, 16.0, 1024);
        let mut grid = SpatialGrid::new(dims, 4);
        grid.rebuild(particles.positions());
        let lut = SqrtLut::new(16.0);

        let mut solver = SerialSolver::new();
        solver.density_pass(&mut particles, &grid, &lut, &params());
        let gathered = gather_density(1, &particles, &grid, &lut, &params());
        assert_eq!(gathered.density, particles.density[1]);

        solver.force_pass(&mut particles, &params());
        let f1 = gather_force(1, &particles, &grid, &lut, &params());
        assert!((f1 - particles.force[1]).length() < 1e-4);
    }
}
