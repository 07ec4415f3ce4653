//! Uniform spatial hash for neighbor queries.
//!
//! Cells are exactly one kernel radius wide, so every neighbor within H lives
//! in the 3×3 block around a particle's cell. Each cell is an intrusive
//! singly-linked list: `cell_head[cell]` holds the first particle and
//! `particle_next[i]` chains to the next, with [`EMPTY`] terminating.
//!
//! Rebuilt from scratch every substep. Positions outside the domain are
//! clamped into the edge cells rather than dropped.

use crate::constants::EMPTY;
use glam::Vec2;

/// Grid shape. Copied into the worker control block each substep.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GridDims {
    pub cols: usize,
    pub rows: usize,
    pub cell_size: f32,
}

impl GridDims {
    /// Dimensions covering a `width × height` domain, shrunk to fit
    /// `max_cells` if needed. Shrinking only makes edge cells fatter.
    pub fn for_domain(width: f32, height: f32, cell_size: f32, max_cells: usize) -> Self {
        let cell_size = cell_size.max(1e-3);
        let mut cols = ((width / cell_size).ceil() as usize).max(1);
        let mut rows = ((height / cell_size).ceil() as usize).max(1);
        let max_cells = max_cells.max(1);

        if cols * rows > max_cells {
            log::warn!(
                "grid {}x{} exceeds {} cells, clamping edge cells",
                cols,
                rows,
                max_cells
            );
            cols = cols.min(max_cells);
            rows = rows.min((max_cells / cols).max(1));
        }

        Self { cols, rows, cell_size }
    }

    #[inline]
    pub fn cell_count(&self) -> usize {
        self.cols * self.rows
    }

    /// Cell coordinates of a position, clamped to the grid.
    #[inline]
    pub fn cell_coords(&self, p: Vec2) -> (usize, usize) {
        let cx = (p.x / self.cell_size).floor();
        let cy = (p.y / self.cell_size).floor();
        // NaN falls through max() as 0.0
        let cx = cx.max(0.0).min((self.cols - 1) as f32) as usize;
        let cy = cy.max(0.0).min((self.rows - 1) as f32) as usize;
        (cx, cy)
    }

    #[inline]
    pub fn cell_index(&self, p: Vec2) -> usize {
        let (cx, cy) = self.cell_coords(p);
        cy * self.cols + cx
    }
}

/// Read access to linked cell lists. Implemented by the owned grid and by the
/// worker-shared copy, so the SPH gather code runs against either.
pub trait CellLists {
    fn dims(&self) -> GridDims;
    fn head(&self, cell: usize) -> u32;
    fn next(&self, particle: usize) -> u32;

    /// Visit every particle in the 3×3 block around `cell`, edge-clamped.
    #[inline]
    fn for_each_in_block(&self, (cx, cy): (usize, usize), mut f: impl FnMut(usize)) {
        let dims = self.dims();
        let x0 = cx.saturating_sub(1);
        let x1 = (cx + 1).min(dims.cols - 1);
        let y0 = cy.saturating_sub(1);
        let y1 = (cy + 1).min(dims.rows - 1);
        for y in y0..=y1 {
            for x in x0..=x1 {
                let mut j = self.head(y * dims.cols + x);
                while j != EMPTY {
                    f(j as usize);
                    j = self.next(j as usize);
                }
            }
        }
    }
}

#[derive(Clone, Debug)]
pub struct SpatialGrid {
    dims: GridDims,
    pub cell_head: Vec<u32>,
    pub particle_next: Vec<u32>,
}

impl SpatialGrid {
    pub fn new(dims: GridDims, particle_capacity: usize) -> Self {
        Self {
            dims,
            cell_head: vec![EMPTY; dims.cell_count()],
            particle_next: vec![EMPTY; particle_capacity],
        }
    }

    /// Change the grid shape. Only called between steps (resize command).
    pub fn set_dims(&mut self, dims: GridDims) {
        self.dims = dims;
        self.cell_head.clear();
        self.cell_head.resize(dims.cell_count(), EMPTY);
    }

    /// Relink every particle. O(n), no allocation.
    pub fn rebuild(&mut self, positions: &[Vec2]) {
        self.cell_head.fill(EMPTY);
        let n = positions.len().min(self.particle_next.len());
        for (i, &p) in positions.iter().enumerate().take(n) {
            let cell = self.dims.cell_index(p);
            self.particle_next[i] = self.cell_head[cell];
            self.cell_head[cell] = i as u32;
        }
    }

    /// Neighbors of particle `i` within `radius` (usually H), excluding itself.
    pub fn neighbors(&self, positions: &[Vec2], i: usize, radius: f32) -> Vec<usize> {
        let mut out = Vec::new();
        let p = positions[i];
        let r2 = radius * radius;
        self.for_each_in_block(self.dims.cell_coords(p), |j| {
            if j != i && positions[j].distance_squared(p) < r2 {
                out.push(j);
            }
        });
        out
    }

    /// Visit every particle within `radius` of an arbitrary point. Works for
    /// radii larger than a cell by widening the scanned block.
    pub fn for_each_within(
        &self,
        positions: &[Vec2],
        center: Vec2,
        radius: f32,
        mut f: impl FnMut(usize, Vec2, f32),
    ) {
        let r2 = radius * radius;
        let (x0, y0) = self.dims.cell_coords(center - Vec2::splat(radius));
        let (x1, y1) = self.dims.cell_coords(center + Vec2::splat(radius));
        for y in y0..=y1 {
            for x in x0..=x1 {
                let mut j = self.cell_head[y * self.dims.cols + x];
                while j != EMPTY {
                    let idx = j as usize;
                    let d = positions[idx] - center;
                    let d2 = d.length_squared();
                    if d2 < r2 {
                        f(idx, d, d2);
                    }
                    j = self.particle_next[idx];
                }
            }
        }
    }
}

impl CellLists for SpatialGrid {
    #[inline]
    fn dims(&self) -> GridDims {
        self.dims
    }

    #[inline]
    fn head(&self, cell: usize) -> u32 {
        self.cell_head[cell]
    }

    #[inline]
    fn next(&self, particle: usize) -> u32 {
        self.particle_next[particle]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn brute_force(positions: &[Vec2], i: usize, h: f32) -> Vec<usize> {
        (0..positions.len())
            .filter(|&j| j != i && positions[j].distance_squared(positions[i]) < h * h)
            .collect()
    }

    #[test]
    fn test_neighbors_match_brute_force() {
        let h = 10.0;
        let dims = GridDims::for_domain(200.0, 100.0, h, 4096);
        let mut grid = SpatialGrid::new(dims, 512);

        let positions: Vec<Vec2> = (0..300)
            .map(|k| Vec2::new((k * 37 % 200) as f32 + 0.3, (k * 53 % 100) as f32 + 0.7))
            .collect();
        grid.rebuild(&positions);

        for i in 0..positions.len() {
            let mut got = grid.neighbors(&positions, i, h);
            got.sort_unstable();
            assert_eq!(got, brute_force(&positions, i, h), "particle {}", i);
        }
    }

    #[test]
    fn test_out_of_domain_positions_clamp_to_edge() {
        let dims = GridDims::for_domain(100.0, 100.0, 10.0, 4096);
        assert_eq!(dims.cell_coords(Vec2::new(-50.0, 500.0)), (0, 9));
        assert_eq!(dims.cell_coords(Vec2::new(f32::NAN, 5.0)), (0, 0));
    }

    #[test]
    fn test_oversized_domain_still_finds_neighbors() {
        // 1000 cells requested, 64 allowed: edge cells get fat
        let dims = GridDims::for_domain(400.0, 250.0, 10.0, 64);
        assert!(dims.cell_count() <= 64);
        let mut grid = SpatialGrid::new(dims, 16);
        let positions = vec![Vec2::new(395.0, 245.0), Vec2::new(390.0, 240.0)];
        grid.rebuild(&positions);
        assert_eq!(grid.neighbors(&positions, 0, 10.0), vec![1]);
    }

    #[test]
    fn test_within_radius_scans_multiple_cells() {
        let dims = GridDims::for_domain(200.0, 200.0, 10.0, 4096);
        let mut grid = SpatialGrid::new(dims, 16);
        let positions = vec![
            Vec2::new(100.0, 100.0),
            Vec2::new(135.0, 100.0),
            Vec2::new(170.0, 100.0),
        ];
        grid.rebuild(&positions);
        let mut hits = Vec::new();
        grid.for_each_within(&positions, Vec2::new(100.0, 100.0), 40.0, |j, _, _| hits.push(j));
        hits.sort_unstable();
        assert_eq!(hits, vec![0, 1]);
    }
}
