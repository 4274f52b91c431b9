use nalgebra::Matrix3;

use crate::core::sample::KGrid;

/// Produces `n_samples + 1` monotonically decreasing spacings, evenly
/// stepped from `coarse` to `dense` inclusive (1/AA).
pub fn spacing_series(coarse: f64, dense: f64, n_samples: usize) -> Vec<f64> {
    if n_samples == 0 {
        return vec![coarse];
    }
    let step = (coarse - dense) / n_samples as f64;
    (0..=n_samples).map(|i| coarse - i as f64 * step).collect()
}

/// Maps a target reciprocal-space spacing to the smallest integer mesh
/// along each reciprocal lattice direction whose sampling interval does
/// not exceed `spacing` (rounding up, minimum 1 subdivision).
///
/// `rec_cell` carries the 2*pi factor (see [`crate::core::domain::Lattice::reciprocal`]).
pub fn grid_for_spacing(rec_cell: &Matrix3<f64>, spacing: f64) -> KGrid {
    let mut grid = [1u32; 3];
    for (i, n) in grid.iter_mut().enumerate() {
        let norm = rec_cell.column(i).norm();
        *n = (norm / spacing).ceil().max(1.0) as u32;
    }
    grid
}

/// Maps each spacing to a mesh and drops consecutive duplicates, which are
/// common at coarse spacings where rounding collapses several spacings to
/// the same integer grid. Order preserved, first occurrence kept.
pub fn unique_grids(rec_cell: &Matrix3<f64>, spacings: &[f64]) -> Vec<KGrid> {
    let mut grids: Vec<KGrid> = Vec::with_capacity(spacings.len());
    for &spacing in spacings {
        let grid = grid_for_spacing(rec_cell, spacing);
        if grids.last() == Some(&grid) {
            continue;
        }
        grids.push(grid);
    }
    grids
}

/// Bumps a mesh by +1 in each dimension.
///
/// This is the documented policy when a duplicate grid is detected where
/// uniqueness is structurally required (single-point convergence
/// comparisons cannot take a delta): the caller forces distinctness rather
/// than silently suppressing the sample.
pub fn bump_grid(grid: KGrid) -> KGrid {
    [grid[0] + 1, grid[1] + 1, grid[2] + 1]
}
