// src/kernel/symmetry.rs
//
// Fill the un-integrated half of each axis from its mirror image.
//
// Mirroring index a -> n - a along axis A leaves the diagonal components
// unchanged and flips the sign of an off-diagonal component IJ exactly when
// A is I or J. The passes run X, then Y, then Z: the Y pass reads cells the X
// pass has just written, and likewise for Z.

use crate::grid::{Grid3D, X, Y, Z};
use crate::kernel::evaluate::KernelRows;

/// Sign picked up by component (i, j) when mirrored along `axis`.
#[inline]
pub fn parity(i: usize, j: usize, axis: usize) -> f32 {
    if i != j && (axis == i || axis == j) {
        -1.0
    } else {
        1.0
    }
}

/// Reconstruct every upper-triangle component in place.
pub fn reconstruct(rows: &mut KernelRows) {
    for axis in [X, Y, Z] {
        for (i, row) in rows.iter_mut().enumerate() {
            for (k, grid) in row.iter_mut().enumerate() {
                mirror_axis(grid, axis, parity(i, i + k, axis));
            }
        }
    }
}

/// Copy `grid[a] = sign * grid[n - a]` for every a in (n/2, n) along `axis`.
pub fn mirror_axis(grid: &mut Grid3D, axis: usize, sign: f32) {
    let size = grid.size;
    let n = size[axis];
    for z in 0..size[Z] {
        for y in 0..size[Y] {
            for x in 0..size[X] {
                let mut src = [x, y, z];
                if src[axis] <= n / 2 {
                    continue;
                }
                src[axis] = n - src[axis];
                let v = grid.get(src[Z], src[Y], src[X]);
                grid.set(z, y, x, sign * v);
            }
        }
    }
}
