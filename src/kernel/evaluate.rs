// src/kernel/evaluate.rs
//
// Brute-force sweep of the displacement range, one task per source axis.
//
// Each task owns the row K[s][s..3] of the tensor and nothing else, so the
// three tasks never touch the same grid. Only displacements whose wrapped
// index lies in the lower half of every axis are integrated; the rest of the
// grid is filled by `symmetry::reconstruct` afterwards.

use log::{debug, warn};
use rayon::{Scope, ThreadPool, ThreadPoolBuilder};

use crate::grid::{kernel_ranges, wrap_index, Grid3D, X, Y, Z};
use crate::kernel::integrate::field_from_source;

/// Progress callback: (done, total).
pub type ProgressFn<'a> = dyn Fn(usize, usize) + Sync + 'a;

/// The upper triangle of the tensor, one row per source axis.
/// `rows[s][k]` holds component (s, s + k).
pub type KernelRows = [Vec<Grid3D>; 3];

/// Inputs shared read-only by the three sweep tasks.
pub struct Sweep<'a> {
    pub padded: [usize; 3],
    pub pbc: [usize; 3],
    pub cell: [f64; 3],
    pub lift: f64,
    pub accuracy: f64,
    pub progress: Option<&'a ProgressFn<'a>>,
}

/// Allocate the zeroed upper-triangle rows for a padded size.
pub fn alloc_rows(padded: [usize; 3]) -> KernelRows {
    [
        (0..3).map(|_| Grid3D::zeros(padded)).collect(),
        (0..2).map(|_| Grid3D::zeros(padded)).collect(),
        vec![Grid3D::zeros(padded)],
    ]
}

/// Dedicated pool with one worker per source axis. `None` (with a warning)
/// if the threads cannot be started; callers then use the global pool.
pub fn build_pool() -> Option<ThreadPool> {
    match ThreadPoolBuilder::new()
        .num_threads(3)
        .thread_name(|i| format!("strayfield-{}", i))
        .build()
    {
        Ok(pool) => Some(pool),
        Err(e) => {
            warn!("[kernel] dedicated worker pool unavailable ({}), using global pool", e);
            None
        }
    }
}

/// Integrate the evaluated octant of every upper-triangle component on
/// `pool`, or on the global pool when there is none.
///
/// Blocks until all three source axes are done.
pub fn evaluate(sweep: &Sweep<'_>, pool: Option<&ThreadPool>) -> KernelRows {
    let mut rows = alloc_rows(sweep.padded);
    match pool {
        Some(pool) => pool.scope(|scope| spawn_axes(scope, &mut rows, sweep)),
        None => rayon::scope(|scope| spawn_axes(scope, &mut rows, sweep)),
    }
    rows
}

fn spawn_axes<'s>(scope: &Scope<'s>, rows: &'s mut KernelRows, sweep: &'s Sweep<'s>) {
    for (s, row) in rows.iter_mut().enumerate() {
        scope.spawn(move |_| sweep_source_axis(s, row, sweep));
    }
}

/// Sweep all destinations for source axis `s`, accumulating into `row`
/// (components (s, s), (s, s+1), ...).
pub fn sweep_source_axis(s: usize, row: &mut [Grid3D], sweep: &Sweep<'_>) {
    debug_assert_eq!(row.len(), 3 - s);

    let size = sweep.padded;
    let (r1, r2) = kernel_ranges(size, sweep.pbc);

    // Only the X task reports, once per (z, y) line.
    let report = if s == X { sweep.progress } else { None };
    let lines_per_plane = (1 + r2[Y] - r1[Y]) as usize;
    let total = lines_per_plane * (1 + r2[Z] - r1[Z]) as usize;
    let mut done = 0usize;

    let mut n_evals = 0usize;

    for z in r1[Z]..=r2[Z] {
        let zw = wrap_index(z, size[Z]);
        // Checked on the wrapped index so PBC images are skipped consistently.
        if zw > size[Z] / 2 {
            if let Some(p) = report {
                done += lines_per_plane;
                p(done, total);
            }
            continue;
        }

        for y in r1[Y]..=r2[Y] {
            if let Some(p) = report {
                done += 1;
                p(done, total);
            }

            let yw = wrap_index(y, size[Y]);
            if yw > size[Y] / 2 {
                continue;
            }

            for x in r1[X]..=r2[X] {
                let xw = wrap_index(x, size[X]);
                if xw > size[X] / 2 {
                    continue;
                }

                let h = field_from_source(s, [x, y, z], sweep.cell, sweep.lift, sweep.accuracy);
                n_evals += 1;

                // += because periodic images fold onto the same bin.
                for (k, grid) in row.iter_mut().enumerate() {
                    grid.add(zw, yw, xw, h[s + k] as f32);
                }
            }
        }
    }

    debug!("[kernel] source axis {} done: {} displacements integrated", s, n_evals);
}
