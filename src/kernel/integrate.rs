// src/kernel/integrate.rs
//
// Face-charge integration for one (source axis, displacement) pair.
//
// The source cell is uniformly magnetised along `axis`, which is equivalent to
// two opposite surface charge sheets on the faces normal to that axis. Each
// sheet is sampled with nv × nw point charges; the number of points grows as
// the destination gets closer. The destination is a single point at the cell
// centre (lifted by `lift` along z), it is not volume-averaged.

use std::f64::consts::PI;

use crate::grid::{delta_cell, X, Y, Z};

/// Round-half-up count of integration points, at least 1.
#[inline]
fn n_points(extent_over_max: f64) -> usize {
    (extent_over_max.max(1.0) + 0.5) as usize
}

/// Number of integration points along the two face axes (v, w) for a given
/// displacement, already doubled so source and destination samples are
/// staggered.
pub fn integration_points(
    axis: usize,
    disp: [isize; 3],
    cell: [f64; 3],
    accuracy: f64,
) -> (usize, usize) {
    let v = (axis + 1) % 3;
    let w = (axis + 2) % 3;

    let dx = delta_cell(disp[X]) * cell[X];
    let dy = delta_cell(disp[Y]) * cell[Y];
    let dz = delta_cell(disp[Z]) * cell[Z];

    let mut d = (dx * dx + dy * dy + dz * dz).sqrt();
    if d == 0.0 {
        // Self or touching cell: fall back to the smallest cell dimension.
        d = cell[X].min(cell[Y]).min(cell[Z]);
    }
    let max_size = d / accuracy;

    let nv = n_points(cell[v] / max_size) * 2;
    let nw = n_points(cell[w] / max_size) * 2;
    (nv, nw)
}

/// Field at displacement `disp` (in cells) produced by a unit-magnetised cell
/// at the origin, magnetised along `axis`. Returns (Hx, Hy, Hz) per unit M.
pub fn field_from_source(
    axis: usize,
    disp: [isize; 3],
    cell: [f64; 3],
    lift: f64,
    accuracy: f64,
) -> [f64; 3] {
    let u = axis;
    let v = (u + 1) % 3;
    let w = (u + 2) % 3;

    let (nv, nw) = integration_points(axis, disp, cell, accuracy);
    debug_assert!(nv > 0 && nw > 0);

    let r = [
        disp[X] as f64 * cell[X],
        disp[Y] as f64 * cell[Y],
        disp[Z] as f64 * cell[Z] + lift,
    ];

    let scale = 1.0 / (nv * nw) as f64;
    let charge = cell[v] * cell[w] * scale;
    let pu1 = 0.5 * cell[u];
    let pu2 = -pu1;

    let mut pole = [0.0_f64; 3];
    let mut h = [0.0_f64; 3];

    for i in 0..nv {
        pole[v] = -0.5 * cell[v] + cell[v] / (2 * nv) as f64 + i as f64 * (cell[v] / nv as f64);
        for j in 0..nw {
            pole[w] =
                -0.5 * cell[w] + cell[w] / (2 * nw) as f64 + j as f64 * (cell[w] / nw as f64);

            // + pole
            pole[u] = pu1;
            let r1 = [r[X] - pole[X], r[Y] - pole[Y], r[Z] - pole[Z]];
            let d1 = (r1[X] * r1[X] + r1[Y] * r1[Y] + r1[Z] * r1[Z]).sqrt();
            let q1 = charge / (4.0 * PI * d1 * d1 * d1);

            // - pole
            pole[u] = pu2;
            let r2 = [r[X] - pole[X], r[Y] - pole[Y], r[Z] - pole[Z]];
            let d2 = (r2[X] * r2[X] + r2[Y] * r2[Y] + r2[Z] * r2[Z]).sqrt();
            let q2 = -charge / (4.0 * PI * d2 * d2 * d2);

            // Pair the two poles before accumulating: they nearly cancel far away.
            for c in 0..3 {
                h[c] += r1[c] * q1 + r2[c] * q2;
            }
        }
    }

    h
}
