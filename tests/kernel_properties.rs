// tests/kernel_properties.rs
//
// Physical and structural properties of freshly computed kernels (no cache).

use strayfield_kernel::grid::{X, Y, Z};
use strayfield_kernel::kernel::{calc_kernel, calc_kernel_with_progress};
use strayfield_kernel::params::DEFAULT_ACCURACY;
use strayfield_kernel::{compute_kernel, KernelKey, KernelTensor};

const NM: f64 = 1e-9;

fn index_of(size: [usize; 3], axis: usize, a: usize, rest: [usize; 3]) -> [usize; 3] {
    let mut p = rest;
    p[axis] = a;
    debug_assert!(p[axis] < size[axis]);
    p
}

/// Check K(a) == sign * K(n - a) along `axis` for every stored component.
fn assert_mirror_parity(k: &KernelTensor, axis: usize) {
    let size = k.size();
    let n = size[axis];
    for i in 0..3 {
        for j in i..3 {
            let Some(grid) = k.get(i, j) else { continue };
            let sign = if i != j && (axis == i || axis == j) { -1.0f32 } else { 1.0 };
            for z in 0..size[Z] {
                for y in 0..size[Y] {
                    for x in 0..size[X] {
                        let a = [x, y, z][axis];
                        if a == 0 || 2 * a == n {
                            continue;
                        }
                        let m = index_of(size, axis, n - a, [x, y, z]);
                        let v = grid.get(z, y, x);
                        let w = grid.get(m[Z], m[Y], m[X]);
                        assert_eq!(
                            v,
                            sign * w,
                            "component ({}, {}) axis {} at (x={}, y={}, z={})",
                            i,
                            j,
                            axis,
                            x,
                            y,
                            z
                        );
                    }
                }
            }
        }
    }
}

#[test]
fn thin_film_scenario_self_demag() {
    let k = compute_kernel([4, 4, 1], [0, 0, 0], [1.0 * NM, 1.0 * NM, 1.0 * NM], 0.0, "");

    let xx = k.value(X, X, 0, 0, 0).unwrap();
    let yy = k.value(Y, Y, 0, 0, 0).unwrap();
    assert!(xx < 0.0, "K_xx(0) = {}", xx);
    assert_eq!(xx, yy, "in-plane symmetry of a square cell");

    // Single layer: no out-of-plane coupling is stored or aliased.
    assert!(k.get(X, Z).is_none());
    assert!(k.get(Y, Z).is_none());
    assert!(k.get(Z, X).is_none());
    assert!(k.get(Z, Y).is_none());
    assert!(k.get(Z, Z).is_some());
}

#[test]
fn tensor_is_symmetric_by_alias() {
    for (size, pbc) in [
        ([4, 4, 1], [0, 0, 0]),
        ([3, 2, 2], [0, 0, 0]),
        ([4, 3, 1], [1, 1, 0]),
    ] {
        let key = KernelKey::new(size, pbc, [2.0 * NM, 1.0 * NM, 1.5 * NM], 0.0);
        let k = calc_kernel(&key, DEFAULT_ACCURACY);
        assert!(k.is_aliased_symmetric(), "size {:?} pbc {:?}", size, pbc);
        for i in 0..3 {
            for j in 0..3 {
                if let (Some(a), Some(b)) = (k.get(i, j), k.get(j, i)) {
                    assert_eq!(a, b);
                }
            }
        }
    }
}

#[test]
fn mirror_parity_holds_on_every_axis() {
    let key = KernelKey::new([3, 4, 2], [0, 0, 0], [1.0 * NM, 2.0 * NM, 0.5 * NM], 0.0);
    let k = calc_kernel(&key, DEFAULT_ACCURACY);
    assert_eq!(k.size(), [6, 8, 3]);
    for axis in [X, Y, Z] {
        assert_mirror_parity(&k, axis);
    }
}

#[test]
fn mirror_parity_holds_with_periodic_axes() {
    let key = KernelKey::new([4, 3, 1], [2, 0, 0], [1.0 * NM; 3], 0.0);
    let k = calc_kernel(&key, DEFAULT_ACCURACY);
    assert_eq!(k.size(), [4, 6, 1]);
    for axis in [X, Y, Z] {
        assert_mirror_parity(&k, axis);
    }
}

#[test]
fn off_diagonal_vanishes_on_symmetry_planes() {
    let key = KernelKey::new([4, 4, 2], [0, 0, 0], [1.0 * NM; 3], 0.0);
    let k = calc_kernel(&key, DEFAULT_ACCURACY);
    let xy = k.get(X, Y).unwrap();
    // On the x = 0 plane both poles of an x-magnetised cell are equidistant,
    // so XY cancels.
    for y in 0..k.size()[Y] {
        assert!(xy.get(0, y, 0).abs() < 1e-6, "XY(0, {}, 0) = {}", y, xy.get(0, y, 0));
    }
}

#[test]
fn every_value_is_finite() {
    let key = KernelKey::new([3, 3, 3], [0, 0, 0], [1.0 * NM, 1.0 * NM, 3.0 * NM], 0.0);
    let k = calc_kernel(&key, DEFAULT_ACCURACY);
    for i in 0..3 {
        for j in i..3 {
            let g = k.get(i, j).unwrap();
            assert!(g.data.iter().all(|v| v.is_finite()), "component ({}, {})", i, j);
        }
    }
    // Self coupling: diagonal negative, trace close to -1 for a point inside the cell.
    let trace: f64 = (0..3).map(|c| k.value(c, c, 0, 0, 0).unwrap() as f64).sum();
    assert!(trace < -0.8 && trace > -1.2, "trace = {}", trace);
}

#[test]
fn lift_weakens_the_self_term() {
    let flat = KernelKey::new([4, 4, 1], [0, 0, 0], [1.0 * NM; 3], 0.0);
    let lifted = KernelKey::new([4, 4, 1], [0, 0, 0], [1.0 * NM; 3], 5.0 * NM);
    let k0 = calc_kernel(&flat, DEFAULT_ACCURACY);
    let k1 = calc_kernel(&lifted, DEFAULT_ACCURACY);
    let zz0 = k0.value(Z, Z, 0, 0, 0).unwrap();
    let zz1 = k1.value(Z, Z, 0, 0, 0).unwrap();
    // Inside the cell the field opposes m; far above it follows the dipole and is positive.
    assert!(zz0 < 0.0, "zz0 = {}", zz0);
    assert!(zz1 > 0.0 && zz1 < zz0.abs(), "zz1 = {}", zz1);
}

#[test]
fn progress_is_reported_to_completion() {
    use std::sync::Mutex;
    let seen = Mutex::new(Vec::new());
    let progress = |done: usize, total: usize| seen.lock().unwrap().push((done, total));
    let key = KernelKey::new([4, 4, 1], [0, 0, 0], [1.0 * NM; 3], 0.0);
    calc_kernel_with_progress(&key, DEFAULT_ACCURACY, Some(&progress));

    let seen = seen.into_inner().unwrap();
    assert!(!seen.is_empty());
    let (done, total) = *seen.last().unwrap();
    assert_eq!(done, total);
    assert!(seen.windows(2).all(|w| w[0].0 < w[1].0), "progress must increase");
}

#[test]
#[should_panic]
fn invalid_geometry_is_fatal() {
    compute_kernel([4, 4, 1], [0, 0, 0], [1.0 * NM, -1.0 * NM, 1.0 * NM], 0.0, "");
}
