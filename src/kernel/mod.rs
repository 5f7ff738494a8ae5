// src/kernel/mod.rs
//
// Magnetostatic (stray-field) kernel: K[s][d] is the d-component of the field
// at a displacement produced by a unit-magnetised cell magnetised along s.
//
// Pipeline:
//   pad the grid -> integrate one octant per source axis (3 tasks)
//   -> mirror the other seven octants -> alias the lower triangle.
// `KernelCache` wraps this with a best-effort on-disk cache.
//
// The kernel is dimensionless (unit "1"); the solver applies mu0 later.

pub mod cache;
pub mod evaluate;
pub mod integrate;
pub mod symmetry;
pub mod tensor;

use std::path::PathBuf;
use std::time::Instant;

use log::{debug, info};
use rayon::ThreadPool;

pub use cache::{CacheStats, KernelCache};
pub use evaluate::ProgressFn;
pub use tensor::KernelTensor;

use crate::config::KernelSettings;
use crate::grid::sanity_check;
use crate::params::KernelKey;

/// Obtain the kernel for a geometry, from `cache_dir` when possible.
/// An empty `cache_dir` disables the disk cache.
///
/// Panics if the geometry is invalid (zero size, non-positive cell size).
pub fn compute_kernel(
    input_size: [usize; 3],
    pbc: [usize; 3],
    cell_size: [f64; 3],
    lift: f64,
    cache_dir: &str,
) -> KernelTensor {
    let settings = KernelSettings {
        cache_dir: if cache_dir.is_empty() {
            None
        } else {
            Some(PathBuf::from(cache_dir))
        },
        memoize: false,
        ..KernelSettings::default()
    };
    let key = KernelKey::new(input_size, pbc, cell_size, lift);
    KernelCache::new(settings).get_or_compute(&key)
}

/// Log progress at every 10% step.
pub fn log_progress(done: usize, total: usize) {
    if total == 0 || done == 0 {
        return;
    }
    if done == total || done * 10 / total != (done - 1) * 10 / total {
        info!("[kernel] calculating stray field kernel: {}%", done * 100 / total);
    }
}

/// Compute the kernel by brute-force integration, without any caching.
pub fn calc_kernel(key: &KernelKey, accuracy: f64) -> KernelTensor {
    calc_kernel_with_progress(key, accuracy, Some(&log_progress))
}

/// Same as `calc_kernel`, reporting (done, total) through `progress`.
pub fn calc_kernel_with_progress(
    key: &KernelKey,
    accuracy: f64,
    progress: Option<&ProgressFn<'_>>,
) -> KernelTensor {
    let pool = evaluate::build_pool();
    calc_kernel_on(key, accuracy, progress, pool.as_ref())
}

/// Integrate on an existing worker pool (`None`: the global rayon pool).
pub fn calc_kernel_on(
    key: &KernelKey,
    accuracy: f64,
    progress: Option<&ProgressFn<'_>>,
    pool: Option<&ThreadPool>,
) -> KernelTensor {
    sanity_check(key.input_size, key.cell_size, key.lift);
    assert!(
        accuracy > 0.0 && accuracy.is_finite(),
        "kernel: accuracy must be positive, got {}",
        accuracy
    );

    let padded = key.padded_size();
    debug!(
        "[kernel] building kernel: input={:?} padded={:?} pbc={:?} cell={:?} lift={:e}",
        key.input_size, padded, key.pbc, key.cell_size, key.lift
    );

    let t_eval = Instant::now();
    let sweep = evaluate::Sweep {
        padded,
        pbc: key.pbc,
        cell: key.cell_size,
        lift: key.lift,
        accuracy,
        progress,
    };
    let mut rows = evaluate::evaluate(&sweep, pool);
    debug!("[kernel] integration took {:.3}s", t_eval.elapsed().as_secs_f64());

    let t_sym = Instant::now();
    symmetry::reconstruct(&mut rows);
    debug!("[kernel] symmetry reconstruction took {:.3}s", t_sym.elapsed().as_secs_f64());

    KernelTensor::from_rows(rows, padded, key.is_2d())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{X, Y, Z};
    use crate::params::DEFAULT_ACCURACY;

    #[test]
    fn thin_film_self_coupling() {
        let k = compute_kernel([4, 4, 1], [0, 0, 0], [1e-9, 1e-9, 1e-9], 0.0, "");
        assert_eq!(k.size(), [8, 8, 1]);
        let xx = k.value(X, X, 0, 0, 0).unwrap();
        let yy = k.value(Y, Y, 0, 0, 0).unwrap();
        let zz = k.value(Z, Z, 0, 0, 0).unwrap();
        assert!(xx < 0.0, "self-demag must oppose m: {}", xx);
        assert_eq!(xx, yy);
        assert!(zz < 0.0);
        assert!(k.get(X, Z).is_none() && k.get(Y, Z).is_none());
    }

    #[test]
    fn log_progress_tolerates_edges() {
        log_progress(0, 0);
        log_progress(0, 10);
        log_progress(10, 10);
    }

    #[test]
    #[should_panic]
    fn non_positive_accuracy_is_fatal() {
        let key = KernelKey::new([2, 2, 1], [0, 0, 0], [1.0; 3], 0.0);
        calc_kernel(&key, 0.0);
    }

    #[test]
    fn cube_self_coupling_is_about_a_third() {
        let key = KernelKey::new([1, 1, 1], [0, 0, 0], [1e-9; 3], 0.0);
        let k = calc_kernel(&key, DEFAULT_ACCURACY);
        // Point-destination, not volume-averaged: close to but not exactly -1/3.
        let xx = k.value(X, X, 0, 0, 0).unwrap() as f64;
        assert!(xx < -0.2 && xx > -0.6, "xx={}", xx);
    }
}
