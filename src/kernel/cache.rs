// src/kernel/cache.rs
//
// Best-effort kernel cache.
//
// Each independent component is one OVF file whose name encodes the whole
// key. A load either yields every component or nothing: the first missing or
// inconsistent file aborts it and the kernel is recomputed (and re-saved).
// Nothing in here is allowed to fail a request with valid geometry; the worst
// case is an uncached computation.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, OnceLock};
use std::time::Instant;

use log::{debug, info, warn};
use rayon::ThreadPool;
use serde::Serialize;

use crate::config::KernelSettings;
use crate::error::{KernelError, Result};
use crate::grid::{sanity_check, Grid3D};
use crate::kernel::evaluate::build_pool;
use crate::kernel::{calc_kernel_on, log_progress};
use crate::kernel::tensor::{KernelTensor, COMPONENT_NAMES};
use crate::ovf::{read_ovf2_scalar_binary4, write_ovf2_scalar_binary4, OvfMeta};
use crate::params::KernelKey;

const DESC_LIFT: &str = "lift";
const DESC_ACCURACY: &str = "accuracy";

/// How requests have been served so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Kernels integrated from scratch.
    pub computed: usize,
    /// Kernels loaded from disk.
    pub disk_hits: usize,
    /// Kernels reused from memory.
    pub memo_hits: usize,
}

/// Owned kernel provider. Create one per solver and pass it by reference.
pub struct KernelCache {
    settings: KernelSettings,
    memo: Option<Mutex<Option<(KernelKey, KernelTensor)>>>,
    /// Integration workers, built on the first computation and reused.
    pool: OnceLock<Option<ThreadPool>>,
    computed: AtomicUsize,
    disk_hits: AtomicUsize,
    memo_hits: AtomicUsize,
    #[cfg(test)]
    fail_on_disk: bool,
}

impl KernelCache {
    /// Panics on invalid settings (non-positive accuracy).
    pub fn new(settings: KernelSettings) -> Self {
        assert!(
            settings.accuracy > 0.0 && settings.accuracy.is_finite(),
            "kernel: accuracy must be positive, got {}",
            settings.accuracy
        );
        let memo = settings.memoize.then(|| Mutex::new(None));
        Self {
            settings,
            memo,
            pool: OnceLock::new(),
            computed: AtomicUsize::new(0),
            disk_hits: AtomicUsize::new(0),
            memo_hits: AtomicUsize::new(0),
            #[cfg(test)]
            fail_on_disk: false,
        }
    }

    pub fn settings(&self) -> &KernelSettings {
        &self.settings
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            computed: self.computed.load(Ordering::Relaxed),
            disk_hits: self.disk_hits.load(Ordering::Relaxed),
            memo_hits: self.memo_hits.load(Ordering::Relaxed),
        }
    }

    /// Kernel for `key`: from memory, from disk, or freshly computed.
    ///
    /// Panics only on invalid geometry.
    pub fn get_or_compute(&self, key: &KernelKey) -> KernelTensor {
        sanity_check(key.input_size, key.cell_size, key.lift);

        let Some(memo) = &self.memo else {
            return self.load_or_compute(key);
        };

        // Held across the computation so concurrent callers don't build the
        // same kernel twice.
        let mut guard = memo.lock().unwrap_or_else(|e| e.into_inner());
        if let Some((k, tensor)) = guard.as_ref() {
            if k == key {
                self.memo_hits.fetch_add(1, Ordering::Relaxed);
                debug!("[kernel] reusing in-memory kernel");
                return tensor.clone();
            }
        }
        let tensor = self.load_or_compute(key);
        *guard = Some((*key, tensor.clone()));
        tensor
    }

    fn load_or_compute(&self, key: &KernelKey) -> KernelTensor {
        let Some(dir) = self.settings.cache_dir() else {
            info!("[kernel] not using kernel cache (no cache directory)");
            return self.compute(key);
        };

        match catch_unwind(AssertUnwindSafe(|| self.through_disk(key, dir))) {
            Ok(tensor) => tensor,
            Err(_) => {
                warn!("[kernel] unable to use kernel cache, computing without it");
                self.compute(key)
            }
        }
    }

    fn through_disk(&self, key: &KernelKey, dir: &Path) -> KernelTensor {
        #[cfg(test)]
        if self.fail_on_disk {
            panic!("injected fault in the cache path");
        }

        let accuracy = self.settings.accuracy;
        let t_load = Instant::now();
        match load_kernel(dir, key, accuracy) {
            Ok(tensor) => {
                self.disk_hits.fetch_add(1, Ordering::Relaxed);
                info!(
                    "[kernel] cache hit -> loaded kernel from {:?} in {:.3}s",
                    cache_basename(dir, key),
                    t_load.elapsed().as_secs_f64()
                );
                return tensor;
            }
            Err(e) if e.is_not_found() => {
                debug!("[kernel] cache miss: {}", e);
            }
            Err(e) => {
                warn!("[kernel] did not use cached kernel: {}", e);
            }
        }

        let tensor = self.compute(key);
        match save_kernel(dir, key, accuracy, &tensor) {
            Ok(()) => info!("[kernel] cached kernel to {:?}", cache_basename(dir, key)),
            Err(e) => warn!("[kernel] failed to cache kernel: {}", e),
        }
        tensor
    }

    fn compute(&self, key: &KernelKey) -> KernelTensor {
        self.computed.fetch_add(1, Ordering::Relaxed);
        let t = Instant::now();
        let pool = self.pool.get_or_init(build_pool).as_ref();
        let tensor = calc_kernel_on(key, self.settings.accuracy, Some(&log_progress), pool);
        info!("[kernel] built kernel in {:.3}s", t.elapsed().as_secs_f64());
        tensor
    }
}

fn fmt_size(v: [usize; 3]) -> String {
    format!("{}x{}x{}", v[0], v[1], v[2])
}

/// Common prefix of every cache file for `key`. Floats use the shortest
/// representation that round-trips, so distinct keys give distinct names.
pub fn cache_basename(dir: &Path, key: &KernelKey) -> PathBuf {
    let c = key.cell_size;
    dir.join(format!(
        "strayfield_kernel_{}_pbc{}_cell{:e}x{:e}x{:e}_lift{:e}_",
        fmt_size(key.input_size),
        fmt_size(key.pbc),
        c[0],
        c[1],
        c[2],
        key.lift
    ))
}

/// Cache file for component (i, j).
pub fn component_path(dir: &Path, key: &KernelKey, i: usize, j: usize) -> PathBuf {
    let mut name = cache_basename(dir, key).into_os_string();
    name.push(format!("{}{}.ovf", i, j));
    PathBuf::from(name)
}

fn mismatch(path: &Path, field: &'static str, expected: String, found: String) -> KernelError {
    KernelError::Mismatch {
        path: path.to_path_buf(),
        field,
        expected,
        found,
    }
}

fn desc_f64(path: &Path, meta: &OvfMeta, key: &'static str) -> Result<f64> {
    let raw = meta.desc_value(key).ok_or(KernelError::MissingHeader {
        path: path.to_path_buf(),
        key,
    })?;
    raw.parse::<f64>().map_err(|_| KernelError::BadHeader {
        path: path.to_path_buf(),
        key: key.to_string(),
        value: raw.to_string(),
    })
}

/// Load and validate one component file.
fn load_component(
    dir: &Path,
    key: &KernelKey,
    accuracy: f64,
    i: usize,
    j: usize,
) -> Result<Grid3D> {
    let path = component_path(dir, key, i, j);
    let padded = key.padded_size();
    let (grid, meta) = read_ovf2_scalar_binary4(&path, Some(padded))?;

    let name = COMPONENT_NAMES[i][j];
    if meta.name != name {
        return Err(mismatch(&path, "title", name.to_string(), meta.name));
    }
    if meta.unit != "1" || meta.mesh_unit != "m" {
        return Err(mismatch(
            &path,
            "units",
            "1 / m".to_string(),
            format!("{} / {}", meta.unit, meta.mesh_unit),
        ));
    }
    let same_cell = meta
        .cell_size
        .iter()
        .zip(key.cell_size.iter())
        .all(|(a, b)| a.to_bits() == b.to_bits());
    if !same_cell {
        return Err(mismatch(
            &path,
            "cell size",
            format!("{:?}", key.cell_size),
            format!("{:?}", meta.cell_size),
        ));
    }
    let lift = desc_f64(&path, &meta, DESC_LIFT)?;
    if lift.to_bits() != key.lift.to_bits() {
        return Err(mismatch(&path, "lift", format!("{:e}", key.lift), format!("{:e}", lift)));
    }
    let acc = desc_f64(&path, &meta, DESC_ACCURACY)?;
    if acc.to_bits() != accuracy.to_bits() {
        return Err(mismatch(&path, "accuracy", format!("{:e}", accuracy), format!("{:e}", acc)));
    }
    Ok(grid)
}

/// Load every stored component for `key`, or fail on the first problem.
pub fn load_kernel(dir: &Path, key: &KernelKey, accuracy: f64) -> Result<KernelTensor> {
    let mut upper: [[Option<Grid3D>; 3]; 3] = Default::default();
    for i in 0..3 {
        for j in i..3 {
            if !key.has_component(i, j) {
                continue;
            }
            upper[i][j] = Some(load_component(dir, key, accuracy, i, j)?);
        }
    }
    Ok(KernelTensor::from_upper(upper, key.padded_size()))
}

/// Write every stored component of `tensor`, stopping at the first error.
/// Nothing is written unless the tensor holds every component `key` needs.
pub fn save_kernel(dir: &Path, key: &KernelKey, accuracy: f64, tensor: &KernelTensor) -> Result<()> {
    let mut grids = Vec::with_capacity(6);
    for i in 0..3 {
        for j in i..3 {
            if !key.has_component(i, j) {
                continue;
            }
            let grid = tensor.get(i, j).ok_or(KernelError::MissingComponent {
                component: COMPONENT_NAMES[i][j],
            })?;
            grids.push((i, j, grid));
        }
    }

    for (i, j, grid) in grids {
        let meta = OvfMeta::kernel_component(COMPONENT_NAMES[i][j], key.cell_size)
            .with_desc(DESC_LIFT, format!("{:e}", key.lift))
            .with_desc(DESC_ACCURACY, format!("{:e}", accuracy));
        write_ovf2_scalar_binary4(&component_path(dir, key, i, j), grid, &meta)?;
    }
    Ok(())
}
