// src/config.rs
//
// Kernel settings injected by the caller (cache location, integration
// accuracy) and the run record written next to CLI outputs.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{KernelError, Result};
use crate::params::{KernelKey, DEFAULT_ACCURACY};

pub const ENV_CACHE_DIR: &str = "STRAYFIELD_CACHE_DIR";
pub const ENV_ACCURACY: &str = "STRAYFIELD_ACCURACY";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelSettings {
    /// Directory for cached kernel files. `None` disables the disk cache.
    pub cache_dir: Option<PathBuf>,
    /// Integration accuracy (sub-cell size = distance / accuracy).
    pub accuracy: f64,
    /// Keep the most recent kernel in memory and reuse it for the same key.
    pub memoize: bool,
}

impl Default for KernelSettings {
    fn default() -> Self {
        Self {
            cache_dir: None,
            accuracy: DEFAULT_ACCURACY,
            memoize: true,
        }
    }
}

impl KernelSettings {
    /// Load settings from a JSON file; missing fields take their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let settings: Self = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| KernelError::Config(format!("{}: {}", path.display(), e)))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Apply `STRAYFIELD_CACHE_DIR` (empty string disables the cache) and
    /// `STRAYFIELD_ACCURACY`.
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides(
            std::env::var(ENV_CACHE_DIR).ok().as_deref(),
            std::env::var(ENV_ACCURACY).ok().as_deref(),
        )
    }

    fn with_overrides(mut self, cache_dir: Option<&str>, accuracy: Option<&str>) -> Result<Self> {
        if let Some(dir) = cache_dir {
            let dir = dir.trim();
            self.cache_dir = if dir.is_empty() {
                None
            } else {
                Some(PathBuf::from(dir))
            };
        }
        if let Some(acc) = accuracy {
            self.accuracy = acc.trim().parse::<f64>().map_err(|_| {
                KernelError::Config(format!("{}={:?} is not a number", ENV_ACCURACY, acc))
            })?;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.accuracy > 0.0 && self.accuracy.is_finite()) {
            return Err(KernelError::Config(format!(
                "accuracy must be positive and finite, got {}",
                self.accuracy
            )));
        }
        Ok(())
    }

    /// The cache directory, if caching is enabled.
    pub fn cache_dir(&self) -> Option<&Path> {
        self.cache_dir
            .as_deref()
            .filter(|p| !p.as_os_str().is_empty())
    }
}

#[derive(Serialize)]
pub struct RunConfig {
    pub geometry: KernelKey,
    pub padded_size: [usize; 3],
    pub settings: KernelSettings,
    pub run: RunInfo,
}

#[derive(Serialize)]
pub struct RunInfo {
    pub binary: String,
    pub elapsed_s: f64,
    pub cache_stats: crate::kernel::CacheStats,
}

impl RunConfig {
    pub fn write_to_dir(&self, out_dir: &Path) -> Result<()> {
        std::fs::create_dir_all(out_dir)?;
        let path = out_dir.join("config.json");
        let file = File::create(path)?;
        serde_json::to_writer_pretty(file, self)
            .map_err(|e| KernelError::Config(format!("writing config.json: {}", e)))?;
        Ok(())
    }
}
