// src/main.rs
//
// Build (or load) a stray-field kernel for one geometry and report on it.
//
// Examples:
//
//   cargo run --release -- --size 64,64,1 --cell 4e-9,4e-9,2e-9 --cache-dir kernels
//       -> computes the kernel once, later runs load it from kernels/
//
//   cargo run --release -- --size 32,32,4 --pbc 2,2,0 --lift 5e-8 --plot --out runs/lifted
//       -> periodic in-plane kernel at a 50 nm observation height,
//          with heatmaps of every component's z=0 plane
//
// Outputs (per --out directory):
//   <out>/
//     ├── config.json
//     └── N_ij_z0.png        (if --plot is set)

use std::path::PathBuf;
use std::time::Instant;

use clap::Parser;
use log::{error, info};

use strayfield_kernel::config::{KernelSettings, RunConfig, RunInfo};
use strayfield_kernel::grid::{X, Y, Z};
use strayfield_kernel::kernel::tensor::COMPONENT_NAMES;
use strayfield_kernel::visualisation::save_kernel_slice_plot;
use strayfield_kernel::{KernelCache, KernelKey};

#[derive(Parser)]
#[command(name = "strayfield-kernel")]
#[command(about = "Compute or load a magnetostatic stray-field kernel", long_about = None)]
#[command(version)]
struct Cli {
    /// Logical grid size NX,NY,NZ
    #[arg(long, value_delimiter = ',', required = true)]
    size: Vec<usize>,

    /// Periodic image counts PX,PY,PZ (0 = open)
    #[arg(long, value_delimiter = ',', default_values_t = [0usize, 0, 0])]
    pbc: Vec<usize>,

    /// Cell size CX,CY,CZ in metres
    #[arg(long, value_delimiter = ',', required = true)]
    cell: Vec<f64>,

    /// Observation height above the source plane, in metres
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    lift: f64,

    /// JSON settings file (cache_dir, accuracy, memoize)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Kernel cache directory; an empty string disables caching
    #[arg(long, value_name = "DIR")]
    cache_dir: Option<String>,

    /// Integration accuracy (default 6)
    #[arg(long)]
    accuracy: Option<f64>,

    /// Output directory for config.json and plots
    #[arg(long, default_value = "runs/kernel")]
    out: PathBuf,

    /// Save z=0 heatmaps of every stored component
    #[arg(long)]
    plot: bool,
}

fn to3<T: Copy>(name: &str, v: &[T]) -> [T; 3] {
    match v {
        [a, b, c] => [*a, *b, *c],
        _ => {
            error!("--{} takes exactly three comma-separated values, got {}", name, v.len());
            std::process::exit(2);
        }
    }
}

fn load_settings(cli: &Cli) -> strayfield_kernel::Result<KernelSettings> {
    let mut settings = match &cli.config {
        Some(path) => KernelSettings::from_json_file(path)?,
        None => KernelSettings::default(),
    }
    .with_env_overrides()?;

    if let Some(dir) = &cli.cache_dir {
        settings.cache_dir = if dir.is_empty() {
            None
        } else {
            Some(PathBuf::from(dir))
        };
    }
    if let Some(acc) = cli.accuracy {
        settings.accuracy = acc;
    }
    settings.validate()?;
    Ok(settings)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let settings = match load_settings(&cli) {
        Ok(s) => s,
        Err(e) => {
            error!("{}", e);
            std::process::exit(2);
        }
    };

    let key = KernelKey::new(
        to3("size", &cli.size),
        to3("pbc", &cli.pbc),
        to3("cell", &cli.cell),
        cli.lift,
    );
    info!(
        "[kernel] size={:?} pbc={:?} cell={:?} lift={:e} accuracy={}",
        key.input_size, key.pbc, key.cell_size, key.lift, settings.accuracy
    );

    let cache = KernelCache::new(settings.clone());
    let t0 = Instant::now();
    let kernel = cache.get_or_compute(&key);
    let elapsed = t0.elapsed().as_secs_f64();

    println!("padded size: {:?}", kernel.size());
    for (i, j) in [(X, X), (Y, Y), (Z, Z), (X, Y), (X, Z), (Y, Z)] {
        match kernel.value(i, j, 0, 0, 0) {
            Some(v) => println!("{}(0) = {:+.8e}", COMPONENT_NAMES[i][j], v),
            None => println!("{}    (not stored for this geometry)", COMPONENT_NAMES[i][j]),
        }
    }
    println!("elapsed: {:.3}s", elapsed);

    let run = RunConfig {
        geometry: key,
        padded_size: kernel.size(),
        settings,
        run: RunInfo {
            binary: "strayfield-kernel".to_string(),
            elapsed_s: elapsed,
            cache_stats: cache.stats(),
        },
    };
    run.write_to_dir(&cli.out)?;

    if cli.plot {
        for i in 0..3 {
            for j in i..3 {
                if let Some(grid) = kernel.get(i, j) {
                    let path = cli.out.join(format!("{}_z0.png", COMPONENT_NAMES[i][j]));
                    save_kernel_slice_plot(grid, 0, &path)?;
                    info!("[kernel] wrote {:?}", path);
                }
            }
        }
    }

    Ok(())
}
