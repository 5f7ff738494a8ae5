// src/lib.rs

pub mod config;
pub mod error;
pub mod grid;
pub mod kernel;
pub mod ovf;
pub mod params;
pub mod visualisation;

pub use error::{KernelError, Result};
pub use kernel::{compute_kernel, KernelCache, KernelTensor};
pub use params::KernelKey;
