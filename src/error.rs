// src/error.rs
//
// Recoverable errors. Geometry mistakes are not in here: those are caller bugs
// and trip an assertion in `grid::sanity_check`.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum KernelError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{path:?}: missing header line `{key}`")]
    MissingHeader { path: PathBuf, key: &'static str },

    #[error("{path:?}: cannot parse header `{key}` = {value:?}")]
    BadHeader {
        path: PathBuf,
        key: String,
        value: String,
    },

    #[error("{path:?}: {field} mismatch: expected {expected}, found {found}")]
    Mismatch {
        path: PathBuf,
        field: &'static str,
        expected: String,
        found: String,
    },

    #[error("{path:?}: bad binary4 check value {found}")]
    BadCheckValue { path: PathBuf, found: f32 },

    #[error("{path:?}: data truncated (expected {expected} values)")]
    Truncated { path: PathBuf, expected: usize },

    #[error("kernel is missing component {component}")]
    MissingComponent { component: &'static str },

    #[error("configuration error: {0}")]
    Config(String),
}

impl KernelError {
    /// True when the error just means "nothing cached yet".
    pub fn is_not_found(&self) -> bool {
        matches!(self, KernelError::Io(e) if e.kind() == std::io::ErrorKind::NotFound)
    }
}

pub type Result<T> = std::result::Result<T, KernelError>;
