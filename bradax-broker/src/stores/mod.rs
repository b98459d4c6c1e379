//! Read-mostly JSON-backed stores.
//!
//! Both stores validate their contents at startup and refuse to continue on
//! integrity violations. Writes go through the atomic temp-file + fsync +
//! rename path in [`fsio`], so readers always observe a consistent snapshot.

pub mod fsio;
pub mod models;
pub mod projects;

pub use models::{ModelCatalog, ModelInfo};
pub use projects::{Project, ProjectStatus, ProjectStore};

use std::path::PathBuf;

use thiserror::Error;

/// Failures raised by the JSON stores.
#[derive(Debug, Error)]
pub enum StoreError {
    /// File could not be read or written.
    #[error("store file {path}: {source}")]
    Io {
        /// Offending path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// File contents are not the expected JSON shape.
    #[error("store file {path} is not valid JSON: {source}")]
    Parse {
        /// Offending path.
        path: PathBuf,
        /// Underlying parse error.
        source: serde_json::Error,
    },

    /// Contents parsed but violate an invariant.
    #[error("store integrity violation: {message}")]
    Integrity {
        /// What was violated.
        message: String,
    },
}
