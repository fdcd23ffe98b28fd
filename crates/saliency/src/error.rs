//! Error types for explanation runs, configuration and result export.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub use saliency_core::SaliencyError;

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Configuration could not be loaded or is out of range.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Reading the configuration file failed.
    #[error("failed to read config {path}: {source}")]
    Io {
        /// File that was read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The file is not valid JSON for [`Config`](crate::Config).
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    /// A field is outside its valid range.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Writing records or tensors failed.
#[derive(Error, Debug)]
pub enum OutputError {
    /// Filesystem error.
    #[error("output I/O failed: {0}")]
    Io(#[from] io::Error),

    /// Tensor or summary serialization failed.
    #[error("serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// Any failure of the orchestration layer.
#[derive(Error, Debug)]
pub enum Error {
    /// Sampling, statistics or convergence loop failure.
    #[error(transparent)]
    Core(#[from] SaliencyError),

    /// Configuration failure.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Export failure.
    #[error(transparent)]
    Output(#[from] OutputError),
}
