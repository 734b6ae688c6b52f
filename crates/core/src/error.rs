//! Error types shared across the demo crates.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type for configuration, IO and windowing failures.
///
/// GPU-side failures have their own taxonomy in `vkdemo_rhi::RhiError`.
#[derive(Error, Debug)]
pub enum Error {
    /// Window creation or management errors
    #[error("Window error: {0}")]
    Window(String),

    /// Surface creation for a window failed
    #[error("Surface error: {0}")]
    Surface(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration file exists but could not be parsed
    #[error("Config error in '{path}': {message}")]
    Config { path: PathBuf, message: String },

    /// Generic internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using the core Error type.
pub type Result<T> = std::result::Result<T, Error>;
