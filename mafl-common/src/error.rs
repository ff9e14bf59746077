//! Common error types for MAFL

use std::path::PathBuf;
use thiserror::Error;

/// Common result type for MAFL operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across MAFL tools
#[derive(Error, Debug)]
pub enum Error {
    /// Image discovery root does not exist
    #[error("Discovery error: root path does not exist: {}", .path.display())]
    Discovery { path: PathBuf },

    /// Malformed row in a score file
    #[error("Score parse error in {} at line {line} ({row:?}): {reason}", .path.display())]
    ScoreParse {
        path: PathBuf,
        line: u64,
        row: String,
        reason: String,
    },

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
