//! Error types for mafl-vote
//!
//! Startup errors (discovery, score parsing, configuration) come through
//! [`VoteError::Common`] and abort the run. Command failures are collected per
//! phase and surfaced together as [`VoteError::BatchFailed`].

use crate::strategy::FusionStrategy;
use mafl_common::SimilarityMetric;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for mafl-vote operations
pub type Result<T> = std::result::Result<T, VoteError>;

/// Execution phase of a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Template label cache extraction (once per run)
    Extract,
    /// Per-target label resampling
    Resample,
    /// Per-target voting
    Vote,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Extract => "extract",
            Phase::Resample => "resample",
            Phase::Vote => "vote",
        };
        f.write_str(name)
    }
}

/// Why a single command failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    /// Process ran and exited unsuccessfully; `code` is `None` when killed by a signal
    Exit { code: Option<i32>, stderr: String },
    /// Process could not be started (e.g. executable not found)
    Spawn { message: String },
    /// Output directory could not be created
    Prepare { message: String },
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Exit { code: Some(code), stderr } if stderr.is_empty() => {
                write!(f, "exited with status {}", code)
            }
            FailureReason::Exit { code: Some(code), stderr } => {
                write!(f, "exited with status {}: {}", code, stderr)
            }
            FailureReason::Exit { code: None, .. } => f.write_str("terminated by signal"),
            FailureReason::Spawn { message } => write!(f, "failed to start: {}", message),
            FailureReason::Prepare { message } => {
                write!(f, "failed to prepare output directory: {}", message)
            }
        }
    }
}

/// A failed external command
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("`{invocation}` {reason}")]
pub struct CommandFailure {
    pub invocation: String,
    pub reason: FailureReason,
}

/// mafl-vote error type
#[derive(Debug, Error)]
pub enum VoteError {
    /// Discovery, score parsing or configuration error
    #[error(transparent)]
    Common(#[from] mafl_common::Error),

    /// One or more commands of a phase failed after the phase drained
    #[error("{phase} phase failed: {} of {total} command(s) failed", .failures.len())]
    BatchFailed {
        phase: Phase,
        total: usize,
        failures: Vec<CommandFailure>,
    },

    /// Temporary directory allocation or cleanup failed
    ///
    /// Only the error kind is shown; tempfile's own message repeats the path.
    #[error("Workspace error at {}: {}", .path.display(), .source.kind())]
    Workspace {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// No (atlas, template) pair contributes to a strategy's vote
    #[error("Nothing to fuse for target {target} with {strategy}: no atlas/template pairs")]
    EmptyPlan {
        strategy: FusionStrategy,
        target: String,
    },

    /// A top-N strategy needs a score table that was not loaded
    #[error("No score table loaded for metric {0}")]
    MissingScores(SimilarityMetric),

    /// I/O operation error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl VoteError {
    /// Failed commands carried by a batch failure (empty otherwise)
    pub fn failures(&self) -> &[CommandFailure] {
        match self {
            VoteError::BatchFailed { failures, .. } => failures,
            _ => &[],
        }
    }
}
