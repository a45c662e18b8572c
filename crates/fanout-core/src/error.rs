//! Error handling for batch dispatch.

use std::path::PathBuf;

use thiserror::Error;

/// Result type for dispatch operations.
pub type DispatchResult<T> = Result<T, DispatchError>;

/// Errors that can occur while batching, queueing or submitting commands.
#[derive(Error, Debug)]
pub enum DispatchError {
    /// Invalid configuration (bad chunk size, unknown queue without
    /// overrides, malformed walltime). Nothing is written when this is
    /// raised.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Resume was requested for a batch UID that was never launched.
    #[error("Batch not found: {0}")]
    BatchNotFound(String),

    /// The queue file is missing or malformed. Fatal, never retried.
    #[error("Queue store corrupted at {path}: {detail}")]
    StoreCorruption { path: PathBuf, detail: String },

    /// Illegal record state transition (only RUNNING -> DONE is legal for
    /// completion).
    #[error("Invalid state transition for record {id}: {from} is not running")]
    InvalidTransition { id: usize, from: String },

    /// The queue file lock could not be acquired within the retry budget.
    #[error("Could not lock {path} after {attempts} attempts")]
    LockTimeout { path: PathBuf, attempts: u32 },

    /// Scheduler submission failed for one script. Remaining scripts are
    /// still submitted.
    #[error("Submission failed for {script}: {message}")]
    Submit { script: PathBuf, message: String },

    /// An external command exceeded its deadline.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
