//! Error types for lucidshark-audit

use std::time::Duration;
use thiserror::Error;

/// Result type alias for audit operations
pub type Result<T> = std::result::Result<T, AuditError>;

/// Run-level error types
///
/// Errors local to one file or one analyzer never surface here; they are
/// recovered in place (a failed hash marks the file modified, a failed
/// analyzer is recorded in the bundle). Only errors that prevent
/// establishing a valid change-set abort the whole run.
#[derive(Error, Debug)]
pub enum AuditError {
    /// Fingerprinting failed project-wide; no analyzer has executed
    #[error("Project scan failed: {0}")]
    ScanFailed(String),

    /// The index directory or index document cannot be written
    #[error("Index storage error at '{path}': {reason}")]
    IndexStorage { path: String, reason: String },

    /// Invalid configuration provided
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Cache directory error (creation or sweep)
    #[error("Cache error: {0}")]
    CacheError(String),

    /// I/O error during file operations
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors produced by (or imposed on) a single analyzer invocation
///
/// These are contained to that analyzer: the coordinator records the
/// failure in the bundle and siblings keep running.
#[derive(Error, Debug)]
pub enum AnalysisError {
    /// The invocation exceeded its timeout and was cancelled
    #[error("Analyzer timed out after {0:?}")]
    Timeout(Duration),

    /// The adapter panicked or its task was aborted
    #[error("Analyzer crashed: {0}")]
    Crash(String),

    /// The adapter reported a failure (tool missing, bad output, ...)
    #[error("Analysis failed: {0}")]
    Failed(String),

    /// I/O error inside the adapter
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
