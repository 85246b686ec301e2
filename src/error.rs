//! Error taxonomy for the execution and harvest pipeline.
//!
//! Only [`SessionError`] may fail a whole request. Execution-level failures are
//! folded into the response payload, and artifact-level failures are collected
//! per item alongside whatever succeeded.

use thiserror::Error;

/// Raised by the execution backend client.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The backend does not know the given session identity (expired or paused
    /// beyond recovery, or never existed).
    #[error("session not found")]
    NotFound,

    /// The run exceeded its time budget.
    #[error("execution timed out after {budget_secs}s")]
    Timeout { budget_secs: u64 },

    /// Transport or protocol failure talking to the backend.
    #[error("backend fault: {0}")]
    Fault(String),
}

/// Session acquisition failed for good: connect, resume, and recreate all failed.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session exhausted: {0}")]
    Exhausted(String),
}

/// Failure running code in a confirmed session.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// The session died between acquisition and execution. Retried exactly once
    /// by re-acquiring through the broker; a second occurrence escalates to
    /// [`SessionError::Exhausted`].
    #[error("session became unusable")]
    SessionUnusable,

    /// The run hit its time budget. Surfaced inside the execution result, not
    /// as a request failure, so captured output is kept.
    #[error("execution timed out after {budget_secs}s")]
    Timeout { budget_secs: u64 },

    #[error("backend fault: {0}")]
    BackendFault(String),
}

/// Object storage failure.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("transient storage error: {0}")]
    Transient(String),

    #[error("permanent storage error: {0}")]
    Permanent(String),
}

/// Per-artifact failure during a harvest pass. Never aborts the rest of the pass.
#[derive(Debug, Error)]
pub enum ArtifactError {
    /// File claims a container format but its leading bytes do not match the
    /// format's signature.
    #[error("corrupted artifact: {0}")]
    Corrupted(String),

    #[error("failed to read artifact: {0}")]
    ReadFailed(String),

    #[error("failed to upload artifact: {0}")]
    UploadFailed(String),

    /// Uploaded fine but could not be removed from the session filesystem.
    #[error("failed to clean up artifact: {0}")]
    CleanupFailed(String),
}

impl ArtifactError {
    /// Stable machine-readable discriminant for response payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            ArtifactError::Corrupted(_) => "corrupted",
            ArtifactError::ReadFailed(_) => "read_failed",
            ArtifactError::UploadFailed(_) => "upload_failed",
            ArtifactError::CleanupFailed(_) => "cleanup_failed",
        }
    }
}
