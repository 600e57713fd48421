use std::path::PathBuf;

use thiserror::Error;

/// Failure taxonomy for the ingestion/deletion pipeline. Anything that
/// happens *after* the authoritative database commit is not an error at all:
/// it is reported as a warning on a successful outcome.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Missing required field, unrecognized required category, or a
    /// malformed input file. Surfaced before any side effect.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Identifier collision or an exhausted identifier range. No partial
    /// writes.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Caller is neither the owner nor an admin.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Database constraint violation or storage-layer failure during
    /// assembly; the enclosing transaction is rolled back.
    #[error("database integrity error")]
    Integrity(#[from] rusqlite::Error),

    /// File move/copy failure before the database commit; any already-moved
    /// artifact has been cleaned up.
    #[error("i/o failure on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PipelineError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;
