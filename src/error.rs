use thiserror::Error;

use crate::fs::archive::ArchiveError;
use crate::fs::backend::BackendError;

/// Application-wide result type alias.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error types.
#[derive(Debug, Error)]
pub enum AppError {
    /// I/O errors outside of any backend (scratch cache, log files).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed or absent path, or a path of the wrong kind for the operation.
    #[error("Invalid path: {0}")]
    Path(String),

    /// List/read failure reported by a backend.
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// Archive open, parse, lookup or extraction failure.
    #[error("Archive error: {0}")]
    Archive(#[from] ArchiveError),

    /// A collaborator the caller relies on is missing.
    #[error("Internal error: {0}")]
    InternalState(String),

    /// Logging or configuration setup failure.
    #[error("Configuration error: {0}")]
    Config(String),
}
