use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("unknown domain '{0}'")]
    UnknownDomain(String),

    #[error("embedding failed: {0}")]
    Embedding(String),

    #[error("no index at {}", .0.display())]
    IndexNotFound(PathBuf),

    #[error("index at {} is corrupt: {reason}", path.display())]
    IndexCorrupt { path: PathBuf, reason: String },

    #[error("vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("generation failed: {0}")]
    Generation(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("cannot read source {}: {reason}", path.display())]
    Source { path: PathBuf, reason: String },

    #[error("storage error: {0}")]
    Storage(String),

    /// A background worker panicked or was cancelled.
    #[error("background task failed: {0}")]
    Task(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Errors after which rebuilding the index from its source may help.
    pub fn is_index_unusable(&self) -> bool {
        matches!(self, Error::IndexNotFound(_) | Error::IndexCorrupt { .. })
    }

    pub fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Error::IndexCorrupt { path: path.into(), reason: reason.into() }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
