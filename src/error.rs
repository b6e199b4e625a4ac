//! Error types for the memory engine.

use std::path::PathBuf;
use thiserror::Error;

/// Engine error type.
#[derive(Error, Debug)]
pub enum MemoryError {
    /// Input rejected before it reached the store.
    #[error("Validation error: {0}")]
    Validation(String),

    /// An operation referenced an id that is not in the store.
    #[error("Memory not found: {0}")]
    NotFound(String),

    /// A numeric argument outside its allowed range.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Persistence failed and could not be recovered locally.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// The embedding backend could not produce vectors.
    #[error("Embedding unavailable: {0}")]
    EmbeddingUnavailable(#[from] EmbeddingError),
}

/// Persistence failures raised by a [`crate::persistence::MemoryRepository`].
#[derive(Error, Debug)]
pub enum StorageError {
    /// Filesystem failure on a specific path.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// File that was being read or written.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Stored data parsed but does not have the expected shape.
    #[error("Corrupt store: {0}")]
    Corrupt(String),

    /// Remote database failure.
    #[error("Database error: {0}")]
    Database(String),

    /// A failed write could not be rolled back from the backup.
    #[error("Restore from backup failed after write error ({write}): {restore}")]
    RestoreFailed {
        /// The error that triggered the restore.
        write: String,
        /// The error raised by the restore itself.
        restore: String,
    },
}

impl StorageError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<surrealdb::Error> for StorageError {
    fn from(err: surrealdb::Error) -> Self {
        Self::Database(err.to_string())
    }
}

/// Failures of an [`crate::runtime::embedding::EmbeddingProvider`].
#[derive(Error, Debug)]
pub enum EmbeddingError {
    /// The model could not be initialized.
    #[error("Model load failed: {0}")]
    ModelLoad(String),

    /// The model was loaded but inference failed.
    #[error("Inference failed: {0}")]
    Inference(String),

    /// The backend returned fewer vectors than inputs.
    #[error("Expected {expected} embeddings, got {actual}")]
    EmptyOutput {
        /// Number of input texts.
        expected: usize,
        /// Number of vectors returned.
        actual: usize,
    },

    /// The blocking inference task panicked or was cancelled.
    #[error("Embedding task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, MemoryError>;
