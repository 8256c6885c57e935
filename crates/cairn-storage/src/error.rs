//! Error types for the storage subsystem.

use thiserror::Error;

/// Result type alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur in the local byte area or the remote bucket.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Wraps standard I/O errors.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The requested object does not exist in this backend.
    #[error("object not found: {id}")]
    NotFound {
        /// The object id that was not found.
        id: String,
    },

    /// The object id failed boundary validation.
    #[error("invalid object id: {id:?}")]
    InvalidId {
        /// The rejected id.
        id: String,
    },

    /// The backend refused an access probe.
    #[error("access check failed: {reason}")]
    AccessDenied {
        /// Why the probe failed.
        reason: String,
    },
}
