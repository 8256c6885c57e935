//! Error types for the coordination engine.

use thiserror::Error;

use cairn_cluster::ClusterError;
use cairn_journal::JournalError;
use cairn_storage::StorageError;

/// Result type alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors surfaced by the coordination engine.
///
/// `NotFound` is the sole expected outcome for reads; everything else is
/// a fault in a collaborator or in the request itself. Local and remote
/// storage failures stay separate variants so callers can tell which
/// side of a write gave out.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Object absent locally, on every peer, or at the remote bucket.
    #[error("object not found")]
    NotFound,

    /// A collaborator refused its access probe at construction.
    #[error("access check failed: {0}")]
    Access(String),

    /// Invalid node id, object id, or construction parameter.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A journal operation failed.
    #[error("journal error: {0}")]
    Journal(#[from] JournalError),

    /// The local byte area failed.
    #[error("local store failed: {0}")]
    Local(#[source] StorageError),

    /// The remote bucket failed.
    #[error("remote store failed: {0}")]
    Remote(#[source] StorageError),

    /// A peer RPC failed.
    #[error("cluster error: {0}")]
    Cluster(#[from] ClusterError),
}
