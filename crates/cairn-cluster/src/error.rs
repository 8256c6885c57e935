//! Error types for the cluster subsystem.

use thiserror::Error;

/// Result type alias for cluster operations.
pub type ClusterResult<T> = Result<T, ClusterError>;

/// Errors that can occur talking to peers.
///
/// `NotFound` is an expected read outcome and must stay distinguishable
/// from transport failures; callers branch on it.
#[derive(Debug, Error)]
pub enum ClusterError {
    /// The peer does not hold the requested object.
    #[error("object not found on peer")]
    NotFound,

    /// The peer id is not part of the current membership view.
    #[error("unknown peer: {id}")]
    UnknownPeer {
        /// The peer id that was not found.
        id: String,
    },

    /// The RPC failed in transit.
    #[error("transport error: {0}")]
    Transport(String),
}
