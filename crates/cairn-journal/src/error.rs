//! Error types for the journal subsystem.

use thiserror::Error;

/// Result type alias for journal operations.
pub type JournalResult<T> = Result<T, JournalError>;

/// Errors that can occur while tracking or mutating journals.
#[derive(Debug, Error)]
pub enum JournalError {
    /// No journal is tracked for the given owner.
    #[error("unknown journal: {owner}")]
    UnknownJournal {
        /// The owner id that has no journal.
        owner: String,
    },

    /// The owner id failed boundary validation.
    #[error("invalid journal owner id: {reason}")]
    InvalidOwner {
        /// Why the id was rejected.
        reason: String,
    },

    /// A caller-supplied mutation reported a failure.
    #[error("journal mutation failed: {0}")]
    Mutation(String),
}
