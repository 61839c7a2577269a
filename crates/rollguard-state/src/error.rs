//! Error types for the Rollguard state store.

use thiserror::Error;

/// Result type alias for state store operations.
pub type StateResult<T> = Result<T, StateError>;

/// Errors that can occur during state store operations.
#[derive(Debug, Error)]
pub enum StateError {
    /// The backing database could not be opened, read, or written.
    /// No mutation should be assumed to have happened.
    #[error("state store unavailable: {0}")]
    Unavailable(String),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("deserialization error: {0}")]
    Deserialize(String),

    /// A compare-and-swap write found a different revision than expected.
    #[error("revision conflict for {key}: expected {expected:?}, found {found:?}")]
    RevisionConflict {
        key: String,
        expected: Option<u64>,
        found: Option<u64>,
    },
}

impl StateError {
    /// Whether the error means the store itself could not be reached.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, StateError::Unavailable(_))
    }
}
