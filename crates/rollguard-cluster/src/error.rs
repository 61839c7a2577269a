//! Cluster query errors.

use thiserror::Error;

/// Result type alias for cluster queries.
pub type ClusterResult<T> = Result<T, ClusterError>;

/// A platform query failed. Auth, not-found and transport failures are
/// deliberately not distinguished at this layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClusterError {
    #[error("platform query failed: {0}")]
    Query(String),
}
