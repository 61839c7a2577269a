//! Reconciliation error types.

use thiserror::Error;

use rollguard_cluster::ClusterError;
use rollguard_state::{DeploymentStatus, StateError};

/// Errors that stop a reconciliation step before anything is persisted.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("deployment not found: {0}")]
    NotFound(String),

    #[error("deployment already exists: {0}")]
    AlreadyExists(String),

    #[error("cannot {action} deployment {deployment_id} in status {status}")]
    InvalidTransition {
        deployment_id: String,
        action: &'static str,
        status: DeploymentStatus,
    },

    #[error("state store error: {0}")]
    Store(#[from] StateError),

    #[error("platform error: {0}")]
    Platform(#[from] ClusterError),
}

impl ReconcileError {
    /// Whether retrying the same step later may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            ReconcileError::Store(e) => {
                e.is_unavailable() || matches!(e, StateError::RevisionConflict { .. })
            }
            ReconcileError::Platform(_) => true,
            ReconcileError::NotFound(_)
            | ReconcileError::AlreadyExists(_)
            | ReconcileError::InvalidTransition { .. } => false,
        }
    }
}

pub type ReconcileResult<T> = Result<T, ReconcileError>;
