//! Deployment state machine — pure transitions over a record.
//!
//! Each function takes the last persisted record and returns the record
//! to persist next. Nothing here touches the store or the cluster; the
//! engine feeds in health results and resolved versions.
//!
//! ```text
//! Pending ──accept──▶ InProgress ──healthy──▶ Success
//!                      │  ▲
//!                      │  └── failed check, budget left (retry_count += 1)
//!                      ▼
//!                    Failed ──escalate──▶ RollingBack ──healthy──▶ RolledBack
//!                      │                    │
//!                      ▼                    ▼
//!               Failed (unrecoverable) ◀── unhealthy
//! ```

use rollguard_state::{DeploymentRecord, DeploymentStatus, FailureType, UnrecoverableReason};

use crate::error::{ReconcileError, ReconcileResult};
use crate::policy::ReconcilerConfig;

/// What the caller should make of a record's current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Pending,
    InProgress,
    Succeeded,
    /// Retry budget spent; the escalation check has not run yet.
    AwaitingEscalation,
    RollingBack,
    RolledBack,
    /// Failed with no automatic way forward.
    Unrecoverable(UnrecoverableReason),
    /// The rollback never became healthy. Needs a human.
    RollbackFailed,
    /// The caller cancelled; the record is unchanged.
    Cancelled,
}

impl Disposition {
    /// Classify a persisted record.
    pub fn of(record: &DeploymentRecord) -> Self {
        match (record.status, record.unrecoverable) {
            (DeploymentStatus::Pending, _) => Disposition::Pending,
            (DeploymentStatus::InProgress, _) => Disposition::InProgress,
            (DeploymentStatus::Success, _) => Disposition::Succeeded,
            (DeploymentStatus::RollingBack, _) => Disposition::RollingBack,
            (DeploymentStatus::RolledBack, _) => Disposition::RolledBack,
            (DeploymentStatus::Failed, None) => Disposition::AwaitingEscalation,
            (DeploymentStatus::Failed, Some(UnrecoverableReason::RollbackFailed)) => {
                Disposition::RollbackFailed
            }
            (DeploymentStatus::Failed, Some(reason)) => Disposition::Unrecoverable(reason),
        }
    }

    /// No further automatic transition will happen.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Disposition::Succeeded
                | Disposition::RolledBack
                | Disposition::Unrecoverable(_)
                | Disposition::RollbackFailed
        )
    }
}

fn invalid(record: &DeploymentRecord, action: &'static str) -> ReconcileError {
    ReconcileError::InvalidTransition {
        deployment_id: record.deployment_id.clone(),
        action,
        status: record.status,
    }
}

/// Pending → InProgress.
pub fn accept(record: &DeploymentRecord) -> ReconcileResult<DeploymentRecord> {
    if record.status != DeploymentStatus::Pending {
        return Err(invalid(record, "accept"));
    }
    let mut next = record.clone();
    next.status = DeploymentStatus::InProgress;
    Ok(next)
}

/// Apply one health-check result to an `InProgress` or `RollingBack`
/// record. `failure` is `None` for a healthy result.
pub fn apply_health(
    record: &DeploymentRecord,
    failure: Option<FailureType>,
    config: &ReconcilerConfig,
) -> ReconcileResult<DeploymentRecord> {
    let mut next = record.clone();
    match (record.status, failure) {
        (DeploymentStatus::InProgress, None) => {
            next.status = DeploymentStatus::Success;
            next.failure_type = None;
        }
        (DeploymentStatus::InProgress, Some(kind)) => {
            if next.retry_count < config.max_retries {
                next.retry_count += 1;
            }
            if next.retry_count >= config.max_retries {
                next.status = DeploymentStatus::Failed;
                next.failure_type = Some(kind);
            }
        }
        (DeploymentStatus::RollingBack, None) => {
            next.status = DeploymentStatus::RolledBack;
            next.failure_type = None;
        }
        (DeploymentStatus::RollingBack, Some(kind)) => {
            next.status = DeploymentStatus::Failed;
            next.failure_type = Some(kind);
            next.unrecoverable = Some(UnrecoverableReason::RollbackFailed);
        }
        _ => return Err(invalid(record, "apply a health result to")),
    }
    Ok(next)
}

/// Whether escalating this record needs a rollback target at all.
pub fn needs_rollback_target(record: &DeploymentRecord, config: &ReconcilerConfig) -> bool {
    record.status == DeploymentStatus::Failed
        && record.unrecoverable.is_none()
        && record.retry_count >= config.rollback_threshold
}

/// Escalate a `Failed` record: roll back to `previous` or give up.
pub fn escalate(
    record: &DeploymentRecord,
    previous: Option<String>,
    config: &ReconcilerConfig,
) -> ReconcileResult<DeploymentRecord> {
    if record.status != DeploymentStatus::Failed || record.unrecoverable.is_some() {
        return Err(invalid(record, "escalate"));
    }
    let mut next = record.clone();
    if record.retry_count < config.rollback_threshold {
        next.unrecoverable = Some(UnrecoverableReason::BelowRollbackThreshold);
        return Ok(next);
    }
    match previous {
        Some(version) => {
            next.status = DeploymentStatus::RollingBack;
            next.previous_version = Some(version);
        }
        None => next.unrecoverable = Some(UnrecoverableReason::VersionUnresolvable),
    }
    Ok(next)
}
