//! Domain types for the Rollguard state store.
//!
//! A [`DeploymentRecord`] is the unit of tracked state for one rollout. The
//! status and failure domains are closed enums serialized as snake_case
//! string tags; an unknown tag fails deserialization.

use std::collections::HashMap;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Opaque unique identifier for a tracked deployment.
pub type DeploymentId = String;

// ── Status ────────────────────────────────────────────────────────

/// Lifecycle status of a deployment record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStatus {
    /// Accepted, not yet being watched.
    Pending,
    /// The new version is rolling out and being health-checked.
    InProgress,
    /// The new version became healthy.
    Success,
    /// The retry budget is spent, or the record is unrecoverable.
    Failed,
    /// The previous version is being restored.
    RollingBack,
    /// The previous version was restored and is healthy.
    RolledBack,
}

impl DeploymentStatus {
    /// The string tag used in stored documents.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::RollingBack => "rolling_back",
            Self::RolledBack => "rolled_back",
        }
    }

    /// Whether a record in this status must carry a `failure_type`.
    pub fn carries_failure(self) -> bool {
        matches!(self, Self::Failed | Self::RollingBack)
    }
}

impl fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a rollout failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureType {
    BuildFailure,
    TestFailure,
    DeploymentFailure,
    HealthCheckFailure,
    Timeout,
}

impl FailureType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BuildFailure => "build_failure",
            Self::TestFailure => "test_failure",
            Self::DeploymentFailure => "deployment_failure",
            Self::HealthCheckFailure => "health_check_failure",
            Self::Timeout => "timeout",
        }
    }
}

impl fmt::Display for FailureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a `Failed` record will see no further automatic action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnrecoverableReason {
    /// Fewer failures than `rollback_threshold` were accumulated.
    BelowRollbackThreshold,
    /// No previous version could be found to roll back to.
    VersionUnresolvable,
    /// The rollback itself never became healthy.
    RollbackFailed,
}

impl fmt::Display for UnrecoverableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::BelowRollbackThreshold => "below_rollback_threshold",
            Self::VersionUnresolvable => "version_unresolvable",
            Self::RollbackFailed => "rollback_failed",
        })
    }
}

// ── Record ────────────────────────────────────────────────────────

/// Tracked state of one deployment rollout.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeploymentRecord {
    pub deployment_id: DeploymentId,
    pub namespace: String,
    pub app_name: String,
    /// Version currently being rolled out.
    pub version: String,
    pub status: DeploymentStatus,
    /// Rollback target, resolved lazily from replica-set history.
    pub previous_version: Option<String>,
    /// Retry attempts consumed for the current version.
    pub retry_count: u32,
    pub failure_type: Option<FailureType>,
    /// Unix timestamp (seconds) of the last mutation.
    pub timestamp: u64,
    /// Caller-supplied context (commit SHA, pipeline run id, ...).
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unrecoverable: Option<UnrecoverableReason>,
}

impl DeploymentRecord {
    /// Create a fresh `Pending` record.
    pub fn new(
        deployment_id: &str,
        namespace: &str,
        app_name: &str,
        version: &str,
        metadata: HashMap<String, serde_json::Value>,
    ) -> Self {
        Self {
            deployment_id: deployment_id.to_string(),
            namespace: namespace.to_string(),
            app_name: app_name.to_string(),
            version: version.to_string(),
            status: DeploymentStatus::Pending,
            previous_version: None,
            retry_count: 0,
            failure_type: None,
            timestamp: epoch_secs(),
            metadata,
            unrecoverable: None,
        }
    }

    /// Whether no further automatic transition can happen.
    pub fn is_terminal(&self) -> bool {
        match self.status {
            DeploymentStatus::Success | DeploymentStatus::RolledBack => true,
            DeploymentStatus::Failed => self.unrecoverable.is_some(),
            DeploymentStatus::Pending
            | DeploymentStatus::InProgress
            | DeploymentStatus::RollingBack => false,
        }
    }

    /// `failure_type` is set exactly when the status is `Failed` or
    /// `RollingBack`, and `unrecoverable` only appears on `Failed`.
    pub fn is_consistent(&self) -> bool {
        self.failure_type.is_some() == self.status.carries_failure()
            && (self.unrecoverable.is_none() || self.status == DeploymentStatus::Failed)
    }

    /// Stamp the record as mutated now.
    pub fn touch(&mut self) {
        self.timestamp = epoch_secs();
    }
}

/// Current wall-clock time as Unix seconds.
pub fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> DeploymentRecord {
        DeploymentRecord::new("d-1", "default", "api", "v2", HashMap::new())
    }

    #[test]
    fn new_record_is_pending_and_consistent() {
        let rec = record();
        assert_eq!(rec.status, DeploymentStatus::Pending);
        assert_eq!(rec.retry_count, 0);
        assert!(rec.is_consistent());
        assert!(!rec.is_terminal());
    }

    #[test]
    fn status_tags_match_serde() {
        for status in [
            DeploymentStatus::Pending,
            DeploymentStatus::InProgress,
            DeploymentStatus::Success,
            DeploymentStatus::Failed,
            DeploymentStatus::RollingBack,
            DeploymentStatus::RolledBack,
        ] {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.as_str()));
        }
        let json = serde_json::to_string(&FailureType::HealthCheckFailure).unwrap();
        assert_eq!(json, "\"health_check_failure\"");
    }

    #[test]
    fn unknown_status_tag_is_rejected() {
        let result: Result<DeploymentStatus, _> = serde_json::from_str("\"exploded\"");
        assert!(result.is_err());
        let result: Result<FailureType, _> = serde_json::from_str("\"cosmic_ray\"");
        assert!(result.is_err());
    }

    #[test]
    fn failed_is_terminal_only_when_unrecoverable() {
        let mut rec = record();
        rec.status = DeploymentStatus::Failed;
        rec.failure_type = Some(FailureType::Timeout);
        assert!(!rec.is_terminal());

        rec.unrecoverable = Some(UnrecoverableReason::VersionUnresolvable);
        assert!(rec.is_terminal());
        assert!(rec.is_consistent());
    }

    #[test]
    fn consistency_flags_stray_failure_type() {
        let mut rec = record();
        rec.status = DeploymentStatus::Success;
        rec.failure_type = Some(FailureType::Timeout);
        assert!(!rec.is_consistent());

        rec.failure_type = None;
        rec.unrecoverable = Some(UnrecoverableReason::RollbackFailed);
        assert!(!rec.is_consistent());
    }

    #[test]
    fn legacy_document_without_unrecoverable_decodes() {
        let json = r#"{
            "deployment_id": "d-9",
            "namespace": "prod",
            "app_name": "api",
            "version": "v3",
            "status": "failed",
            "previous_version": null,
            "retry_count": 3,
            "failure_type": "timeout",
            "timestamp": 1700000000,
            "metadata": {"commit": "abc123"}
        }"#;
        let rec: DeploymentRecord = serde_json::from_str(json).unwrap();
        assert_eq!(rec.status, DeploymentStatus::Failed);
        assert_eq!(rec.failure_type, Some(FailureType::Timeout));
        assert_eq!(rec.unrecoverable, None);
        assert_eq!(rec.metadata["commit"], "abc123");
    }
}
