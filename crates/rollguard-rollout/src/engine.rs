//! Reconciliation engine — drives deployment records through the state
//! machine.
//!
//! Every step reads the latest persisted record, decides the next state
//! with [`crate::machine`], and writes it back with a compare-and-swap on
//! the revision it read. A stale writer gets
//! [`StateError::RevisionConflict`](rollguard_state::StateError) instead of
//! silently overwriting a concurrent transition. External actions
//! (redeploys) run only after the transition that calls for them is
//! persisted.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use rollguard_cluster::ClusterClient;
use rollguard_health::{HealthMonitor, HealthOutcome};
use rollguard_state::{
    DeploymentRecord, DeploymentStatus, FailureType, StateError, StateStore, Versioned,
};

use crate::error::{ReconcileError, ReconcileResult};
use crate::machine::{self, Disposition};
use crate::policy::ReconcilerConfig;
use crate::resolver::resolve_previous_version;

/// A rollout handed over by a pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct DeploymentRequest {
    pub deployment_id: String,
    pub namespace: String,
    pub app_name: String,
    pub version: String,
    pub metadata: HashMap<String, serde_json::Value>,
}

/// Why the engine asks for a version to be deployed again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedeployReason {
    /// Another attempt at the current version.
    Retry,
    /// Restore the previous version.
    Rollback,
}

/// A request to (re-)submit a rollout through the deployment collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedeployRequest {
    pub deployment_id: String,
    pub namespace: String,
    pub app_name: String,
    pub version: String,
    pub reason: RedeployReason,
}

/// Callback that re-submits a rollout.
///
/// Without one, a retry simply watches the same rollout again and a
/// rollback relies on something else restoring the previous version.
pub type RedeployCallback = Arc<dyn Fn(RedeployRequest) -> RedeployFuture + Send + Sync>;

/// Future returned by a [`RedeployCallback`].
pub type RedeployFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;

/// The reconciliation engine.
#[derive(Clone)]
pub struct Reconciler {
    store: StateStore,
    cluster: Arc<dyn ClusterClient>,
    monitor: HealthMonitor,
    config: ReconcilerConfig,
    redeploy: Option<RedeployCallback>,
}

impl Reconciler {
    /// Create an engine over a store and a cluster client.
    pub fn new(
        store: StateStore,
        cluster: Arc<dyn ClusterClient>,
        config: ReconcilerConfig,
    ) -> Self {
        let monitor = HealthMonitor::new(cluster.clone()).with_poll_interval(config.poll_interval());
        Self {
            store,
            cluster,
            monitor,
            config,
            redeploy: None,
        }
    }

    /// Set the callback used to re-submit rollouts.
    pub fn with_redeploy(mut self, callback: RedeployCallback) -> Self {
        self.redeploy = Some(callback);
        self
    }

    // ── Queries ────────────────────────────────────────────────────

    /// The last persisted record for a deployment.
    pub fn get_deployment_state(
        &self,
        deployment_id: &str,
    ) -> ReconcileResult<Option<DeploymentRecord>> {
        Ok(self.store.get(deployment_id)?)
    }

    fn load(&self, deployment_id: &str) -> ReconcileResult<Versioned> {
        self.store
            .get_versioned(deployment_id)?
            .ok_or_else(|| ReconcileError::NotFound(deployment_id.to_string()))
    }

    // ── Transitions ────────────────────────────────────────────────

    /// Record a new rollout as `Pending`.
    pub fn submit(&self, request: DeploymentRequest) -> ReconcileResult<DeploymentRecord> {
        let record = DeploymentRecord::new(
            &request.deployment_id,
            &request.namespace,
            &request.app_name,
            &request.version,
            request.metadata,
        );
        match self.store.save_if_revision(&record, None) {
            Ok(_) => {}
            Err(StateError::RevisionConflict { .. }) => {
                return Err(ReconcileError::AlreadyExists(request.deployment_id));
            }
            Err(e) => return Err(e.into()),
        }
        info!(
            deployment = %record.deployment_id,
            namespace = %record.namespace,
            app = %record.app_name,
            version = %record.version,
            "rollout submitted"
        );
        Ok(record)
    }

    /// Pending → InProgress.
    pub fn accept(&self, deployment_id: &str) -> ReconcileResult<Disposition> {
        let current = self.load(deployment_id)?;
        if current.record.is_terminal() {
            return Ok(Disposition::of(&current.record));
        }
        let next = machine::accept(&current.record)?;
        let next = self.persist(&current, next)?;
        Ok(Disposition::of(&next))
    }

    /// Watch the rollout (or rollback) once and record the result.
    ///
    /// Cancellation through `shutdown` leaves the record untouched and
    /// returns [`Disposition::Cancelled`].
    pub async fn check_health(
        &self,
        deployment_id: &str,
        shutdown: &mut watch::Receiver<bool>,
    ) -> ReconcileResult<Disposition> {
        let current = self.load(deployment_id)?;
        let record = &current.record;
        if record.is_terminal() {
            return Ok(Disposition::of(record));
        }
        if !matches!(
            record.status,
            DeploymentStatus::InProgress | DeploymentStatus::RollingBack
        ) {
            return Err(ReconcileError::InvalidTransition {
                deployment_id: deployment_id.to_string(),
                action: "health-check",
                status: record.status,
            });
        }

        let outcome = self
            .monitor
            .watch(
                &record.namespace,
                &record.app_name,
                self.config.health_timeout(),
                shutdown,
            )
            .await;
        let failure = match outcome {
            HealthOutcome::Healthy => None,
            HealthOutcome::TimedOut => Some(FailureType::Timeout),
            HealthOutcome::QueryFailed(_) => Some(FailureType::HealthCheckFailure),
            HealthOutcome::Cancelled => {
                info!(deployment = %deployment_id, status = %record.status, "reconciliation cancelled");
                return Ok(Disposition::Cancelled);
            }
        };

        let next = machine::apply_health(record, failure, &self.config)?;
        let retrying = next.status == DeploymentStatus::InProgress;
        let next = self.persist(&current, next)?;
        if retrying {
            self.request_redeploy(&next, next.version.clone(), RedeployReason::Retry)
                .await;
        }
        Ok(Disposition::of(&next))
    }

    /// Decide what to do with a `Failed` record: roll back or give up.
    ///
    /// Terminal records are left alone and cause no write.
    pub async fn escalate(&self, deployment_id: &str) -> ReconcileResult<Disposition> {
        let current = self.load(deployment_id)?;
        let record = &current.record;
        if record.is_terminal() {
            debug!(deployment = %deployment_id, status = %record.status, "escalation skipped, record is terminal");
            return Ok(Disposition::of(record));
        }

        let previous = if machine::needs_rollback_target(record, &self.config) {
            match &record.previous_version {
                Some(version) => Some(version.clone()),
                None => {
                    resolve_previous_version(
                        self.cluster.as_ref(),
                        &record.namespace,
                        &record.app_name,
                    )
                    .await?
                }
            }
        } else {
            None
        };

        let next = machine::escalate(record, previous, &self.config)?;
        let next = self.persist(&current, next)?;
        if let (DeploymentStatus::RollingBack, Some(target)) =
            (next.status, next.previous_version.clone())
        {
            self.request_redeploy(&next, target, RedeployReason::Rollback)
                .await;
        }
        Ok(Disposition::of(&next))
    }

    /// Drive a deployment until it reaches a terminal state or `shutdown`
    /// fires.
    ///
    /// Safe to re-run after a crash: every step starts from the last
    /// persisted record. A rollback found already in flight is re-submitted
    /// before it is watched.
    pub async fn reconcile(
        &self,
        deployment_id: &str,
        shutdown: &mut watch::Receiver<bool>,
    ) -> ReconcileResult<Disposition> {
        let mut resumed = true;
        loop {
            if *shutdown.borrow() {
                return Ok(Disposition::Cancelled);
            }
            let record = self
                .get_deployment_state(deployment_id)?
                .ok_or_else(|| ReconcileError::NotFound(deployment_id.to_string()))?;
            if record.is_terminal() {
                return Ok(Disposition::of(&record));
            }

            let disposition = match record.status {
                DeploymentStatus::Pending => self.accept(deployment_id)?,
                DeploymentStatus::InProgress => self.check_health(deployment_id, shutdown).await?,
                DeploymentStatus::RollingBack => {
                    if resumed {
                        if let Some(target) = record.previous_version.clone() {
                            self.request_redeploy(&record, target, RedeployReason::Rollback)
                                .await;
                        }
                    }
                    self.check_health(deployment_id, shutdown).await?
                }
                DeploymentStatus::Failed => self.escalate(deployment_id).await?,
                DeploymentStatus::Success | DeploymentStatus::RolledBack => {
                    return Ok(Disposition::of(&record));
                }
            };
            resumed = false;

            if disposition == Disposition::Cancelled || disposition.is_terminal() {
                return Ok(disposition);
            }
        }
    }

    // ── Internals ──────────────────────────────────────────────────

    fn persist(
        &self,
        current: &Versioned,
        mut next: DeploymentRecord,
    ) -> ReconcileResult<DeploymentRecord> {
        debug_assert!(next.is_consistent(), "inconsistent record: {next:?}");
        next.touch();
        let revision = self
            .store
            .save_if_revision(&next, Some(current.revision))?;

        let from = current.record.status;
        let disposition = Disposition::of(&next);
        match disposition {
            Disposition::RollbackFailed => error!(
                deployment = %next.deployment_id,
                version = %next.version,
                previous = ?next.previous_version,
                failure = ?next.failure_type,
                "rollback failed, manual intervention required"
            ),
            Disposition::Unrecoverable(reason) => warn!(
                deployment = %next.deployment_id,
                version = %next.version,
                %reason,
                retries = next.retry_count,
                "deployment failed, no automatic recovery"
            ),
            Disposition::AwaitingEscalation | Disposition::RollingBack => warn!(
                deployment = %next.deployment_id,
                %from,
                to = %next.status,
                retries = next.retry_count,
                failure = ?next.failure_type,
                previous = ?next.previous_version,
                revision,
                "deployment escalated"
            ),
            _ => info!(
                deployment = %next.deployment_id,
                %from,
                to = %next.status,
                retries = next.retry_count,
                revision,
                "deployment transition persisted"
            ),
        }
        Ok(next)
    }

    async fn request_redeploy(
        &self,
        record: &DeploymentRecord,
        version: String,
        reason: RedeployReason,
    ) {
        let Some(callback) = &self.redeploy else {
            debug!(deployment = %record.deployment_id, ?reason, "no redeployer configured");
            return;
        };
        let request = RedeployRequest {
            deployment_id: record.deployment_id.clone(),
            namespace: record.namespace.clone(),
            app_name: record.app_name.clone(),
            version,
            reason,
        };
        info!(
            deployment = %request.deployment_id,
            version = %request.version,
            ?reason,
            "requesting redeploy"
        );
        if let Err(e) = callback(request).await {
            warn!(
                deployment = %record.deployment_id,
                ?reason,
                error = %e,
                "redeploy request failed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Mutex;
    use std::time::Duration;

    use chrono::{TimeZone, Utc};
    use rollguard_cluster::{ReplicaSetInfo, ScriptedClient};
    use rollguard_state::{UnrecoverableReason, DEFAULT_RECORD_TTL};

    fn test_config() -> ReconcilerConfig {
        ReconcilerConfig {
            max_retries: 3,
            rollback_threshold: 2,
            health_timeout_secs: 30,
            poll_interval_secs: 10,
            record_ttl_secs: 86_400,
        }
    }

    fn history(versions: &[&str]) -> Vec<ReplicaSetInfo> {
        versions
            .iter()
            .enumerate()
            .map(|(i, v)| {
                let mut labels = BTreeMap::new();
                labels.insert("app".to_string(), "api".to_string());
                labels.insert("version".to_string(), v.to_string());
                ReplicaSetInfo {
                    name: format!("api-{i}"),
                    labels,
                    created_at: Utc.timestamp_opt(1_700_000_000 + i as i64 * 60, 0).unwrap(),
                }
            })
            .collect()
    }

    struct Harness {
        store: StateStore,
        client: Arc<ScriptedClient>,
        engine: Reconciler,
        redeploys: Arc<Mutex<Vec<RedeployRequest>>>,
    }

    fn harness(config: ReconcilerConfig) -> Harness {
        let store = StateStore::open_in_memory(DEFAULT_RECORD_TTL).unwrap();
        let client = Arc::new(ScriptedClient::new());
        let redeploys = Arc::new(Mutex::new(Vec::new()));
        let sink = redeploys.clone();
        let callback: RedeployCallback = Arc::new(move |req: RedeployRequest| -> RedeployFuture {
            sink.lock().unwrap().push(req);
            Box::pin(async { Ok::<(), anyhow::Error>(()) })
        });
        let engine = Reconciler::new(store.clone(), client.clone(), config).with_redeploy(callback);
        Harness {
            store,
            client,
            engine,
            redeploys,
        }
    }

    fn request(id: &str) -> DeploymentRequest {
        let mut metadata = HashMap::new();
        metadata.insert("commit".to_string(), serde_json::json!("4be1a9c"));
        DeploymentRequest {
            deployment_id: id.to_string(),
            namespace: "prod".to_string(),
            app_name: "api".to_string(),
            version: "v3".to_string(),
            metadata,
        }
    }

    fn revision(store: &StateStore, id: &str) -> u64 {
        store.get_versioned(id).unwrap().unwrap().revision
    }

    fn record(store: &StateStore, id: &str) -> DeploymentRecord {
        store.get(id).unwrap().unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn retries_then_rolls_back_step_by_step() {
        let h = harness(test_config());
        h.client.push_status(3, 1);
        h.client.set_replica_sets(history(&["v1", "v2", "v3"]));
        let (_tx, mut rx) = watch::channel(false);

        let rec = h.engine.submit(request("d-1")).unwrap();
        assert_eq!(rec.status, DeploymentStatus::Pending);
        assert_eq!(h.engine.accept("d-1").unwrap(), Disposition::InProgress);

        for expected in 1..=2 {
            let d = h.engine.check_health("d-1", &mut rx).await.unwrap();
            assert_eq!(d, Disposition::InProgress);
            let rec = record(&h.store, "d-1");
            assert_eq!(rec.retry_count, expected);
            assert!(rec.is_consistent());
        }

        let d = h.engine.check_health("d-1", &mut rx).await.unwrap();
        assert_eq!(d, Disposition::AwaitingEscalation);
        let rec = record(&h.store, "d-1");
        assert_eq!(rec.status, DeploymentStatus::Failed);
        assert_eq!(rec.retry_count, 3);
        assert_eq!(rec.failure_type, Some(FailureType::Timeout));

        let d = h.engine.escalate("d-1").await.unwrap();
        assert_eq!(d, Disposition::RollingBack);
        let rec = record(&h.store, "d-1");
        assert_eq!(rec.previous_version.as_deref(), Some("v2"));
        assert!(rec.is_consistent());

        h.client.clear_statuses().push_status(3, 3);
        let d = h.engine.check_health("d-1", &mut rx).await.unwrap();
        assert_eq!(d, Disposition::RolledBack);
        let rec = record(&h.store, "d-1");
        assert_eq!(rec.status, DeploymentStatus::RolledBack);
        assert_eq!(rec.failure_type, None);
        assert_eq!(rec.metadata["commit"], "4be1a9c");

        let redeploys = h.redeploys.lock().unwrap().clone();
        let reasons: Vec<_> = redeploys.iter().map(|r| (r.reason, r.version.as_str())).collect();
        assert_eq!(
            reasons,
            vec![
                (RedeployReason::Retry, "v3"),
                (RedeployReason::Retry, "v3"),
                (RedeployReason::Rollback, "v2"),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn reconcile_drives_to_rolled_back() {
        let h = harness(test_config());
        for _ in 0..3 {
            h.client.push_status_error("apiserver unavailable");
        }
        h.client.push_status(3, 3);
        h.client.set_replica_sets(history(&["v2", "v3"]));
        let (_tx, mut rx) = watch::channel(false);

        h.engine.submit(request("d-1")).unwrap();
        let d = h.engine.reconcile("d-1", &mut rx).await.unwrap();

        assert_eq!(d, Disposition::RolledBack);
        let rec = record(&h.store, "d-1");
        assert_eq!(rec.retry_count, 3);
        assert_eq!(rec.previous_version.as_deref(), Some("v2"));
        assert!(rec.is_consistent());
    }

    #[tokio::test(start_paused = true)]
    async fn healthy_rollout_succeeds_without_redeploys() {
        let h = harness(test_config());
        h.client.push_status(3, 2).push_status(3, 3);
        let (_tx, mut rx) = watch::channel(false);

        h.engine.submit(request("d-1")).unwrap();
        let d = h.engine.reconcile("d-1", &mut rx).await.unwrap();

        assert_eq!(d, Disposition::Succeeded);
        assert_eq!(record(&h.store, "d-1").retry_count, 0);
        assert!(h.redeploys.lock().unwrap().is_empty());
        assert_eq!(h.client.replica_set_queries(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn unresolvable_previous_version_never_rolls_back() {
        let h = harness(test_config());
        h.client.push_status(3, 0);
        h.client.set_replica_sets(history(&["v3"]));
        let (_tx, mut rx) = watch::channel(false);

        h.engine.submit(request("d-1")).unwrap();
        let d = h.engine.reconcile("d-1", &mut rx).await.unwrap();

        assert_eq!(
            d,
            Disposition::Unrecoverable(UnrecoverableReason::VersionUnresolvable)
        );
        let rec = record(&h.store, "d-1");
        assert_eq!(rec.status, DeploymentStatus::Failed);
        assert_eq!(rec.previous_version, None);

        // Escalating again changes nothing and writes nothing.
        let before = revision(&h.store, "d-1");
        let d = h.engine.escalate("d-1").await.unwrap();
        assert_eq!(
            d,
            Disposition::Unrecoverable(UnrecoverableReason::VersionUnresolvable)
        );
        assert_eq!(revision(&h.store, "d-1"), before);
        assert_eq!(record(&h.store, "d-1").status, DeploymentStatus::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn escalation_is_idempotent_on_terminal_records() {
        let h = harness(test_config());
        h.client.push_status(1, 1);
        let (_tx, mut rx) = watch::channel(false);

        h.engine.submit(request("d-1")).unwrap();
        assert_eq!(
            h.engine.reconcile("d-1", &mut rx).await.unwrap(),
            Disposition::Succeeded
        );

        let before = revision(&h.store, "d-1");
        assert_eq!(h.engine.escalate("d-1").await.unwrap(), Disposition::Succeeded);
        assert_eq!(
            h.engine.check_health("d-1", &mut rx).await.unwrap(),
            Disposition::Succeeded
        );
        assert_eq!(h.engine.accept("d-1").unwrap(), Disposition::Succeeded);
        assert_eq!(revision(&h.store, "d-1"), before);

        let mut rolled_back = record(&h.store, "d-1");
        rolled_back.deployment_id = "d-2".to_string();
        rolled_back.status = DeploymentStatus::RolledBack;
        h.store.save(&rolled_back).unwrap();
        assert_eq!(h.engine.escalate("d-2").await.unwrap(), Disposition::RolledBack);
        assert_eq!(revision(&h.store, "d-2"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_rollback_is_terminal_and_alertable() {
        let h = harness(test_config());
        h.client.push_status_error("gone");
        h.client.set_replica_sets(history(&["v1", "v2", "v3"]));
        let (_tx, mut rx) = watch::channel(false);

        h.engine.submit(request("d-1")).unwrap();
        let d = h.engine.reconcile("d-1", &mut rx).await.unwrap();

        assert_eq!(d, Disposition::RollbackFailed);
        let rec = record(&h.store, "d-1");
        assert_eq!(rec.status, DeploymentStatus::Failed);
        assert_eq!(rec.unrecoverable, Some(UnrecoverableReason::RollbackFailed));
        assert_eq!(rec.failure_type, Some(FailureType::HealthCheckFailure));
        assert_eq!(rec.previous_version.as_deref(), Some("v2"));
        assert!(rec.is_consistent());
    }

    #[tokio::test(start_paused = true)]
    async fn below_threshold_failure_is_terminal() {
        let h = harness(ReconcilerConfig {
            max_retries: 1,
            rollback_threshold: 2,
            ..test_config()
        });
        h.client.push_status_error("boom");
        h.client.set_replica_sets(history(&["v2", "v3"]));
        let (_tx, mut rx) = watch::channel(false);

        h.engine.submit(request("d-1")).unwrap();
        let d = h.engine.reconcile("d-1", &mut rx).await.unwrap();

        assert_eq!(
            d,
            Disposition::Unrecoverable(UnrecoverableReason::BelowRollbackThreshold)
        );
        assert_eq!(h.client.replica_set_queries(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_leaves_last_persisted_state() {
        let h = harness(test_config());
        h.client.push_status(3, 0);
        let (tx, mut rx) = watch::channel(false);

        h.engine.submit(request("d-1")).unwrap();
        h.engine.accept("d-1").unwrap();
        let before = h.store.get_versioned("d-1").unwrap().unwrap();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(15)).await;
            let _ = tx.send(true);
        });

        let d = h.engine.reconcile("d-1", &mut rx).await.unwrap();
        assert_eq!(d, Disposition::Cancelled);
        let after = h.store.get_versioned("d-1").unwrap().unwrap();
        assert_eq!(after, before);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_writer_loses_with_conflict() {
        let h = harness(test_config());
        h.client.push_status(3, 1).push_status(3, 1).push_status(3, 3);
        let (_tx, mut rx) = watch::channel(false);

        h.engine.submit(request("d-1")).unwrap();
        h.engine.accept("d-1").unwrap();

        let other = h.store.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            let mut rec = other.get("d-1").unwrap().unwrap();
            rec.metadata.insert("owner".to_string(), serde_json::json!("someone-else"));
            other.save(&rec).unwrap();
        });

        let err = h.engine.check_health("d-1", &mut rx).await.unwrap_err();
        assert!(matches!(
            err,
            ReconcileError::Store(StateError::RevisionConflict { .. })
        ));
        assert!(err.is_transient());
        // The other writer's version stands.
        let rec = record(&h.store, "d-1");
        assert_eq!(rec.status, DeploymentStatus::InProgress);
        assert_eq!(rec.metadata["owner"], "someone-else");
    }

    #[tokio::test(start_paused = true)]
    async fn platform_error_during_resolution_keeps_record_failed() {
        let h = harness(test_config());
        h.client.push_status_error("down");
        h.client.fail_replica_sets("forbidden");
        let (_tx, mut rx) = watch::channel(false);

        h.engine.submit(request("d-1")).unwrap();
        let err = h.engine.reconcile("d-1", &mut rx).await.unwrap_err();
        assert!(matches!(err, ReconcileError::Platform(_)));

        let rec = record(&h.store, "d-1");
        assert_eq!(rec.status, DeploymentStatus::Failed);
        assert_eq!(rec.unrecoverable, None);

        // Once the platform answers, escalation proceeds.
        h.client.set_replica_sets(history(&["v2", "v3"]));
        assert_eq!(h.engine.escalate("d-1").await.unwrap(), Disposition::RollingBack);
    }

    #[tokio::test(start_paused = true)]
    async fn resumed_rollback_is_resubmitted() {
        let h = harness(test_config());
        h.client.push_status(3, 3);
        let (_tx, mut rx) = watch::channel(false);

        let mut rec = DeploymentRecord::new("d-1", "prod", "api", "v3", HashMap::new());
        rec.status = DeploymentStatus::RollingBack;
        rec.retry_count = 3;
        rec.failure_type = Some(FailureType::Timeout);
        rec.previous_version = Some("v2".to_string());
        h.store.save(&rec).unwrap();

        let d = h.engine.reconcile("d-1", &mut rx).await.unwrap();
        assert_eq!(d, Disposition::RolledBack);
        let redeploys = h.redeploys.lock().unwrap().clone();
        assert_eq!(redeploys.len(), 1);
        assert_eq!(redeploys[0].reason, RedeployReason::Rollback);
        assert_eq!(redeploys[0].version, "v2");
    }

    #[tokio::test]
    async fn duplicate_submit_is_rejected() {
        let h = harness(test_config());
        h.engine.submit(request("d-1")).unwrap();
        let err = h.engine.submit(request("d-1")).unwrap_err();
        assert!(matches!(err, ReconcileError::AlreadyExists(id) if id == "d-1"));
    }

    #[tokio::test]
    async fn unknown_and_misplaced_requests() {
        let h = harness(test_config());
        let (_tx, mut rx) = watch::channel(false);
        assert!(matches!(
            h.engine.escalate("ghost").await,
            Err(ReconcileError::NotFound(_))
        ));
        assert!(h.engine.get_deployment_state("ghost").unwrap().is_none());

        h.engine.submit(request("d-1")).unwrap();
        assert!(matches!(
            h.engine.check_health("d-1", &mut rx).await,
            Err(ReconcileError::InvalidTransition { .. })
        ));
        assert!(matches!(
            h.engine.escalate("d-1").await,
            Err(ReconcileError::InvalidTransition { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn failing_redeployer_does_not_stop_reconciliation() {
        let store = StateStore::open_in_memory(DEFAULT_RECORD_TTL).unwrap();
        let client = Arc::new(ScriptedClient::new());
        client.push_status_error("flake").push_status(2, 2);
        let callback: RedeployCallback = Arc::new(|_req: RedeployRequest| -> RedeployFuture {
            Box::pin(async { Err::<(), _>(anyhow::anyhow!("pipeline offline")) })
        });
        let engine =
            Reconciler::new(store.clone(), client.clone(), test_config()).with_redeploy(callback);
        let (_tx, mut rx) = watch::channel(false);

        engine.submit(request("d-1")).unwrap();
        let d = engine.reconcile("d-1", &mut rx).await.unwrap();
        assert_eq!(d, Disposition::Succeeded);
        assert_eq!(store.get("d-1").unwrap().unwrap().retry_count, 1);
    }
}
