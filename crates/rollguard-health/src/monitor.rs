//! Health monitor — polls replica readiness until ready, timeout, or cancel.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use rollguard_cluster::{ClusterClient, ClusterError};

use crate::signal::cancelled;

/// Interval between readiness polls unless overridden.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// How a health watch ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthOutcome {
    /// Every desired replica reported ready.
    Healthy,
    /// The deadline passed without a ready reading.
    TimedOut,
    /// A readiness query failed; polling stopped at once.
    QueryFailed(ClusterError),
    /// The caller's shutdown signal fired.
    Cancelled,
}

impl HealthOutcome {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthOutcome::Healthy)
    }
}

/// Polls a deployment's replica readiness.
#[derive(Clone)]
pub struct HealthMonitor {
    client: Arc<dyn ClusterClient>,
    poll_interval: Duration,
}

impl HealthMonitor {
    /// Create a monitor polling every [`DEFAULT_POLL_INTERVAL`].
    pub fn new(client: Arc<dyn ClusterClient>) -> Self {
        Self {
            client,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Override the poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Wait until the deployment is fully ready. Returns `false` on
    /// timeout, query failure, or cancellation.
    pub async fn wait_for_healthy(
        &self,
        namespace: &str,
        name: &str,
        timeout: Duration,
        shutdown: &mut watch::Receiver<bool>,
    ) -> bool {
        self.watch(namespace, name, timeout, shutdown)
            .await
            .is_healthy()
    }

    /// Poll until the deployment is ready, the deadline passes, a query
    /// fails, or `shutdown` fires.
    ///
    /// The first poll happens immediately and the last one lands on the
    /// deadline, so a watch returns `TimedOut` after roughly `timeout`.
    pub async fn watch(
        &self,
        namespace: &str,
        name: &str,
        timeout: Duration,
        shutdown: &mut watch::Receiver<bool>,
    ) -> HealthOutcome {
        let started = Instant::now();
        let mut polls: u32 = 0;

        loop {
            polls += 1;
            let reading = tokio::select! {
                biased;
                _ = cancelled(shutdown) => {
                    debug!(%namespace, deployment = %name, polls, "health watch cancelled");
                    return HealthOutcome::Cancelled;
                }
                reading = self.client.read_deployment_status(namespace, name) => reading,
            };

            match reading {
                Ok(status) if status.is_ready() => {
                    info!(
                        %namespace,
                        deployment = %name,
                        desired = status.desired,
                        ready = status.ready,
                        polls,
                        elapsed_secs = started.elapsed().as_secs(),
                        "deployment healthy"
                    );
                    return HealthOutcome::Healthy;
                }
                Ok(status) => {
                    debug!(
                        %namespace,
                        deployment = %name,
                        desired = status.desired,
                        ready = status.ready,
                        polls,
                        "deployment not ready yet"
                    );
                }
                Err(e) => {
                    warn!(%namespace, deployment = %name, error = %e, "readiness query failed");
                    return HealthOutcome::QueryFailed(e);
                }
            }

            let elapsed = started.elapsed();
            if elapsed >= timeout {
                warn!(
                    %namespace,
                    deployment = %name,
                    timeout_secs = timeout.as_secs(),
                    polls,
                    "health check timed out"
                );
                return HealthOutcome::TimedOut;
            }

            let nap = self.poll_interval.min(timeout - elapsed);
            tokio::select! {
                biased;
                _ = cancelled(shutdown) => {
                    debug!(%namespace, deployment = %name, polls, "health watch cancelled");
                    return HealthOutcome::Cancelled;
                }
                _ = tokio::time::sleep(nap) => {}
            }
        }
    }
}
