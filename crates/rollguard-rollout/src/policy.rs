//! Reconciler policy — retry budget, rollback threshold, and timing.

use std::time::Duration;

/// Tunables for one [`Reconciler`](crate::Reconciler).
///
/// `max_retries` bounds in-place retries of the current version;
/// `rollback_threshold` is how many accumulated failures justify abandoning
/// it for the previous version.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ReconcilerConfig {
    /// Failed health checks tolerated before the record fails.
    pub max_retries: u32,
    /// Failures needed before a failed record may roll back.
    pub rollback_threshold: u32,
    /// Seconds a single health watch may take.
    pub health_timeout_secs: u64,
    /// Seconds between readiness polls.
    pub poll_interval_secs: u64,
    /// Seconds a record is retained after its last write.
    pub record_ttl_secs: u64,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            rollback_threshold: 2,
            health_timeout_secs: 300,
            poll_interval_secs: 10,
            record_ttl_secs: 86_400,
        }
    }
}

impl ReconcilerConfig {
    pub fn health_timeout(&self) -> Duration {
        Duration::from_secs(self.health_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn record_ttl(&self) -> Duration {
        Duration::from_secs(self.record_ttl_secs)
    }
}
