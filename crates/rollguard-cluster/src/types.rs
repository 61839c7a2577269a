//! Values read from the cluster.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

/// Label carrying the workload version on each replica set.
pub const VERSION_LABEL: &str = "version";

/// Replica readiness of one deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplicaStatus {
    pub desired: u32,
    pub ready: u32,
}

impl ReplicaStatus {
    pub fn new(desired: u32, ready: u32) -> Self {
        Self { desired, ready }
    }

    /// Build from raw API counts. Negative or missing values become 0.
    pub fn from_counts(desired: Option<i64>, ready: Option<i64>) -> Self {
        let clamp = |n: Option<i64>| n.unwrap_or(0).clamp(0, i64::from(u32::MAX)) as u32;
        Self {
            desired: clamp(desired),
            ready: clamp(ready),
        }
    }

    /// All desired replicas are ready. A deployment scaled to zero counts
    /// as ready.
    pub fn is_ready(&self) -> bool {
        self.desired == 0 || self.ready == self.desired
    }
}

/// One replica set of a deployment, used as a timestamped version marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicaSetInfo {
    pub name: String,
    pub labels: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
}

impl ReplicaSetInfo {
    /// The value of the `version` label, if present.
    pub fn version(&self) -> Option<&str> {
        self.labels.get(VERSION_LABEL).map(String::as_str)
    }
}
