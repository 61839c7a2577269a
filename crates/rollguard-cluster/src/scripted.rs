//! In-process cluster client with canned readings.
//!
//! Readiness readings are served in order; the last queued reading repeats
//! once the queue is down to one entry, so a single push models a cluster
//! that never changes. Queries are counted when their future is first
//! polled, not when it is created.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use crate::client::{ClusterClient, ClusterFuture};
use crate::error::{ClusterError, ClusterResult};
use crate::types::{ReplicaSetInfo, ReplicaStatus};

struct Script {
    statuses: VecDeque<ClusterResult<ReplicaStatus>>,
    replica_sets: ClusterResult<Vec<ReplicaSetInfo>>,
    status_queries: u32,
    replica_set_queries: u32,
}

/// A [`ClusterClient`] driven by queued results.
#[derive(Default)]
pub struct ScriptedClient {
    script: Mutex<Script>,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            statuses: VecDeque::new(),
            replica_sets: Ok(Vec::new()),
            status_queries: 0,
            replica_set_queries: 0,
        }
    }
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self::default()
    }

    fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queue a readiness reading.
    pub fn push_status(&self, desired: u32, ready: u32) -> &Self {
        self.script()
            .statuses
            .push_back(Ok(ReplicaStatus::new(desired, ready)));
        self
    }

    /// Queue a failed readiness query.
    pub fn push_status_error(&self, reason: &str) -> &Self {
        self.script()
            .statuses
            .push_back(Err(ClusterError::Query(reason.to_string())));
        self
    }

    /// Drop every queued readiness result.
    pub fn clear_statuses(&self) -> &Self {
        self.script().statuses.clear();
        self
    }

    /// Replace the replica-set history returned for every selector.
    pub fn set_replica_sets(&self, sets: Vec<ReplicaSetInfo>) -> &Self {
        self.script().replica_sets = Ok(sets);
        self
    }

    /// Make every replica-set listing fail.
    pub fn fail_replica_sets(&self, reason: &str) -> &Self {
        self.script().replica_sets = Err(ClusterError::Query(reason.to_string()));
        self
    }

    /// Number of readiness queries served so far.
    pub fn status_queries(&self) -> u32 {
        self.script().status_queries
    }

    /// Number of replica-set listings served so far.
    pub fn replica_set_queries(&self) -> u32 {
        self.script().replica_set_queries
    }

    fn next_status(&self) -> ClusterResult<ReplicaStatus> {
        let mut script = self.script();
        script.status_queries += 1;
        if script.statuses.len() > 1 {
            script.statuses.pop_front().unwrap_or_else(no_reading)
        } else {
            script.statuses.front().cloned().unwrap_or_else(no_reading)
        }
    }
}

fn no_reading() -> ClusterResult<ReplicaStatus> {
    Err(ClusterError::Query("no scripted reading".to_string()))
}

impl ClusterClient for ScriptedClient {
    fn read_deployment_status<'a>(
        &'a self,
        _namespace: &'a str,
        _name: &'a str,
    ) -> ClusterFuture<'a, ReplicaStatus> {
        Box::pin(async move { self.next_status() })
    }

    fn list_replica_sets<'a>(
        &'a self,
        _namespace: &'a str,
        _label_selector: &'a str,
    ) -> ClusterFuture<'a, Vec<ReplicaSetInfo>> {
        Box::pin(async move {
            let mut script = self.script();
            script.replica_set_queries += 1;
            script.replica_sets.clone()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn readings_are_served_in_order_and_last_repeats() {
        let client = ScriptedClient::new();
        client.push_status(3, 1).push_status(3, 3);

        let first = client.read_deployment_status("ns", "api").await.unwrap();
        let second = client.read_deployment_status("ns", "api").await.unwrap();
        let third = client.read_deployment_status("ns", "api").await.unwrap();
        assert_eq!(first.ready, 1);
        assert_eq!(second.ready, 3);
        assert_eq!(third.ready, 3);
        assert_eq!(client.status_queries(), 3);
    }

    #[tokio::test]
    async fn empty_script_fails_queries() {
        let client = ScriptedClient::new();
        assert!(client.read_deployment_status("ns", "api").await.is_err());
        assert!(client.list_replica_sets("ns", "app=api").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn replica_set_failures_are_scripted() {
        let client = ScriptedClient::new();
        client.fail_replica_sets("forbidden");
        let err = client.list_replica_sets("ns", "app=api").await.unwrap_err();
        assert_eq!(err, ClusterError::Query("forbidden".to_string()));
        assert_eq!(client.replica_set_queries(), 1);
    }
}
