//! The read-only cluster client seam.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::ClusterResult;
use crate::types::{ReplicaSetInfo, ReplicaStatus};

/// Boxed future alias for cluster query results.
pub type ClusterFuture<'a, T> = Pin<Box<dyn Future<Output = ClusterResult<T>> + Send + 'a>>;

/// Read-only view of the orchestration platform — injected for testability.
pub trait ClusterClient: Send + Sync {
    /// Desired and ready replica counts of a deployment.
    fn read_deployment_status<'a>(
        &'a self,
        namespace: &'a str,
        name: &'a str,
    ) -> ClusterFuture<'a, ReplicaStatus>;

    /// Replica sets matching a label selector such as `app=api`.
    ///
    /// Results may arrive in any order; callers sort by `created_at`.
    fn list_replica_sets<'a>(
        &'a self,
        namespace: &'a str,
        label_selector: &'a str,
    ) -> ClusterFuture<'a, Vec<ReplicaSetInfo>>;
}

impl<C: ClusterClient + ?Sized> ClusterClient for Arc<C> {
    fn read_deployment_status<'a>(
        &'a self,
        namespace: &'a str,
        name: &'a str,
    ) -> ClusterFuture<'a, ReplicaStatus> {
        (**self).read_deployment_status(namespace, name)
    }

    fn list_replica_sets<'a>(
        &'a self,
        namespace: &'a str,
        label_selector: &'a str,
    ) -> ClusterFuture<'a, Vec<ReplicaSetInfo>> {
        (**self).list_replica_sets(namespace, label_selector)
    }
}
