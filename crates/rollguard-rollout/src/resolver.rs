//! Previous-version resolution from replica-set history.
//!
//! The newest replica set belongs to the rollout in flight; the one before
//! it is the last version that ran. Creation timestamps only have second
//! precision, so ties keep the platform's listing order.

use tracing::debug;

use rollguard_cluster::{ClusterClient, ClusterResult, ReplicaSetInfo};

/// Label selector matching every replica set of an app.
pub fn app_selector(app_name: &str) -> String {
    format!("app={app_name}")
}

/// The `version` label of the second-newest replica set, if there is one.
pub fn previous_version(mut replica_sets: Vec<ReplicaSetInfo>) -> Option<String> {
    // `sort_by` is stable: equal timestamps keep their input order.
    replica_sets.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    replica_sets
        .get(1)
        .and_then(ReplicaSetInfo::version)
        .map(str::to_string)
}

/// Look up the version a deployment ran before the current rollout.
///
/// `Ok(None)` means no previous version exists (a first deployment, or an
/// unlabelled replica set); only a failed platform query is an error.
pub async fn resolve_previous_version(
    client: &dyn ClusterClient,
    namespace: &str,
    deployment_name: &str,
) -> ClusterResult<Option<String>> {
    let selector = app_selector(deployment_name);
    let replica_sets = client.list_replica_sets(namespace, &selector).await?;
    let found = replica_sets.len();
    let previous = previous_version(replica_sets);
    debug!(
        %namespace,
        deployment = %deployment_name,
        replica_sets = found,
        previous = ?previous,
        "resolved previous version"
    );
    Ok(previous)
}
