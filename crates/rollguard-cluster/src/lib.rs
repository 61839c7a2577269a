//! rollguard-cluster — read-only queries against the orchestration platform.
//!
//! The reconciler needs exactly two facts from the cluster: how many
//! replicas of a deployment are desired and ready, and which replica sets
//! (with their version labels) a deployment has created over time. This
//! crate defines the [`ClusterClient`] seam for those two reads and ships
//! two implementations:
//!
//! - **`KubeClient`** — HTTP/1.1 against the Kubernetes REST API
//! - **`ScriptedClient`** — in-process test double serving canned readings
//!
//! No mutating call lives here. Rolling back means re-submitting a rollout
//! through whatever deploys workloads, not patching the cluster directly.

pub mod client;
pub mod error;
pub mod kube;
pub mod scripted;
pub mod types;

pub use client::{ClusterClient, ClusterFuture};
pub use error::{ClusterError, ClusterResult};
pub use kube::KubeClient;
pub use scripted::ScriptedClient;
pub use types::{ReplicaSetInfo, ReplicaStatus, VERSION_LABEL};
