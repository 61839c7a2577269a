//! Kubernetes REST client.
//!
//! Issues plain HTTP/1.1 `GET`s against the apps/v1 API, typically through
//! `kubectl proxy` or an in-cluster sidecar that terminates TLS. Every
//! failure (connect, handshake, non-2xx, timeout, bad JSON) collapses into
//! [`ClusterError::Query`].

use std::collections::BTreeMap;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use http_body_util::{BodyExt, Empty};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use crate::client::{ClusterClient, ClusterFuture};
use crate::error::{ClusterError, ClusterResult};
use crate::types::{ReplicaSetInfo, ReplicaStatus};

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Read-only Kubernetes API client.
#[derive(Debug, Clone)]
pub struct KubeClient {
    /// API server address as `host:port`.
    address: String,
    /// Bearer token sent as `Authorization`, if any.
    token: Option<String>,
    timeout: Duration,
}

impl KubeClient {
    /// Create a client for the API server at `address` (`host:port`).
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            token: None,
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Authenticate with a bearer token.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Override the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> ClusterResult<T> {
        let uri = format!("http://{}{path}", self.address);

        let result = tokio::time::timeout(self.timeout, async {
            let stream = tokio::net::TcpStream::connect(self.address.as_str())
                .await
                .map_err(|e| query_error(&uri, "connect", e))?;

            let io = hyper_util::rt::TokioIo::new(stream);
            let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
                .await
                .map_err(|e| query_error(&uri, "handshake", e))?;

            // Drive the connection in the background.
            tokio::spawn(async move {
                let _ = conn.await;
            });

            let mut req = http::Request::builder()
                .method("GET")
                .uri(path)
                .header("host", &self.address)
                .header("accept", "application/json")
                .header("user-agent", "rollguard/0.1");
            if let Some(token) = &self.token {
                req = req.header("authorization", format!("Bearer {token}"));
            }
            let req = req
                .body(Empty::<Bytes>::new())
                .map_err(|e| query_error(&uri, "request", e))?;

            let resp = sender
                .send_request(req)
                .await
                .map_err(|e| query_error(&uri, "request", e))?;
            let status = resp.status();
            let body = resp
                .into_body()
                .collect()
                .await
                .map_err(|e| query_error(&uri, "body", e))?
                .to_bytes();

            if !status.is_success() {
                debug!(%status, %uri, "cluster query non-2xx");
                return Err(ClusterError::Query(format!("{uri}: status {status}")));
            }

            serde_json::from_slice(&body).map_err(|e| query_error(&uri, "decode", e))
        })
        .await;

        match result {
            Ok(inner) => inner,
            Err(_) => {
                debug!(%uri, "cluster query timed out");
                Err(ClusterError::Query(format!(
                    "{uri}: timed out after {:?}",
                    self.timeout
                )))
            }
        }
    }
}

impl ClusterClient for KubeClient {
    fn read_deployment_status<'a>(
        &'a self,
        namespace: &'a str,
        name: &'a str,
    ) -> ClusterFuture<'a, ReplicaStatus> {
        Box::pin(async move {
            let path = format!("/apis/apps/v1/namespaces/{namespace}/deployments/{name}");
            let doc: DeploymentDoc = self.get_json(&path).await?;
            Ok(doc.replica_status())
        })
    }

    fn list_replica_sets<'a>(
        &'a self,
        namespace: &'a str,
        label_selector: &'a str,
    ) -> ClusterFuture<'a, Vec<ReplicaSetInfo>> {
        Box::pin(async move {
            let path = replica_sets_path(namespace, label_selector);
            let doc: ReplicaSetListDoc = self.get_json(&path).await?;
            Ok(doc.into_infos())
        })
    }
}

fn query_error(uri: &str, stage: &str, e: impl std::fmt::Display) -> ClusterError {
    debug!(error = %e, %uri, stage, "cluster query failed");
    ClusterError::Query(format!("{uri}: {stage}: {e}"))
}

fn replica_sets_path(namespace: &str, label_selector: &str) -> String {
    format!(
        "/apis/apps/v1/namespaces/{namespace}/replicasets?labelSelector={}",
        urlencoding::encode(label_selector)
    )
}

// ── API documents (only the fields we read) ───────────────────────

#[derive(Debug, Default, Deserialize)]
struct DeploymentDoc {
    #[serde(default)]
    spec: DeploymentSpecDoc,
    #[serde(default)]
    status: DeploymentStatusDoc,
}

#[derive(Debug, Default, Deserialize)]
struct DeploymentSpecDoc {
    replicas: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeploymentStatusDoc {
    ready_replicas: Option<i64>,
}

impl DeploymentDoc {
    fn replica_status(&self) -> ReplicaStatus {
        // The API server defaults an omitted `spec.replicas` to 1.
        ReplicaStatus::from_counts(
            Some(self.spec.replicas.unwrap_or(1)),
            self.status.ready_replicas,
        )
    }
}

#[derive(Debug, Deserialize)]
struct ReplicaSetListDoc {
    #[serde(default)]
    items: Vec<ReplicaSetDoc>,
}

#[derive(Debug, Deserialize)]
struct ReplicaSetDoc {
    metadata: ObjectMetaDoc,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectMetaDoc {
    #[serde(default)]
    name: String,
    #[serde(default)]
    labels: BTreeMap<String, String>,
    creation_timestamp: Option<DateTime<Utc>>,
}

impl ReplicaSetListDoc {
    fn into_infos(self) -> Vec<ReplicaSetInfo> {
        self.items
            .into_iter()
            .map(|rs| ReplicaSetInfo {
                name: rs.metadata.name,
                labels: rs.metadata.labels,
                created_at: rs.metadata.creation_timestamp.unwrap_or_default(),
            })
            .collect()
    }
}
