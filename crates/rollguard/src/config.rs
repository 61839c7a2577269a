//! rollguard.toml configuration.
//!
//! ```toml
//! [store]
//! path = "/var/lib/rollguard/rollguard.redb"
//!
//! [cluster]
//! api_address = "127.0.0.1:8001"
//! token_file = "/var/run/secrets/kubernetes.io/serviceaccount/token"
//! request_timeout_secs = 10
//!
//! [reconciler]
//! max_retries = 3
//! rollback_threshold = 2
//! ```
//!
//! Every section and key is optional.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use rollguard_cluster::KubeClient;
use rollguard_rollout::{Reconciler, ReconcilerConfig};
use rollguard_state::StateStore;

/// Config file picked up from the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "rollguard.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RollguardConfig {
    pub store: StoreConfig,
    pub cluster: ClusterConfig,
    pub reconciler: ReconcilerConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// redb database file.
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("rollguard.redb"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Kubernetes API address as `host:port` (plain HTTP, e.g. `kubectl proxy`).
    pub api_address: String,
    /// File holding a bearer token.
    pub token_file: Option<PathBuf>,
    pub request_timeout_secs: u64,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            api_address: "127.0.0.1:8001".to_string(),
            token_file: None,
            request_timeout_secs: 10,
        }
    }
}

impl RollguardConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: RollguardConfig = toml::from_str(&content)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(config)
    }

    /// Load an explicit config file, or `rollguard.toml` if it exists, or
    /// fall back to defaults.
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        match explicit {
            Some(path) => Self::from_file(path),
            None => {
                let path = Path::new(DEFAULT_CONFIG_FILE);
                if path.exists() {
                    Self::from_file(path)
                } else {
                    debug!("no {DEFAULT_CONFIG_FILE} found, using defaults");
                    Ok(Self::default())
                }
            }
        }
    }

    /// Open the record store, creating its directory if needed.
    pub fn open_store(&self) -> anyhow::Result<StateStore> {
        let path = &self.store.path;
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating store directory {}", dir.display()))?;
        }
        let store = StateStore::open(path, self.reconciler.record_ttl())
            .with_context(|| format!("opening store {}", path.display()))?;
        info!(path = ?path, "state store opened");
        Ok(store)
    }

    pub fn kube_client(&self) -> anyhow::Result<KubeClient> {
        let cluster = &self.cluster;
        let mut client = KubeClient::new(cluster.api_address.as_str())
            .with_timeout(Duration::from_secs(cluster.request_timeout_secs));
        if let Some(token_file) = &cluster.token_file {
            let token = std::fs::read_to_string(token_file)
                .with_context(|| format!("reading token {}", token_file.display()))?;
            client = client.with_token(token.trim());
        }
        Ok(client)
    }

    /// Assemble a reconciler against the configured store and cluster.
    pub fn reconciler(&self) -> anyhow::Result<Reconciler> {
        let store = self.open_store()?;
        let cluster = Arc::new(self.kube_client()?);
        Ok(Reconciler::new(store, cluster, self.reconciler.clone()))
    }
}
