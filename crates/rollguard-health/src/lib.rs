//! rollguard-health — readiness polling for a rolling deployment.
//!
//! The [`HealthMonitor`] answers one question: did this deployment become
//! fully ready before the deadline? It polls the cluster at a fixed
//! interval and stops at the first ready reading, at the deadline, at the
//! first failed query, or when the caller's shutdown signal fires.
//!
//! # Architecture
//!
//! ```text
//! HealthMonitor::watch()
//!   ├── ClusterClient::read_deployment_status() every poll interval
//!   ├── tokio::select! against the caller's watch::Receiver<bool>
//!   └── HealthOutcome { Healthy | TimedOut | QueryFailed | Cancelled }
//! ```
//!
//! Failed queries are not retried here. Whether a failed rollout deserves
//! another attempt is decided by the reconciliation engine one layer up.
//! The monitor never writes state, so a cancelled watch leaves the
//! deployment record exactly as it was last persisted.

pub mod monitor;
pub mod signal;

pub use monitor::{HealthMonitor, HealthOutcome, DEFAULT_POLL_INTERVAL};
pub use signal::cancelled;
