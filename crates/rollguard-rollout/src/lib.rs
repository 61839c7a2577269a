//! Rollguard reconciliation — retry, escalate, roll back.
//!
//! This crate drives a [`DeploymentRecord`](rollguard_state::DeploymentRecord)
//! through its lifecycle. Health results from
//! [`rollguard_health::HealthMonitor`] consume a per-version retry budget;
//! once the budget is spent the record fails, and if enough failures have
//! accumulated and a previous version can be found in the replica-set
//! history, the engine rolls back to it.
//!
//! # Components
//!
//! - **`policy`** — Reconciler tunables (retry budget, rollback threshold, timing)
//! - **`resolver`** — Previous-version lookup from replica-set creation order
//! - **`machine`** — Pure transition functions over a record
//! - **`engine`** — Load, decide, compare-and-swap persist, trigger redeploys

pub mod engine;
pub mod error;
pub mod machine;
pub mod policy;
pub mod resolver;

pub use engine::{
    DeploymentRequest, Reconciler, RedeployCallback, RedeployFuture, RedeployReason,
    RedeployRequest,
};
pub use error::{ReconcileError, ReconcileResult};
pub use machine::Disposition;
pub use policy::ReconcilerConfig;
pub use resolver::{app_selector, previous_version, resolve_previous_version};
