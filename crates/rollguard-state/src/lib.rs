//! rollguard-state — durable deployment records for Rollguard.
//!
//! Backed by [redb](https://docs.rs/redb), provides persistent and in-memory
//! storage for [`DeploymentRecord`]s with a retention window.
//!
//! # Architecture
//!
//! Each record is wrapped in a JSON envelope carrying a revision counter and
//! an absolute expiry, stored under `deployment:<deployment_id>`. Every write
//! replaces the whole record and pushes the expiry forward by the configured
//! TTL. Expired entries read as absent and are swept by
//! [`StateStore::purge_expired`].
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across reconciliation tasks.

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::{StateStore, Versioned, DEFAULT_RECORD_TTL};
pub use types::*;
