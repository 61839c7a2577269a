//! redb table definitions for the Rollguard state store.
//!
//! Keys are `deployment:<deployment_id>`, values are JSON envelopes
//! (see [`crate::store::Versioned`]).

use redb::TableDefinition;

/// Deployment records keyed by `deployment:{deployment_id}`.
pub const DEPLOYMENTS: TableDefinition<&str, &[u8]> = TableDefinition::new("deployments");

/// Key prefix shared by every deployment record.
pub const DEPLOYMENT_KEY_PREFIX: &str = "deployment:";

/// Build the table key for a deployment id.
pub fn deployment_key(deployment_id: &str) -> String {
    format!("{DEPLOYMENT_KEY_PREFIX}{deployment_id}")
}
