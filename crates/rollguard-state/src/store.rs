//! StateStore — redb-backed persistence for deployment records.
//!
//! Provides `SET key value EX ttl` / `GET key` semantics over a single redb
//! table, plus a compare-and-swap write keyed on a per-record revision
//! counter. Values are JSON envelopes holding the record, its revision, and
//! its absolute expiry. The store supports both on-disk and in-memory
//! backends (the latter for testing).

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use redb::{Database, ReadableDatabase, ReadableTable};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// Retention window applied on every write unless overridden.
pub const DEFAULT_RECORD_TTL: Duration = Duration::from_secs(86_400);

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// A stored record together with its revision and expiry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Versioned {
    pub record: DeploymentRecord,
    /// Incremented on every write, starting at 1.
    pub revision: u64,
    /// Unix timestamp (seconds) after which the entry reads as absent.
    pub expires_at: u64,
}

impl Versioned {
    fn is_expired(&self, now: u64) -> bool {
        now >= self.expires_at
    }
}

/// The envelope fields a write or purge needs. Decodes even when the
/// record inside no longer does.
#[derive(Deserialize)]
struct Header {
    revision: u64,
    expires_at: u64,
}

impl Header {
    fn is_expired(&self, now: u64) -> bool {
        now >= self.expires_at
    }
}

/// Thread-safe deployment record store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
    ttl: Duration,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path, ttl: Duration) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Unavailable))?;
        let store = Self {
            db: Arc::new(db),
            ttl,
        };
        store.ensure_tables()?;
        debug!(?path, ttl_secs = ttl.as_secs(), "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory(ttl: Duration) -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Unavailable))?;
        let store = Self {
            db: Arc::new(db),
            ttl,
        };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Unavailable))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(DEPLOYMENTS).map_err(map_err!(Unavailable))?;
        txn.commit().map_err(map_err!(Unavailable))?;
        Ok(())
    }

    // ── Reads ──────────────────────────────────────────────────────

    /// Get a live deployment record, or `None` if absent or expired.
    pub fn get(&self, deployment_id: &str) -> StateResult<Option<DeploymentRecord>> {
        Ok(self.get_versioned(deployment_id)?.map(|v| v.record))
    }

    /// Get a live deployment record with its revision.
    pub fn get_versioned(&self, deployment_id: &str) -> StateResult<Option<Versioned>> {
        self.get_versioned_at(deployment_id, epoch_secs())
    }

    fn get_versioned_at(&self, deployment_id: &str, now: u64) -> StateResult<Option<Versioned>> {
        let key = deployment_key(deployment_id);
        let txn = self.db.begin_read().map_err(map_err!(Unavailable))?;
        let table = txn.open_table(DEPLOYMENTS).map_err(map_err!(Unavailable))?;
        match table.get(key.as_str()).map_err(map_err!(Unavailable))? {
            Some(guard) => {
                let stored = decode(guard.value())?;
                Ok((!stored.is_expired(now)).then_some(stored))
            }
            None => Ok(None),
        }
    }

    /// List all live deployment records. Entries that no longer decode are
    /// logged and skipped; `get` still reports them.
    pub fn list(&self) -> StateResult<Vec<DeploymentRecord>> {
        let now = epoch_secs();
        let txn = self.db.begin_read().map_err(map_err!(Unavailable))?;
        let table = txn.open_table(DEPLOYMENTS).map_err(map_err!(Unavailable))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Unavailable))? {
            let (key, value) = entry.map_err(map_err!(Unavailable))?;
            match decode(value.value()) {
                Ok(stored) if !stored.is_expired(now) => results.push(stored.record),
                Ok(_) => {}
                Err(e) => warn!(
                    key = %key.value(),
                    error = %e,
                    "skipping undecodable deployment record"
                ),
            }
        }
        Ok(results)
    }

    // ── Writes ─────────────────────────────────────────────────────

    /// Write the full record, replacing whatever is stored (even an entry
    /// that no longer decodes) and refreshing its expiry. Returns the new
    /// revision.
    pub fn save(&self, record: &DeploymentRecord) -> StateResult<u64> {
        self.write_at(record, None, epoch_secs())
    }

    /// Write the full record only if the stored revision matches
    /// `expected`. `None` means the record must not exist yet (an expired
    /// entry counts as absent). Returns the new revision.
    pub fn save_if_revision(
        &self,
        record: &DeploymentRecord,
        expected: Option<u64>,
    ) -> StateResult<u64> {
        self.write_at(record, Some(expected), epoch_secs())
    }

    fn write_at(
        &self,
        record: &DeploymentRecord,
        expected: Option<Option<u64>>,
        now: u64,
    ) -> StateResult<u64> {
        let key = deployment_key(&record.deployment_id);
        let txn = self.db.begin_write().map_err(map_err!(Unavailable))?;
        let revision;
        {
            let mut table = txn.open_table(DEPLOYMENTS).map_err(map_err!(Unavailable))?;
            let current = match table.get(key.as_str()).map_err(map_err!(Unavailable))? {
                Some(guard) => match (decode_header(guard.value()), expected) {
                    (Ok(header), _) => Some(header),
                    (Err(e), Some(_)) => return Err(e),
                    (Err(e), None) => {
                        warn!(%key, error = %e, "overwriting undecodable deployment record");
                        None
                    }
                },
                None => None,
            };
            let found = current
                .filter(|header| !header.is_expired(now))
                .map(|header| header.revision);

            if let Some(expected) = expected {
                if expected != found {
                    return Err(StateError::RevisionConflict {
                        key,
                        expected,
                        found,
                    });
                }
            }

            revision = found.map_or(1, |r| r + 1);
            let stored = Versioned {
                record: record.clone(),
                revision,
                expires_at: now.saturating_add(self.ttl.as_secs()),
            };
            let value = serde_json::to_vec(&stored).map_err(map_err!(Serialize))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Unavailable))?;
        }
        txn.commit().map_err(map_err!(Unavailable))?;
        debug!(
            %key,
            revision,
            status = %record.status,
            "deployment record stored"
        );
        Ok(revision)
    }

    /// Delete every expired entry. Returns the number removed.
    ///
    /// Only the envelope is read, so an expired record whose contents no
    /// longer decode is removed too. Entries without a readable envelope
    /// are logged and kept.
    pub fn purge_expired(&self) -> StateResult<u32> {
        self.purge_expired_at(epoch_secs())
    }

    fn purge_expired_at(&self, now: u64) -> StateResult<u32> {
        let txn = self.db.begin_write().map_err(map_err!(Unavailable))?;
        let count;
        {
            let mut table = txn.open_table(DEPLOYMENTS).map_err(map_err!(Unavailable))?;
            let mut expired = Vec::new();
            for entry in table.iter().map_err(map_err!(Unavailable))? {
                let (key, value) = entry.map_err(map_err!(Unavailable))?;
                match decode_header(value.value()) {
                    Ok(header) if header.is_expired(now) => {
                        expired.push(key.value().to_string());
                    }
                    Ok(_) => {}
                    Err(e) => warn!(
                        key = %key.value(),
                        error = %e,
                        "cannot read envelope, entry kept"
                    ),
                }
            }
            count = expired.len() as u32;
            for key in &expired {
                table.remove(key.as_str()).map_err(map_err!(Unavailable))?;
            }
        }
        txn.commit().map_err(map_err!(Unavailable))?;
        debug!(count, "expired deployment records purged");
        Ok(count)
    }
}

fn decode(bytes: &[u8]) -> StateResult<Versioned> {
    serde_json::from_slice(bytes).map_err(map_err!(Deserialize))
}

fn decode_header(bytes: &[u8]) -> StateResult<Header> {
    serde_json::from_slice(bytes).map_err(map_err!(Deserialize))
}
