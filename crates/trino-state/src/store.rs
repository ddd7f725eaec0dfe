//! StateStore: redb-backed persistence for the operator.
//!
//! Provides typed operations over node state, relation records and
//! secrets. The store supports both on-disk and in-memory backends (the
//! latter for testing).

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::Serialize;
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use trino_core::literals::PEER_RELATION;

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

type Table = TableDefinition<'static, &'static str, &'static [u8]>;

/// Result of a leadership-gated write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaderGate {
    Applied,
    /// This unit is not the leader; nothing was written.
    Skipped,
}

static SECRET_SEQ: AtomicU64 = AtomicU64::new(0);

#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(PEER_STATE).map_err(map_err!(Table))?;
        txn.open_table(RELATIONS).map_err(map_err!(Table))?;
        txn.open_table(SECRETS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Generic JSON rows ──────────────────────────────────────────

    fn get_row<T: DeserializeOwned>(&self, def: Table, key: &str) -> StateResult<Option<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(def).map_err(map_err!(Table))?;
        match table.get(key).map_err(map_err!(Read))? {
            Some(guard) => {
                let value: T =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    fn put_row<T: Serialize>(&self, def: Table, key: &str, value: &T) -> StateResult<()> {
        let bytes = serde_json::to_vec(value).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(def).map_err(map_err!(Table))?;
            table
                .insert(key, bytes.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    fn delete_row(&self, def: Table, key: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(def).map_err(map_err!(Table))?;
            existed = table.remove(key).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(existed)
    }

    fn scan_rows<T: DeserializeOwned>(&self, def: Table, prefix: &str) -> StateResult<Vec<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(def).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            if key.value().starts_with(prefix) {
                let row: T =
                    serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
                results.push(row);
            }
        }
        Ok(results)
    }

    // ── Node state ─────────────────────────────────────────────────

    /// The peer group exists once the runtime has created the peer relation.
    pub fn is_ready(&self) -> StateResult<bool> {
        Ok(!self.relations(PEER_RELATION)?.is_empty())
    }

    /// Current node state of `app`; an absent record reads as default.
    pub fn node_state(&self, app: &str) -> StateResult<NodeState> {
        Ok(self.get_row(PEER_STATE, app)?.unwrap_or_default())
    }

    pub fn put_node_state(&self, app: &str, state: &NodeState) -> StateResult<()> {
        self.put_row(PEER_STATE, app, state)?;
        debug!(%app, "node state stored");
        Ok(())
    }

    /// Apply `f` to the node state of `app` if this unit is the leader.
    ///
    /// The runtime gives no write-conflict detection, so the check is a
    /// convention: non-leaders never write cluster-wide fields.
    pub fn update_node_state<F>(&self, app: &str, is_leader: bool, f: F) -> StateResult<LeaderGate>
    where
        F: FnOnce(&mut NodeState),
    {
        if !is_leader {
            debug!(%app, "not leader, skipping node state update");
            return Ok(LeaderGate::Skipped);
        }
        let mut state = self.node_state(app)?;
        f(&mut state);
        self.put_node_state(app, &state)?;
        Ok(LeaderGate::Applied)
    }

    // ── Relations ──────────────────────────────────────────────────

    /// Insert or replace a relation record.
    pub fn put_relation(&self, relation: &RelationRecord) -> StateResult<()> {
        let key = relation.table_key();
        self.put_row(RELATIONS, &key, relation)?;
        debug!(%key, "relation stored");
        Ok(())
    }

    pub fn get_relation(&self, endpoint: &str, id: u32) -> StateResult<Option<RelationRecord>> {
        self.get_row(RELATIONS, &relation_key(endpoint, id))
    }

    /// All relations established on `endpoint`.
    pub fn relations(&self, endpoint: &str) -> StateResult<Vec<RelationRecord>> {
        self.scan_rows(RELATIONS, &format!("{endpoint}:"))
    }

    pub fn delete_relation(&self, endpoint: &str, id: u32) -> StateResult<bool> {
        let key = relation_key(endpoint, id);
        let existed = self.delete_row(RELATIONS, &key)?;
        debug!(%key, existed, "relation deleted");
        Ok(existed)
    }

    /// Write fields into this application's side of a relation.
    ///
    /// `None` values remove the field. Returns whether anything changed.
    pub fn set_local_data(
        &self,
        endpoint: &str,
        id: u32,
        updates: &[(&str, Option<String>)],
    ) -> StateResult<bool> {
        self.modify_relation(endpoint, id, |rel| apply_updates(&mut rel.local, updates))
    }

    /// Write fields into the remote application's side of a relation.
    pub fn set_remote_data(
        &self,
        endpoint: &str,
        id: u32,
        updates: &[(&str, Option<String>)],
    ) -> StateResult<bool> {
        self.modify_relation(endpoint, id, |rel| apply_updates(&mut rel.remote, updates))
    }

    fn modify_relation<F>(&self, endpoint: &str, id: u32, f: F) -> StateResult<bool>
    where
        F: FnOnce(&mut RelationRecord) -> bool,
    {
        let key = relation_key(endpoint, id);
        let mut relation: RelationRecord = self
            .get_row(RELATIONS, &key)?
            .ok_or_else(|| StateError::RelationNotFound(key.clone()))?;
        let changed = f(&mut relation);
        if changed {
            self.put_row(RELATIONS, &key, &relation)?;
        }
        Ok(changed)
    }

    // ── Secrets ────────────────────────────────────────────────────

    /// Create a new secret owned by `owner`. Returns its id.
    pub fn create_secret(
        &self,
        owner: &str,
        label: Option<&str>,
        content: SecretContent,
    ) -> StateResult<SecretId> {
        let id = new_secret_id(owner, label);
        let entry = SecretEntry {
            id: id.clone(),
            label: label.map(str::to_string),
            owner: owner.to_string(),
            revision: 1,
            fingerprint: content_fingerprint(&content),
            content,
            grants: Default::default(),
        };
        self.put_row(SECRETS, &id, &entry)?;
        info!(%id, %owner, ?label, "secret created");
        Ok(id)
    }

    pub fn secret(&self, id: &str) -> StateResult<Option<SecretEntry>> {
        self.get_row(SECRETS, id)
    }

    /// Store a secret entry as replicated by the runtime, keeping its id,
    /// revision and grants.
    pub fn import_secret(&self, entry: &SecretEntry) -> StateResult<()> {
        self.put_row(SECRETS, &entry.id, entry)?;
        debug!(id = %entry.id, revision = entry.revision, "secret imported");
        Ok(())
    }

    /// Find a secret by its owner-scoped label.
    pub fn secret_by_label(&self, owner: &str, label: &str) -> StateResult<Option<SecretEntry>> {
        let all: Vec<SecretEntry> = self.scan_rows(SECRETS, "")?;
        Ok(all
            .into_iter()
            .find(|s| s.owner == owner && s.label.as_deref() == Some(label)))
    }

    /// Read the latest revision of a secret on behalf of `consumer`.
    pub fn read_secret(&self, id: &str, consumer: &str) -> StateResult<SecretContent> {
        let entry = self
            .secret(id)?
            .ok_or_else(|| StateError::SecretNotFound(id.to_string()))?;
        if !entry.can_read(consumer) {
            return Err(StateError::SecretAccessDenied {
                id: id.to_string(),
                consumer: consumer.to_string(),
            });
        }
        Ok(entry.content)
    }

    /// Replace a secret's content. A new revision is only created when the
    /// content actually differs; returns whether it did.
    pub fn set_secret_content(&self, id: &str, content: SecretContent) -> StateResult<bool> {
        let mut entry = self
            .secret(id)?
            .ok_or_else(|| StateError::SecretNotFound(id.to_string()))?;
        let fingerprint = content_fingerprint(&content);
        if fingerprint == entry.fingerprint {
            debug!(%id, revision = entry.revision, "secret content unchanged");
            return Ok(false);
        }
        entry.revision += 1;
        entry.content = content;
        entry.fingerprint = fingerprint;
        self.put_row(SECRETS, id, &entry)?;
        info!(%id, revision = entry.revision, "secret revision created");
        Ok(true)
    }

    /// Grant `app` read access to a secret. Returns whether the grant is new.
    pub fn grant_secret(&self, id: &str, app: &str) -> StateResult<bool> {
        let mut entry = self
            .secret(id)?
            .ok_or_else(|| StateError::SecretNotFound(id.to_string()))?;
        let added = entry.grants.insert(app.to_string());
        if added {
            self.put_row(SECRETS, id, &entry)?;
            debug!(%id, %app, "secret granted");
        }
        Ok(added)
    }

    /// Revoke a grant. Returns whether `app` had access.
    pub fn revoke_secret(&self, id: &str, app: &str) -> StateResult<bool> {
        let mut entry = self
            .secret(id)?
            .ok_or_else(|| StateError::SecretNotFound(id.to_string()))?;
        let removed = entry.grants.remove(app);
        if removed {
            self.put_row(SECRETS, id, &entry)?;
            debug!(%id, %app, "secret grant revoked");
        }
        Ok(removed)
    }

    /// Remove a secret with all its revisions, revoking every grant.
    pub fn remove_secret(&self, id: &str) -> StateResult<bool> {
        let existed = self.delete_row(SECRETS, id)?;
        info!(%id, existed, "secret removed");
        Ok(existed)
    }
}

fn apply_updates(bag: &mut Databag, updates: &[(&str, Option<String>)]) -> bool {
    let mut changed = false;
    for (key, value) in updates {
        match value {
            Some(v) => {
                if bag.get(*key) != Some(v) {
                    bag.insert(key.to_string(), v.clone());
                    changed = true;
                }
            }
            None => {
                changed |= bag.remove(*key).is_some();
            }
        }
    }
    changed
}

fn new_secret_id(owner: &str, label: Option<&str>) -> SecretId {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    let seq = SECRET_SEQ.fetch_add(1, Ordering::Relaxed);
    let mut hasher = Sha256::new();
    hasher.update(owner.as_bytes());
    hasher.update(label.unwrap_or_default().as_bytes());
    hasher.update(nanos.to_le_bytes());
    hasher.update(seq.to_le_bytes());
    let digest = hex::encode(hasher.finalize());
    format!("secret:{}", &digest[..20])
}
