//! Domain types persisted by the operator state store.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Key/value data written by one side of a relation.
pub type Databag = BTreeMap<String, String>;

/// Opaque secret reference, e.g. `secret:4c1d...`.
pub type SecretId = String;

/// Content of one secret revision.
pub type SecretContent = BTreeMap<String, String>;

// ── Node state ────────────────────────────────────────────────────

/// Peer-group state shared by every unit of one application.
///
/// Cluster-wide fields are written by the leader only; see
/// `StateStore::update_node_state`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NodeState {
    /// Discovery URI of the coordinator.
    pub discovery_uri: Option<String>,
    /// Raw catalog document, as configured on the coordinator.
    pub catalog_config: Option<String>,
    /// User credentials secret forwarded by the coordinator.
    pub user_secret_id: Option<String>,

    pub truststore_password: Option<String>,
    pub keystore_password: Option<String>,
    /// Shared secret for authenticated node-to-node calls.
    pub internal_secret: Option<String>,

    pub ranger_enabled: bool,
    pub policy_manager_url: Option<String>,
    pub policy_service_name: Option<String>,
    pub opensearch_enabled: bool,
    pub opensearch_ca: Option<String>,
    /// `host:port` of the audit index endpoint.
    pub opensearch_endpoint: Option<String>,
    pub opensearch_user: Option<String>,
    pub opensearch_password: Option<String>,

    pub private_key: Option<String>,
    pub csr: Option<String>,
    pub certificate: Option<String>,
    pub ca: Option<String>,

    /// Connectors added through the `add-connector` action: name → properties.
    pub connectors: BTreeMap<String, String>,
}

impl NodeState {
    /// TLS material is complete and usable.
    pub fn tls_ready(&self) -> bool {
        self.certificate.is_some() && self.private_key.is_some() && self.ca.is_some()
    }
}

// ── Relations ─────────────────────────────────────────────────────

/// One link between this application and a remote one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RelationRecord {
    pub id: u32,
    /// Local endpoint name, e.g. `trino-worker`.
    pub endpoint: String,
    pub remote_app: String,
    /// Data written by this application.
    pub local: Databag,
    /// Data written by the remote application.
    pub remote: Databag,
}

impl RelationRecord {
    pub fn new(endpoint: &str, id: u32, remote_app: &str) -> Self {
        Self {
            id,
            endpoint: endpoint.to_string(),
            remote_app: remote_app.to_string(),
            local: Databag::new(),
            remote: Databag::new(),
        }
    }

    /// Build the composite key for the relations table.
    pub fn table_key(&self) -> String {
        relation_key(&self.endpoint, self.id)
    }
}

pub fn relation_key(endpoint: &str, id: u32) -> String {
    format!("{endpoint}:{id}")
}

// ── Secrets ───────────────────────────────────────────────────────

/// A versioned, access-controlled secret.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SecretEntry {
    pub id: SecretId,
    /// Stable owner-scoped label, used to find the secret again.
    pub label: Option<String>,
    /// Application that created the secret.
    pub owner: String,
    pub revision: u64,
    pub content: SecretContent,
    /// SHA-256 of the canonical content, hex-encoded.
    pub fingerprint: String,
    /// Applications granted read access besides the owner.
    pub grants: BTreeSet<String>,
}

impl SecretEntry {
    pub fn can_read(&self, consumer: &str) -> bool {
        self.owner == consumer || self.grants.contains(consumer)
    }
}

/// Fingerprint of secret content; `BTreeMap` iteration makes it canonical.
pub fn content_fingerprint(content: &SecretContent) -> String {
    let mut hasher = Sha256::new();
    for (key, value) in content {
        hasher.update(key.as_bytes());
        hasher.update([0u8]);
        hasher.update(value.as_bytes());
        hasher.update([0u8]);
    }
    hex::encode(hasher.finalize())
}
