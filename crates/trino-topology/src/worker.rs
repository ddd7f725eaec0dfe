//! Worker side: a reactive mirror of the coordinator's published data.
//!
//! Relation-changed only fires for relation record updates, not for new
//! revisions of the catalog secret, so secret-changed is handled as an
//! independent adoption path.

use tracing::{debug, info};

use trino_core::literals::{
    CATALOG_SECRET_FIELD, CATALOG_SECRET_ID_KEY, CATALOG_SECRET_LABEL, DISCOVERY_URI_KEY,
    USER_SECRET_ID_KEY, WORKER_RELATION,
};
use trino_state::{LeaderGate, NodeState, StateError, StateStore, relation_key};

use crate::error::{TopologyError, TopologyResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Node state was updated (or already matched).
    Applied { changed: bool },
    /// This unit is not the leader; node state is left to the leader.
    NotLeader,
    /// The event does not concern the topology protocol.
    Ignored,
    /// The peer group is not formed yet; redeliver later.
    Deferred(&'static str),
}

const PEER_NOT_READY: &str = "waiting for peer relation";

fn apply<F>(store: &StateStore, app: &str, is_leader: bool, f: F) -> TopologyResult<SyncOutcome>
where
    F: FnOnce(&mut NodeState),
{
    let before = store.node_state(app)?;
    match store.update_node_state(app, is_leader, f)? {
        LeaderGate::Skipped => Ok(SyncOutcome::NotLeader),
        LeaderGate::Applied => {
            let changed = store.node_state(app)? != before;
            Ok(SyncOutcome::Applied { changed })
        }
    }
}

fn read_catalogs(store: &StateStore, app: &str, secret_id: &str) -> TopologyResult<String> {
    let content = store.read_secret(secret_id, app)?;
    content
        .get(CATALOG_SECRET_FIELD)
        .cloned()
        .ok_or_else(|| TopologyError::MalformedSecret {
            id: secret_id.to_string(),
            field: CATALOG_SECRET_FIELD.to_string(),
        })
}

/// Adopt discovery URI, user secret and catalog document from the
/// coordinator's side of a worker relation.
pub fn adopt_from_relation(
    store: &StateStore,
    app: &str,
    is_leader: bool,
    relation_id: u32,
) -> TopologyResult<SyncOutcome> {
    if !store.is_ready()? {
        return Ok(SyncOutcome::Deferred(PEER_NOT_READY));
    }
    if !is_leader {
        return Ok(SyncOutcome::NotLeader);
    }
    let relation = store
        .get_relation(WORKER_RELATION, relation_id)?
        .ok_or_else(|| StateError::RelationNotFound(relation_key(WORKER_RELATION, relation_id)))?;

    let discovery_uri = relation.remote.get(DISCOVERY_URI_KEY).cloned();
    let user_secret_id = relation.remote.get(USER_SECRET_ID_KEY).cloned();
    let catalogs = match relation.remote.get(CATALOG_SECRET_ID_KEY) {
        Some(id) if !id.is_empty() => Some(read_catalogs(store, app, id)?),
        _ => None,
    };
    debug!(
        relation = relation_id,
        has_catalogs = catalogs.is_some(),
        "adopting coordinator data"
    );

    let outcome = apply(store, app, true, |state| {
        state.discovery_uri = discovery_uri;
        state.user_secret_id = user_secret_id;
        state.catalog_config = catalogs;
    })?;
    info!(relation = relation_id, ?outcome, "worker state synced from relation");
    Ok(outcome)
}

/// Re-read the catalog secret after a new revision was published.
pub fn adopt_secret_change(
    store: &StateStore,
    app: &str,
    is_leader: bool,
    label: Option<&str>,
    secret_id: &str,
) -> TopologyResult<SyncOutcome> {
    if label != Some(CATALOG_SECRET_LABEL) {
        return Ok(SyncOutcome::Ignored);
    }
    if !store.is_ready()? {
        return Ok(SyncOutcome::Deferred(PEER_NOT_READY));
    }
    if !is_leader {
        return Ok(SyncOutcome::NotLeader);
    }
    let catalogs = read_catalogs(store, app, secret_id)?;
    let outcome = apply(store, app, true, |state| {
        state.catalog_config = Some(catalogs);
    })?;
    info!(secret = %secret_id, ?outcome, "worker catalogs synced from secret");
    Ok(outcome)
}

/// Forget everything adopted from the coordinator.
///
/// Only the fields written by [`adopt_from_relation`] are cleared;
/// connectors and TLS material stay untouched.
pub fn relation_broken(store: &StateStore, app: &str, is_leader: bool) -> TopologyResult<SyncOutcome> {
    if !store.is_ready()? {
        return Ok(SyncOutcome::Ignored);
    }
    let outcome = apply(store, app, is_leader, |state| {
        state.discovery_uri = None;
        state.user_secret_id = None;
        state.catalog_config = None;
    })?;
    info!(?outcome, "coordinator relation gone, worker state cleared");
    Ok(outcome)
}
