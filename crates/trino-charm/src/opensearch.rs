//! Audit index integration (`opensearch` relation).
//!
//! Policy decisions are shipped to a search index by the policy plugin,
//! so the relation is only accepted on a coordinator with the plugin on.

use tracing::info;

use trino_core::NodeRole;
use trino_core::literals::{
    OPENSEARCH_ENDPOINTS_KEY, OPENSEARCH_INDEX_KEY, OPENSEARCH_INDEX_NAME, OPENSEARCH_RELATION,
    OPENSEARCH_TLS_SECRET_KEY, OPENSEARCH_USER_SECRET_KEY,
};
use trino_state::{LeaderGate, NodeState, StateError, StateStore, relation_key};

use crate::error::{CharmError, CharmResult};

const TLS_CA_FIELD: &str = "tls-ca";

/// Request the audit index. Leader only.
pub fn request_index(store: &StateStore, is_leader: bool, relation_id: u32) -> CharmResult<bool> {
    if !is_leader {
        return Ok(false);
    }
    let changed = store.set_local_data(
        OPENSEARCH_RELATION,
        relation_id,
        &[(OPENSEARCH_INDEX_KEY, Some(OPENSEARCH_INDEX_NAME.to_string()))],
    )?;
    Ok(changed)
}

/// Every PEM certificate block in `bundle`, in order.
pub fn split_certificates(bundle: &str) -> Vec<String> {
    const BEGIN: &str = "-----BEGIN CERTIFICATE-----";
    const END: &str = "-----END CERTIFICATE-----";
    let mut certs = Vec::new();
    let mut rest = bundle;
    while let Some(start) = rest.find(BEGIN) {
        let Some(len) = rest[start..].find(END) else {
            break;
        };
        let end = start + len + END.len();
        certs.push(rest[start..end].to_string());
        rest = &rest[end..];
    }
    certs
}

/// The CA to trust: the second certificate of the chain when there is
/// one (the root behind the intermediate), otherwise the first.
fn pick_ca(bundle: &str) -> Option<String> {
    let mut certs = split_certificates(bundle);
    if certs.len() > 1 {
        Some(certs.swap_remove(1))
    } else {
        certs.pop()
    }
}

fn secret_field(store: &StateStore, app: &str, id: &str, field: &str) -> CharmResult<String> {
    store
        .read_secret(id, app)?
        .get(field)
        .cloned()
        .ok_or_else(|| CharmError::OpensearchSecret {
            id: id.to_string(),
            field: field.to_string(),
        })
}

/// Enable audit shipping once the index provider has published its
/// endpoints and secrets. Returns `None` while they are incomplete.
pub fn enable(
    store: &StateStore,
    node: &NodeState,
    role: NodeRole,
    app: &str,
    is_leader: bool,
    relation_id: u32,
) -> CharmResult<Option<LeaderGate>> {
    if !is_leader {
        return Ok(Some(LeaderGate::Skipped));
    }
    if !node.ranger_enabled {
        return Err(CharmError::OpensearchWithoutRanger);
    }
    if role != NodeRole::Coordinator {
        return Err(CharmError::OpensearchNotCoordinator);
    }

    let relation = store
        .get_relation(OPENSEARCH_RELATION, relation_id)?
        .ok_or_else(|| {
            StateError::RelationNotFound(relation_key(OPENSEARCH_RELATION, relation_id))
        })?;
    let remote = &relation.remote;
    let (Some(endpoints), Some(user_secret), Some(tls_secret)) = (
        remote.get(OPENSEARCH_ENDPOINTS_KEY),
        remote.get(OPENSEARCH_USER_SECRET_KEY),
        remote.get(OPENSEARCH_TLS_SECRET_KEY),
    ) else {
        return Ok(None);
    };

    let endpoint = endpoints.split(',').next().unwrap_or_default().trim().to_string();
    let username = secret_field(store, app, user_secret, "username")?;
    let password = secret_field(store, app, user_secret, "password")?;
    let bundle = secret_field(store, app, tls_secret, TLS_CA_FIELD)?;
    let ca = pick_ca(&bundle).ok_or_else(|| CharmError::OpensearchSecret {
        id: tls_secret.clone(),
        field: TLS_CA_FIELD.to_string(),
    })?;

    let gate = store.update_node_state(app, true, |state| {
        state.opensearch_enabled = true;
        state.opensearch_endpoint = Some(endpoint);
        state.opensearch_user = Some(username);
        state.opensearch_password = Some(password);
        state.opensearch_ca = Some(ca);
    })?;
    info!(relation = relation_id, "audit index enabled");
    Ok(Some(gate))
}

/// Stop audit shipping. Only meaningful on a coordinator with the
/// policy plugin on; otherwise nothing was enabled.
pub fn disable(
    store: &StateStore,
    node: &NodeState,
    role: NodeRole,
    app: &str,
    is_leader: bool,
) -> CharmResult<LeaderGate> {
    if role != NodeRole::Coordinator || !node.ranger_enabled {
        return Ok(LeaderGate::Skipped);
    }
    let gate = store.update_node_state(app, is_leader, |state| {
        state.opensearch_enabled = false;
        state.opensearch_endpoint = None;
        state.opensearch_user = None;
        state.opensearch_password = None;
        state.opensearch_ca = None;
    })?;
    Ok(gate)
}
