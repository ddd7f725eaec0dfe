//! Policy manager integration (`policy` relation).
//!
//! The leader advertises a service record for the policy manager to
//! create; once the manager answers with its URL the plugin is turned
//! on through node state and rendered during sync.

use tracing::info;

use trino_core::literals::{APP_NAME, HTTP_PORT, POLICY_MANAGER_URL_KEY, POLICY_RELATION};
use trino_core::CharmConfig;
use trino_state::{LeaderGate, StateError, StateStore, relation_key};

use crate::error::CharmResult;

fn service_name(config: &CharmConfig, relation_id: u32) -> String {
    config
        .ranger_service_name
        .clone()
        .unwrap_or_else(|| format!("relation_{relation_id}"))
}

/// Fields of the service record, in relation order.
pub fn service_record(config: &CharmConfig, relation_id: u32) -> Vec<(&'static str, String)> {
    let host = config.external_hostname();
    let uri = if host == APP_NAME {
        format!("{host}:{HTTP_PORT}")
    } else {
        host.to_string()
    };
    vec![
        ("name", service_name(config, relation_id)),
        ("type", "trino".to_string()),
        ("jdbc.driverClassName", "io.trino.jdbc.TrinoDriver".to_string()),
        ("jdbc.url", format!("jdbc:trino://{uri}")),
    ]
}

/// Publish the service record. Leader only.
pub fn publish_service(
    store: &StateStore,
    config: &CharmConfig,
    is_leader: bool,
    relation_id: u32,
) -> CharmResult<bool> {
    if !is_leader {
        return Ok(false);
    }
    let record = service_record(config, relation_id);
    let updates: Vec<(&str, Option<String>)> =
        record.into_iter().map(|(k, v)| (k, Some(v))).collect();
    let changed = store.set_local_data(POLICY_RELATION, relation_id, &updates)?;
    info!(relation = relation_id, changed, "policy service record published");
    Ok(changed)
}

/// Enable the plugin once the policy manager has published its URL.
///
/// Returns `None` while the URL is not there yet.
pub fn enable(
    store: &StateStore,
    config: &CharmConfig,
    app: &str,
    is_leader: bool,
    relation_id: u32,
) -> CharmResult<Option<LeaderGate>> {
    let relation = store
        .get_relation(POLICY_RELATION, relation_id)?
        .ok_or_else(|| StateError::RelationNotFound(relation_key(POLICY_RELATION, relation_id)))?;
    let Some(url) = relation
        .remote
        .get(POLICY_MANAGER_URL_KEY)
        .filter(|u| !u.is_empty())
        .cloned()
    else {
        return Ok(None);
    };
    let name = service_name(config, relation_id);
    let gate = store.update_node_state(app, is_leader, |state| {
        state.ranger_enabled = true;
        state.policy_manager_url = Some(url);
        state.policy_service_name = Some(name);
    })?;
    if gate == LeaderGate::Applied {
        info!(relation = relation_id, "policy plugin enabled in node state");
    }
    Ok(Some(gate))
}

/// Turn the plugin off; audit shipping depends on it and goes too.
pub fn disable(store: &StateStore, app: &str, is_leader: bool) -> CharmResult<LeaderGate> {
    let gate = store.update_node_state(app, is_leader, |state| {
        state.ranger_enabled = false;
        state.policy_manager_url = None;
        state.policy_service_name = None;
        state.opensearch_enabled = false;
    })?;
    Ok(gate)
}
