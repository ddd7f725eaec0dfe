//! Operator actions: `add-connector`, `remove-connector`, `restart`.
//!
//! Connector files live next to the rendered catalogs. Additions are
//! recorded in node state, which is what lets the other units converge
//! and lets the catalog rebuild keep them.

use std::collections::BTreeMap;

use tracing::{info, warn};

use trino_catalog::{ConnectorDiff, ConnectorRequest, diff_connectors};
use trino_core::literals::{CATALOG_DIR, CERTS_DIR, CONF_DIR, TRUSTSTORE_FILE, trino_path};
use trino_state::{LeaderGate, StateStore};

use crate::error::CharmResult;
use crate::sync::{delete_cert, import_cert};
use crate::workload::{Workload, WorkloadResult};

fn connector_path(name: &str) -> String {
    trino_path(&[CATALOG_DIR, &format!("{name}.properties")])
}

/// Connectors currently on disk: name → property text.
pub fn connectors_on_disk<W>(workload: &W) -> WorkloadResult<BTreeMap<String, String>>
where
    W: Workload + ?Sized,
{
    let mut connectors = BTreeMap::new();
    for file in workload.list_dir(&trino_path(&[CATALOG_DIR]))? {
        let Some(name) = file.strip_suffix(".properties") else {
            continue;
        };
        if let Some(text) = workload.pull(&connector_path(name))? {
            connectors.insert(name.to_string(), text);
        }
    }
    Ok(connectors)
}

fn untrust_connector_cert<W>(workload: &W, store: &StateStore, app: &str, name: &str) -> CharmResult<()>
where
    W: Workload + ?Sized,
{
    workload.remove_path(&trino_path(&[CERTS_DIR, &format!("{name}.crt")]), false)?;
    let Some(pwd) = store.node_state(app)?.truststore_password else {
        return Ok(());
    };
    if let Err(e) = delete_cert(workload, name, &trino_path(&[CONF_DIR, TRUSTSTORE_FILE]), &pwd) {
        warn!(connector = %name, error = %e, "failed to delete certificate from truststore");
    }
    Ok(())
}

fn trust_connector_cert<W>(workload: &W, store: &StateStore, app: &str, name: &str, pem: &str) -> CharmResult<()>
where
    W: Workload + ?Sized,
{
    let path = trino_path(&[CERTS_DIR, &format!("{name}.crt")]);
    workload.push(&path, pem)?;
    match store.node_state(app)?.truststore_password {
        Some(pwd) => import_cert(workload, name, &path, &trino_path(&[CONF_DIR, TRUSTSTORE_FILE]), &pwd),
        None => warn!(connector = %name, "no truststore yet, certificate not imported"),
    }
    Ok(())
}

/// Outcome of a connector action that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionResult {
    pub message: String,
    /// Whether the change was recorded for the other units.
    pub recorded: bool,
}

pub fn add_connector<W>(
    workload: &W,
    store: &StateStore,
    app: &str,
    is_leader: bool,
    request: &ConnectorRequest,
) -> CharmResult<ActionResult>
where
    W: Workload + ?Sized,
{
    let path = connector_path(&request.name);
    request.check_add(workload.exists(&path)?)?;

    if let Some(pem) = &request.cert {
        trust_connector_cert(workload, store, app, &request.name, pem)?;
    }
    workload.push(&path, &request.config)?;

    let gate = store.update_node_state(app, is_leader, |state| {
        state
            .connectors
            .insert(request.name.clone(), request.config.clone());
    })?;
    if gate == LeaderGate::Skipped {
        warn!(connector = %request.name, "not leader, connector not recorded for other units");
    }
    workload.restart()?;
    info!(connector = %request.name, "connector added");
    let recorded = gate == LeaderGate::Applied;
    let message = if recorded {
        format!("Successfully added {}", request.name)
    } else {
        format!(
            "Added {} on this unit only; not the leader, so it was not recorded and other units will not get it",
            request.name
        )
    };
    Ok(ActionResult { message, recorded })
}

pub fn remove_connector<W>(
    workload: &W,
    store: &StateStore,
    app: &str,
    is_leader: bool,
    request: &ConnectorRequest,
) -> CharmResult<ActionResult>
where
    W: Workload + ?Sized,
{
    let path = connector_path(&request.name);
    let recorded = store.node_state(app)?.connectors;
    request.check_remove(workload.exists(&path)?, &recorded)?;

    workload.remove_path(&path, false)?;
    if request.cert.is_some() {
        untrust_connector_cert(workload, store, app, &request.name)?;
    }

    let gate = store.update_node_state(app, is_leader, |state| {
        state.connectors.remove(&request.name);
    })?;
    workload.restart()?;
    info!(connector = %request.name, "connector removed");
    Ok(ActionResult {
        message: format!("Successfully removed {}", request.name),
        recorded: gate == LeaderGate::Applied,
    })
}

pub fn restart<W>(workload: &W) -> CharmResult<String>
where
    W: Workload + ?Sized,
{
    workload.restart()?;
    info!("workload restarted");
    Ok("Trino restarted".to_string())
}

/// Bring on-disk connectors in line with the recorded set.
///
/// `keep` lists catalog names rendered from the catalog document, which
/// are not connectors and must survive. Restarts the workload when
/// anything changed.
pub fn converge_connectors<W>(
    workload: &W,
    recorded: &BTreeMap<String, String>,
    keep: &[&str],
) -> CharmResult<ConnectorDiff>
where
    W: Workload + ?Sized,
{
    let current = connectors_on_disk(workload)?;
    let diff = diff_connectors(&current, recorded, keep);
    if diff.is_empty() {
        return Ok(diff);
    }
    for (name, config) in &diff.add {
        workload.push(&connector_path(name), config)?;
    }
    for name in &diff.remove {
        workload.remove_path(&connector_path(name), false)?;
    }
    workload.restart()?;
    info!(added = diff.add.len(), removed = diff.remove.len(), "connectors converged");
    Ok(diff)
}
