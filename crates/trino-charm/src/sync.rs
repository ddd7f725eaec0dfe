//! Idempotent workload sync.
//!
//! Every pass fully rewrites the configuration files, clears and
//! rebuilds the catalog and certificate directories, brings TLS and
//! policy plugin material in line with node state, and replans the
//! service only when the plan differs. Running a pass twice with the
//! same inputs leaves the workload unchanged after the first.

use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use trino_catalog::{RenderedCatalogs, substitute_placeholders};
use trino_core::literals::{
    CA_FILE, CATALOG_DIR, CERTS_DIR, CONF_DIR, ENTRYPOINT, JAVA_CACERTS_PASSWORD, JAVA_HOME,
    KEYSTORE_FILE, OPENSEARCH_CERT_ALIAS, OPENSEARCH_CERT_PATH, RANGER_PLUGIN_DIR,
    RANGER_POLICY_DIR, RANGER_PROPERTIES_FILE, SERVER_CERT_FILE, SERVER_KEY_FILE,
    TRUSTSTORE_FILE, trino_path,
};
use trino_state::NodeState;

use crate::error::{CharmError, CharmResult};
use crate::merge::DesiredConfig;
use crate::templates::render_config_files;
use crate::workload::{ServicePlan, Workload, WorkloadResult};

/// What one sync pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Configuration files whose content changed.
    pub changed: Vec<String>,
    /// Catalog names present after the rebuild.
    pub catalogs: Vec<String>,
    pub replanned: bool,
}

/// Bring the workload in line with `desired`.
pub fn sync_workload<W>(workload: &W, desired: &DesiredConfig) -> CharmResult<SyncReport>
where
    W: Workload + ?Sized,
{
    let files = render_config_files(desired)?;
    let mut report = SyncReport::default();

    for (path, content) in &files.write {
        let before = workload.pull(path)?;
        workload.push(path, content)?;
        if before.as_deref() != Some(content.as_str()) {
            report.changed.push(path.clone());
        }
    }
    for path in &files.remove {
        if workload.remove_path(path, false)? {
            report.changed.push(path.clone());
        }
    }

    sync_policy_plugin(workload, &desired.node, &report.changed)?;
    sync_tls(workload, &desired.node)?;
    sync_opensearch_cert(workload, &desired.node)?;

    report.catalogs = rebuild_catalogs(
        workload,
        &desired.rendered,
        &desired.node.connectors,
        desired.node.truststore_password.as_deref(),
    )?;
    report.replanned = update_plan(workload, &desired.env)?;

    info!(
        changed = report.changed.len(),
        catalogs = report.catalogs.len(),
        replanned = report.replanned,
        "workload synced"
    );
    Ok(report)
}

// ── Catalogs ──────────────────────────────────────────────────────

/// Clear the catalog and certificate directories and write them again.
///
/// Rendered catalogs come first; connectors recorded by the connector
/// actions are written alongside unless a rendered catalog has the same
/// name. Returns the catalog names written.
pub fn rebuild_catalogs<W>(
    workload: &W,
    rendered: &RenderedCatalogs,
    connectors: &BTreeMap<String, String>,
    truststore_pwd: Option<&str>,
) -> CharmResult<Vec<String>>
where
    W: Workload + ?Sized,
{
    let catalog_dir = trino_path(&[CATALOG_DIR]);
    let certs_dir = trino_path(&[CERTS_DIR]);
    workload.remove_path(&catalog_dir, true)?;
    workload.remove_path(&certs_dir, true)?;

    let truststore = trino_path(&[CONF_DIR, TRUSTSTORE_FILE]);
    let pwd = truststore_pwd.unwrap_or_default();
    let mut written = Vec::new();

    for (name, text) in &rendered.catalogs {
        let content = substitute_placeholders(text, &truststore, pwd);
        workload.push(&format!("{catalog_dir}/{name}.properties"), &content)?;
        written.push(name.clone());
    }
    for (name, text) in connectors {
        if rendered.catalogs.contains_key(name) {
            warn!(connector = %name, "connector shadowed by a configured catalog");
            continue;
        }
        workload.push(&format!("{catalog_dir}/{name}.properties"), text)?;
        written.push(name.clone());
    }
    for (file, content) in &rendered.credential_files {
        workload.push(&trino_path(&[CONF_DIR, file]), content)?;
    }
    for (alias, pem) in &rendered.certs {
        let path = format!("{certs_dir}/{alias}.crt");
        workload.push(&path, pem)?;
        match truststore_pwd {
            Some(pwd) => import_cert(workload, alias, &path, &truststore, pwd),
            None => warn!(alias = %alias, "no truststore yet, certificate not imported"),
        }
    }

    written.sort();
    debug!(catalogs = ?written, "catalog directory rebuilt");
    Ok(written)
}

/// Replace `alias` in `keystore` with the certificate at `path`.
///
/// Failures are logged; a missing trust entry surfaces as a connection
/// error of the affected catalog only.
pub fn import_cert<W>(workload: &W, alias: &str, path: &str, keystore: &str, pwd: &str)
where
    W: Workload + ?Sized,
{
    if let Err(e) = delete_cert(workload, alias, keystore, pwd) {
        debug!(alias, error = %e, "no previous certificate to delete");
    }
    if let Err(e) = workload.exec(&[
        "keytool", "-import", "-v", "-alias", alias, "-file", path, "-keystore", keystore,
        "-storepass", pwd, "-noprompt",
    ]) {
        warn!(alias, error = %e, "failed to import certificate");
    }
}

/// Drop `alias` from `keystore`.
pub fn delete_cert<W>(workload: &W, alias: &str, keystore: &str, pwd: &str) -> WorkloadResult<()>
where
    W: Workload + ?Sized,
{
    workload.exec(&[
        "keytool", "-delete", "-alias", alias, "-keystore", keystore, "-storepass", pwd,
    ])
}

// ── TLS ───────────────────────────────────────────────────────────

fn sync_tls<W>(workload: &W, node: &NodeState) -> WorkloadResult<()>
where
    W: Workload + ?Sized,
{
    let path = |file: &str| trino_path(&[CONF_DIR, file]);

    let (Some(key), Some(cert), Some(ca)) = (&node.private_key, &node.certificate, &node.ca)
    else {
        for file in [SERVER_KEY_FILE, CA_FILE, SERVER_CERT_FILE, TRUSTSTORE_FILE, KEYSTORE_FILE] {
            if workload.remove_path(&path(file), false)? {
                info!(file, "removed tls material");
            }
        }
        return Ok(());
    };

    let cert_changed = workload.pull(&path(SERVER_CERT_FILE))?.as_deref() != Some(cert.as_str());
    workload.push(&path(SERVER_KEY_FILE), key)?;
    workload.push(&path(CA_FILE), ca)?;
    workload.push(&path(SERVER_CERT_FILE), cert)?;
    if cert_changed {
        // Stores built from a previous certificate are stale.
        workload.remove_path(&path(TRUSTSTORE_FILE), false)?;
        workload.remove_path(&path(KEYSTORE_FILE), false)?;
    }

    if let Some(pwd) = &node.truststore_password {
        if !workload.exists(&path(TRUSTSTORE_FILE))? {
            workload.exec(&[
                "keytool", "-import", "-v", "-alias", "cert", "-file",
                &path(SERVER_CERT_FILE), "-keystore", &path(TRUSTSTORE_FILE),
                "-storepass", pwd, "-noprompt",
            ])?;
            info!("truststore created");
        }
    }
    if let Some(pwd) = &node.keystore_password {
        if !workload.exists(&path(KEYSTORE_FILE))? {
            let pass = format!("pass:{pwd}");
            workload.exec(&[
                "openssl", "pkcs12", "-export", "-in", &path(SERVER_CERT_FILE), "-inkey",
                &path(SERVER_KEY_FILE), "-passin", &pass, "-certfile", &path(SERVER_CERT_FILE),
                "-out", &path(KEYSTORE_FILE), "-password", &pass,
            ])?;
            info!("keystore created");
        }
    }
    Ok(())
}

// ── Policy plugin and audit index ─────────────────────────────────

fn sync_policy_plugin<W>(workload: &W, node: &NodeState, changed: &[String]) -> CharmResult<()>
where
    W: Workload + ?Sized,
{
    let properties = format!("{RANGER_PLUGIN_DIR}/{RANGER_PROPERTIES_FILE}");
    if node.ranger_enabled {
        if changed.contains(&properties) {
            let script = format!("{RANGER_PLUGIN_DIR}/enable-trino-plugin.sh");
            workload
                .exec(&["bash", &script])
                .map_err(|source| CharmError::RangerPlugin {
                    action: "enable",
                    source,
                })?;
            info!("policy plugin enabled");
        }
        return Ok(());
    }

    if !workload.exists(&properties)? {
        return Ok(());
    }
    let script = format!("{RANGER_PLUGIN_DIR}/disable-trino-plugin.sh");
    workload
        .exec(&["bash", &script])
        .map_err(|source| CharmError::RangerPlugin {
            action: "disable",
            source,
        })?;
    workload.remove_path(RANGER_POLICY_DIR, true)?;
    workload.remove_path(RANGER_PLUGIN_DIR, true)?;
    info!("policy plugin disabled");
    Ok(())
}

fn sync_opensearch_cert<W>(workload: &W, node: &NodeState) -> WorkloadResult<()>
where
    W: Workload + ?Sized,
{
    let cacerts = format!("{JAVA_HOME}/lib/security/cacerts");
    match (node.opensearch_enabled, &node.opensearch_ca) {
        (true, Some(ca)) => {
            if workload.pull(OPENSEARCH_CERT_PATH)?.as_deref() != Some(ca.as_str()) {
                workload.push(OPENSEARCH_CERT_PATH, ca)?;
                import_cert(
                    workload,
                    OPENSEARCH_CERT_ALIAS,
                    OPENSEARCH_CERT_PATH,
                    &cacerts,
                    JAVA_CACERTS_PASSWORD,
                );
            }
        }
        _ => {
            if workload.remove_path(OPENSEARCH_CERT_PATH, false)? {
                let keytool = format!("{JAVA_HOME}/bin/keytool");
                if let Err(e) = workload.exec(&[
                    &keytool, "-delete", "-keystore", &cacerts, "-alias",
                    OPENSEARCH_CERT_ALIAS, "-storepass", JAVA_CACERTS_PASSWORD,
                ]) {
                    warn!(error = %e, "failed to remove audit index certificate");
                }
            }
        }
    }
    Ok(())
}

// ── Service plan ──────────────────────────────────────────────────

pub fn service_plan(env: &BTreeMap<String, String>) -> ServicePlan {
    ServicePlan {
        summary: "trino server".to_string(),
        command: ENTRYPOINT.to_string(),
        startup: "enabled".to_string(),
        environment: env.clone(),
    }
}

/// Replan only when the plan differs from the applied one.
pub fn update_plan<W>(workload: &W, env: &BTreeMap<String, String>) -> CharmResult<bool>
where
    W: Workload + ?Sized,
{
    let plan = service_plan(env);
    if workload.plan()?.as_ref() == Some(&plan) {
        debug!("service plan unchanged");
        return Ok(false);
    }
    workload.replan(&plan)?;
    info!("service plan applied");
    Ok(true)
}
