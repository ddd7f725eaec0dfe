//! Configuration merge engine.
//!
//! Folds local configuration, shared node state and dereferenced secrets
//! into one [`DesiredConfig`]: the environment map handed to the service
//! manager plus everything the file renderers need.
//!
//! Authoritative roles (`coordinator`, `all`) take the discovery URI and
//! catalog document from their own configuration. Workers take them from
//! node state, where the topology protocol left what the coordinator
//! published.

use std::collections::BTreeMap;

use tracing::debug;

use trino_catalog::{RenderedCatalogs, ValidationError, render_catalogs};
use trino_core::literals::{
    APP_NAME, HTTP_PORT, JMX_PORT, METRICS_PORT, PASSWORD_DB_FILE, TRINO_HOME, trino_path,
};
use trino_core::{CatalogDocument, CharmConfig, NodeRole, Settings};
use trino_state::{NodeState, StateStore};

use crate::error::{CharmError, CharmResult};
use crate::jvm::merge_jvm_options;

/// Field of the user secret listing `user: password-hash` lines.
pub const USERS_FIELD: &str = "users";

#[derive(Debug, Clone, PartialEq)]
pub struct DesiredConfig {
    pub config: CharmConfig,
    pub settings: Settings,
    pub discovery_uri: String,
    /// Raw catalog document in effect for this node.
    pub catalog_config: Option<String>,
    pub catalogs: Option<CatalogDocument>,
    pub rendered: RenderedCatalogs,
    pub user_secret_id: Option<String>,
    /// User → password hash, for `password.db`.
    pub users: BTreeMap<String, String>,
    pub jvm_options: Vec<String>,
    pub env: BTreeMap<String, String>,
    /// Node state snapshot the config was derived from.
    pub node: NodeState,
}

impl DesiredConfig {
    pub fn role(&self) -> NodeRole {
        self.settings.role
    }

    /// Names of catalogs rendered from the catalog document.
    pub fn catalog_names(&self) -> Vec<String> {
        self.rendered.catalogs.keys().cloned().collect()
    }
}

pub fn default_discovery_uri() -> String {
    format!("http://{APP_NAME}:{HTTP_PORT}")
}

/// Compute the desired workload configuration.
///
/// Secret dereference failures propagate; nothing is half-applied.
pub fn compute_desired_config(
    config: &CharmConfig,
    settings: &Settings,
    node: &NodeState,
    store: &StateStore,
    app: &str,
) -> CharmResult<DesiredConfig> {
    let (discovery_uri, catalog_config, user_secret_id, catalogs) =
        if settings.role.is_authoritative() {
            (
                config.discovery_uri.clone().unwrap_or_else(default_discovery_uri),
                config.catalog_config.clone(),
                config.user_secret_id.clone(),
                settings.catalogs.clone(),
            )
        } else {
            let uri = node
                .discovery_uri
                .clone()
                .ok_or(CharmError::DiscoveryUriPending)?;
            let catalogs = match &node.catalog_config {
                Some(text) if !text.trim().is_empty() => Some(
                    CatalogDocument::parse(text).map_err(ValidationError::CatalogFormat)?,
                ),
                _ => None,
            };
            (uri, node.catalog_config.clone(), node.user_secret_id.clone(), catalogs)
        };

    let rendered = match &catalogs {
        Some(doc) if !doc.is_empty() => render_catalogs(doc, store, app)?,
        _ => RenderedCatalogs::default(),
    };

    let users = match &user_secret_id {
        Some(id) => read_users(store, app, id)?,
        None => BTreeMap::new(),
    };

    let jvm_options = merge_jvm_options(config.additional_jvm_options.as_deref());

    let mut env = BTreeMap::new();
    let mut set = |key: &str, value: Option<String>| {
        if let Some(value) = value {
            env.insert(key.to_string(), value);
        }
    };
    set("LOG_LEVEL", Some(settings.log_level.to_string()));
    set("OAUTH_CLIENT_ID", config.google_client_id.clone());
    set("OAUTH_CLIENT_SECRET", config.google_client_secret.clone());
    set("OAUTH_USER_MAPPING", config.oauth_user_mapping.clone());
    set("WEB_PROXY", settings.web_proxy.clone());
    set("CHARM_FUNCTION", Some(settings.role.to_string()));
    set("DISCOVERY_URI", Some(discovery_uri.clone()));
    set("APPLICATION_NAME", Some(app.to_string()));
    set("TRINO_HOME", Some(TRINO_HOME.to_string()));
    set("JMX_PORT", Some(JMX_PORT.to_string()));
    set("METRICS_PORT", Some(METRICS_PORT.to_string()));
    set("RANGER_RELATION", Some(node.ranger_enabled.to_string()));
    set("ACL_ACCESS_MODE", Some(settings.acl_mode.to_string()));
    set("ACL_USER_PATTERN", Some(config.acl_user_pattern.clone()));
    set("ACL_CATALOG_PATTERN", Some(config.acl_catalog_pattern.clone()));
    set("JAVA_TRUSTSTORE_PWD", node.truststore_password.clone());
    set("USER_SECRET_ID", user_secret_id.clone());
    set("PASSWORD_DB_PATH", Some(trino_path(&[PASSWORD_DB_FILE])));
    set("JVM_OPTIONS", Some(jvm_options.join(" ")));
    set(
        "COORDINATOR_REQUEST_TIMEOUT",
        Some(config.coordinator_request_timeout.clone()),
    );
    set(
        "COORDINATOR_CONNECT_TIMEOUT",
        Some(config.coordinator_connect_timeout.clone()),
    );
    set("WORKER_REQUEST_TIMEOUT", Some(config.worker_request_timeout.clone()));
    set("MAX_CONCURRENT_QUERIES", Some(config.max_concurrent_queries.to_string()));
    set("CATALOG_CONFIG", catalog_config.clone());

    debug!(
        role = %settings.role,
        catalogs = rendered.catalogs.len(),
        users = users.len(),
        "desired config computed"
    );

    Ok(DesiredConfig {
        config: config.clone(),
        settings: settings.clone(),
        discovery_uri,
        catalog_config,
        catalogs,
        rendered,
        user_secret_id,
        users,
        jvm_options,
        env,
        node: node.clone(),
    })
}

/// Read `user: hash` lines from the user secret.
fn read_users(store: &StateStore, app: &str, id: &str) -> CharmResult<BTreeMap<String, String>> {
    let content = store.read_secret(id, app)?;
    let text = content.get(USERS_FIELD).ok_or_else(|| CharmError::UserSecret {
        id: id.to_string(),
        reason: format!("no {USERS_FIELD:?} field"),
    })?;
    parse_users(text).map_err(|reason| CharmError::UserSecret {
        id: id.to_string(),
        reason,
    })
}

fn parse_users(text: &str) -> Result<BTreeMap<String, String>, String> {
    let mut users = BTreeMap::new();
    for (n, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match line.split_once(':') {
            Some((user, hash)) if !user.trim().is_empty() && !hash.trim().is_empty() => {
                users.insert(user.trim().to_string(), hash.trim().to_string());
            }
            _ => return Err(format!("malformed entry on line {}", n + 1)),
        }
    }
    Ok(users)
}

#[cfg(test)]
mod tests {
    use super::*;
    use trino_catalog::check_config;
    use trino_core::literals::PEER_RELATION;
    use trino_state::{RelationRecord, SecretContent};

    fn store() -> StateStore {
        let store = StateStore::open_in_memory().unwrap();
        store
            .put_relation(&RelationRecord::new(PEER_RELATION, 0, APP_NAME))
            .unwrap();
        store
    }

    fn desired(config: &CharmConfig, node: &NodeState, store: &StateStore) -> CharmResult<DesiredConfig> {
        let settings = check_config(config).unwrap();
        compute_desired_config(config, &settings, node, store, APP_NAME)
    }

    #[test]
    fn test_parse_users() {
        let users = parse_users("alice: $2y$10$abc\n\n# ops\nbob:$2y$10$def\n").unwrap();
        assert_eq!(users.len(), 2);
        assert_eq!(users["bob"], "$2y$10$def");
        assert!(parse_users("alice\n").is_err());
        assert!(parse_users("alice:\n").is_err());
    }

    #[test]
    fn test_coordinator_env_defaults() {
        let store = store();
        let config = CharmConfig::default();
        let desired = desired(&config, &NodeState::default(), &store).unwrap();

        assert_eq!(desired.discovery_uri, "http://trino-k8s:8080");
        assert_eq!(desired.env["DISCOVERY_URI"], "http://trino-k8s:8080");
        assert_eq!(desired.env["CHARM_FUNCTION"], "all");
        assert_eq!(desired.env["RANGER_RELATION"], "false");
        assert_eq!(desired.env["JMX_PORT"], "9081");
        assert_eq!(desired.env["PASSWORD_DB_PATH"], "/usr/lib/trino/etc/password.db");
        assert!(!desired.env.contains_key("OAUTH_CLIENT_ID"));
        assert!(!desired.env.contains_key("CATALOG_CONFIG"));
        assert!(desired.rendered.is_empty());
    }

    #[test]
    fn test_worker_takes_values_from_node_state() {
        let store = store();
        let config = CharmConfig {
            charm_function: "worker".into(),
            discovery_uri: Some("http://ignored:8080".into()),
            ..CharmConfig::default()
        };
        let node = NodeState {
            discovery_uri: Some("http://coordinator:8080".into()),
            ..NodeState::default()
        };
        let desired = desired(&config, &node, &store).unwrap();
        assert_eq!(desired.env["DISCOVERY_URI"], "http://coordinator:8080");
        assert_eq!(desired.role(), NodeRole::Worker);
    }

    #[test]
    fn test_worker_without_discovery_uri_waits() {
        let store = store();
        let config = CharmConfig {
            charm_function: "worker".into(),
            ..CharmConfig::default()
        };
        let err = desired(&config, &NodeState::default(), &store).unwrap_err();
        assert!(matches!(err, CharmError::DiscoveryUriPending));
    }

    #[test]
    fn test_user_secret_dereferenced() {
        let store = store();
        let id = store
            .create_secret(
                "admin",
                None,
                SecretContent::from([(USERS_FIELD.to_string(), "alice: h1\n".to_string())]),
            )
            .unwrap();
        store.grant_secret(&id, APP_NAME).unwrap();

        let config = CharmConfig {
            user_secret_id: Some(id.clone()),
            ..CharmConfig::default()
        };
        let desired = desired(&config, &NodeState::default(), &store).unwrap();
        assert_eq!(desired.users["alice"], "h1");
        assert_eq!(desired.env["USER_SECRET_ID"], id);
    }

    #[test]
    fn test_ungranted_user_secret_fails() {
        let store = store();
        let id = store
            .create_secret(
                "admin",
                None,
                SecretContent::from([(USERS_FIELD.to_string(), "alice: h1\n".to_string())]),
            )
            .unwrap();
        let config = CharmConfig {
            user_secret_id: Some(id),
            ..CharmConfig::default()
        };
        let err = desired(&config, &NodeState::default(), &store).unwrap_err();
        assert!(err.status().is_blocked());
    }
}
