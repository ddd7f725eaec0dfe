//! Workload configuration files.
//!
//! Property files are rendered from embedded `minijinja` templates; the
//! JSON files are built with `serde_json`. [`render_config_files`] yields
//! the complete file set for one node, plus the conditional files that
//! must not exist in the current configuration.

use std::collections::BTreeMap;

use minijinja::Environment;
use serde::Serialize;
use serde_json::json;

use trino_core::literals::{
    ACCESS_CONTROL_FILE, AUTHENTICATOR_FILE, CONF_DIR, CONFIG_FILE, HTTP_PORT, HTTPS_PORT,
    JVM_FILE, KEYSTORE_FILE, LOG_FILE, OPENSEARCH_INDEX_NAME, PASSWORD_DB_FILE,
    RANGER_PLUGIN_DIR, RANGER_PROPERTIES_FILE, RESOURCE_GROUPS_CONFIG_FILE,
    RESOURCE_GROUPS_FILE, RULES_FILE, trino_path,
};
use trino_core::{AclMode, NodeRole};

use crate::error::{CharmError, CharmResult};
use crate::merge::DesiredConfig;

const CONFIG_TEMPLATE: &str = r#"coordinator={{ coordinator }}
{% if coordinator %}
node-scheduler.include-coordinator={{ include_coordinator }}
exchange.http-client.request-timeout={{ coordinator_request_timeout }}
exchange.http-client.connect-timeout={{ coordinator_connect_timeout }}
{% else %}
exchange.http-client.request-timeout={{ worker_request_timeout }}
{% endif %}
http-server.http.port={{ http_port }}
discovery.uri={{ discovery_uri }}
{% if https %}
http-server.https.enabled=true
http-server.https.port={{ https_port }}
http-server.https.keystore.path={{ https.keystore_path }}
http-server.https.keystore.key={{ https.keystore_password }}
http-server.process-forwarded=true
{% endif %}
{% if internal_secret %}
internal-communication.shared-secret={{ internal_secret }}
{% endif %}
{% if authentication %}
http-server.authentication.type={{ authentication }}
{% endif %}
{% if oauth %}
http-server.authentication.oauth2.issuer=https://accounts.google.com
http-server.authentication.oauth2.client-id={{ oauth.client_id }}
http-server.authentication.oauth2.client-secret={{ oauth.client_secret }}
http-server.authentication.oauth2.principal-field=email
{% if oauth.user_mapping %}
http-server.authentication.oauth2.user-mapping.pattern={{ oauth.user_mapping }}
{% endif %}
web-ui.authentication.type=oauth2
{% endif %}
{% if web_proxy %}
oauth2-jwk.http-client.http-proxy={{ web_proxy }}
{% endif %}
"#;

const LOG_TEMPLATE: &str = "io.trino={{ log_level | upper }}\n";

const AUTHENTICATOR_TEMPLATE: &str = r#"password-authenticator.name=file
file.password-file={{ password_db }}
file.refresh-period=1m
file.auth-token-cache.max-size=1000
"#;

const RESOURCE_GROUPS_TEMPLATE: &str = r#"resource-groups.configuration-manager=file
resource-groups.config-file={{ config_file }}
"#;

const FILE_ACCESS_CONTROL_TEMPLATE: &str = r#"access-control.name=file
security.config-file={{ rules_file }}
"#;

const RANGER_TEMPLATE: &str = r#"POLICY_MGR_URL={{ policy_manager_url }}
REPOSITORY_NAME={{ repository_name }}
COMPONENT_INSTALL_DIR_NAME=/usr/lib/trino
XAAUDIT.SUMMARY.ENABLE=false
{% if opensearch %}
XAAUDIT.ELASTICSEARCH.ENABLE=true
XAAUDIT.ELASTICSEARCH.URL={{ opensearch.host }}
XAAUDIT.ELASTICSEARCH.PORT={{ opensearch.port }}
XAAUDIT.ELASTICSEARCH.USER={{ opensearch.user }}
XAAUDIT.ELASTICSEARCH.PASSWORD={{ opensearch.password }}
XAAUDIT.ELASTICSEARCH.INDEX={{ opensearch.index }}
XAAUDIT.ELASTICSEARCH.PROTOCOL=https
{% else %}
XAAUDIT.ELASTICSEARCH.ENABLE=false
{% endif %}
"#;

// ── Contexts ──────────────────────────────────────────────────────

#[derive(Serialize)]
struct HttpsContext {
    keystore_path: String,
    keystore_password: String,
}

#[derive(Serialize)]
struct OauthContext<'a> {
    client_id: &'a str,
    client_secret: &'a str,
    user_mapping: Option<&'a str>,
}

#[derive(Serialize)]
struct ConfigContext<'a> {
    coordinator: bool,
    include_coordinator: bool,
    coordinator_request_timeout: &'a str,
    coordinator_connect_timeout: &'a str,
    worker_request_timeout: &'a str,
    http_port: u16,
    https_port: u16,
    discovery_uri: &'a str,
    https: Option<HttpsContext>,
    authentication: Option<String>,
    oauth: Option<OauthContext<'a>>,
    web_proxy: Option<&'a str>,
    internal_secret: Option<&'a str>,
}

#[derive(Serialize)]
struct OpensearchContext<'a> {
    host: &'a str,
    port: &'a str,
    user: &'a str,
    password: &'a str,
    index: &'a str,
}

#[derive(Serialize)]
struct RangerContext<'a> {
    policy_manager_url: &'a str,
    repository_name: &'a str,
    opensearch: Option<OpensearchContext<'a>>,
}

// ── Rendering ─────────────────────────────────────────────────────

/// Files to write and files to remove, by absolute container path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigFiles {
    pub write: BTreeMap<String, String>,
    pub remove: Vec<String>,
}

fn environment() -> CharmResult<Environment<'static>> {
    let mut env = Environment::new();
    env.set_trim_blocks(true);
    env.set_lstrip_blocks(true);
    env.set_keep_trailing_newline(true);
    for (name, source) in [
        (CONFIG_FILE, CONFIG_TEMPLATE),
        (LOG_FILE, LOG_TEMPLATE),
        (AUTHENTICATOR_FILE, AUTHENTICATOR_TEMPLATE),
        (RESOURCE_GROUPS_FILE, RESOURCE_GROUPS_TEMPLATE),
        (ACCESS_CONTROL_FILE, FILE_ACCESS_CONTROL_TEMPLATE),
        (RANGER_PROPERTIES_FILE, RANGER_TEMPLATE),
    ] {
        env.add_template(name, source).map_err(|e| template_error(name, e))?;
    }
    Ok(env)
}

fn template_error(name: &str, e: impl std::fmt::Display) -> CharmError {
    CharmError::Template {
        name: name.to_string(),
        reason: e.to_string(),
    }
}

fn render<S: Serialize>(env: &Environment<'_>, name: &str, ctx: S) -> CharmResult<String> {
    env.get_template(name)
        .and_then(|t| t.render(ctx))
        .map_err(|e| template_error(name, e))
}

fn to_json(name: &str, value: &serde_json::Value) -> CharmResult<String> {
    serde_json::to_string_pretty(value)
        .map(|mut s| {
            s.push('\n');
            s
        })
        .map_err(|e| template_error(name, e))
}

/// Render the complete configuration file set for `desired`.
pub fn render_config_files(desired: &DesiredConfig) -> CharmResult<ConfigFiles> {
    let env = environment()?;
    let config = &desired.config;
    let node = &desired.node;
    let role = desired.role();
    let mut files = ConfigFiles::default();

    let oauth = match (&config.google_client_id, &config.google_client_secret) {
        (Some(id), Some(secret)) => Some(OauthContext {
            client_id: id,
            client_secret: secret,
            user_mapping: config.oauth_user_mapping.as_deref(),
        }),
        _ => None,
    };
    let coordinator = role != NodeRole::Worker;

    let mut auth_types = Vec::new();
    if coordinator && oauth.is_some() {
        auth_types.push("oauth2");
    }
    if coordinator && !desired.users.is_empty() {
        auth_types.push("password");
    }

    let https = match (node.tls_ready(), &node.keystore_password) {
        (true, Some(password)) => Some(HttpsContext {
            keystore_path: trino_path(&[CONF_DIR, KEYSTORE_FILE]),
            keystore_password: password.clone(),
        }),
        _ => None,
    };

    let ctx = ConfigContext {
        coordinator,
        include_coordinator: role == NodeRole::All,
        coordinator_request_timeout: &config.coordinator_request_timeout,
        coordinator_connect_timeout: &config.coordinator_connect_timeout,
        worker_request_timeout: &config.worker_request_timeout,
        http_port: HTTP_PORT,
        https_port: HTTPS_PORT,
        discovery_uri: &desired.discovery_uri,
        https,
        authentication: (!auth_types.is_empty()).then(|| auth_types.join(",")),
        oauth: if coordinator { oauth } else { None },
        web_proxy: desired.settings.web_proxy.as_deref(),
        internal_secret: node.internal_secret.as_deref(),
    };
    files
        .write
        .insert(trino_path(&[CONFIG_FILE]), render(&env, CONFIG_FILE, ctx)?);

    files.write.insert(
        trino_path(&[LOG_FILE]),
        render(
            &env,
            LOG_FILE,
            minijinja::context! { log_level => desired.settings.log_level.as_str() },
        )?,
    );

    let mut jvm = desired.jvm_options.join("\n");
    jvm.push('\n');
    files.write.insert(trino_path(&[JVM_FILE]), jvm);

    // Password authentication
    let password_db = trino_path(&[PASSWORD_DB_FILE]);
    let authenticator = trino_path(&[AUTHENTICATOR_FILE]);
    if desired.users.is_empty() {
        files.remove.push(password_db);
        files.remove.push(authenticator);
    } else {
        let db: String = desired
            .users
            .iter()
            .map(|(user, hash)| format!("{user}:{hash}\n"))
            .collect();
        files.write.insert(
            authenticator,
            render(
                &env,
                AUTHENTICATOR_FILE,
                minijinja::context! { password_db => &password_db },
            )?,
        );
        files.write.insert(password_db, db);
    }

    // Resource groups
    let groups_json = trino_path(&[RESOURCE_GROUPS_CONFIG_FILE]);
    files.write.insert(
        trino_path(&[RESOURCE_GROUPS_FILE]),
        render(
            &env,
            RESOURCE_GROUPS_FILE,
            minijinja::context! { config_file => &groups_json },
        )?,
    );
    files.write.insert(
        groups_json,
        to_json(
            RESOURCE_GROUPS_CONFIG_FILE,
            &resource_groups(config.max_concurrent_queries),
        )?,
    );

    // Access control
    let rules = trino_path(&[RULES_FILE]);
    let ranger_properties = format!("{RANGER_PLUGIN_DIR}/{RANGER_PROPERTIES_FILE}");
    if node.ranger_enabled {
        // The policy plugin owns access-control.properties while enabled.
        files.remove.push(rules);
        let repository_name = node.policy_service_name.as_deref().unwrap_or_default();
        let endpoint = node.opensearch_endpoint.as_deref().unwrap_or_default();
        let (host, port) = endpoint.split_once(':').unwrap_or((endpoint, ""));
        let opensearch = node.opensearch_enabled.then(|| OpensearchContext {
            host,
            port,
            user: node.opensearch_user.as_deref().unwrap_or_default(),
            password: node.opensearch_password.as_deref().unwrap_or_default(),
            index: OPENSEARCH_INDEX_NAME,
        });
        let ctx = RangerContext {
            policy_manager_url: node.policy_manager_url.as_deref().unwrap_or_default(),
            repository_name,
            opensearch,
        };
        files
            .write
            .insert(ranger_properties, render(&env, RANGER_PROPERTIES_FILE, ctx)?);
    } else {
        files.write.insert(
            trino_path(&[ACCESS_CONTROL_FILE]),
            render(
                &env,
                ACCESS_CONTROL_FILE,
                minijinja::context! { rules_file => &rules },
            )?,
        );
        files.write.insert(
            rules,
            to_json(
                RULES_FILE,
                &access_rules(
                    desired.settings.acl_mode,
                    &config.acl_user_pattern,
                    &config.acl_catalog_pattern,
                ),
            )?,
        );
    }

    Ok(files)
}

/// File-based access control rules derived from the ACL settings.
fn access_rules(mode: AclMode, user_pattern: &str, catalog_pattern: &str) -> serde_json::Value {
    let allow = match mode {
        AclMode::All => "all",
        AclMode::None => "none",
    };
    json!({
        "catalogs": [
            { "catalog": "system", "allow": "read-only" },
            { "user": user_pattern, "catalog": catalog_pattern, "allow": allow },
        ]
    })
}

fn resource_groups(max_concurrent_queries: u32) -> serde_json::Value {
    json!({
        "rootGroups": [{
            "name": "global",
            "softMemoryLimit": "100%",
            "hardConcurrencyLimit": max_concurrent_queries,
            "maxQueued": 1000,
        }],
        "selectors": [{ "group": "global" }],
    })
}
