//! charm.toml configuration parser.
//!
//! `CharmConfig` is the raw, operator-supplied configuration. It is kept
//! stringly-typed so that the validation layer can reject bad values with
//! a descriptive status instead of a deserialization failure; `Settings`
//! is the typed view produced once validation passes.

use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};

use crate::catalog::CatalogDocument;
use crate::literals::APP_NAME;
use crate::types::{AclMode, LogLevel, NodeRole};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case", default)]
pub struct CharmConfig {
    pub log_level: String,
    #[serde(deserialize_with = "lenient_string")]
    pub google_client_id: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub google_client_secret: Option<String>,
    /// Kept verbatim: a whitespace-only proxy is a validation error, not unset.
    pub web_proxy: Option<String>,
    pub charm_function: String,
    #[serde(deserialize_with = "lenient_string")]
    pub discovery_uri: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub catalog_config: Option<String>,
    pub acl_mode_default: String,
    pub acl_user_pattern: String,
    pub acl_catalog_pattern: String,
    #[serde(deserialize_with = "lenient_string")]
    pub user_secret_id: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub additional_jvm_options: Option<String>,
    pub coordinator_request_timeout: String,
    pub coordinator_connect_timeout: String,
    pub worker_request_timeout: String,
    pub max_concurrent_queries: u32,
    #[serde(deserialize_with = "lenient_string")]
    pub external_hostname: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub ranger_service_name: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub oauth_user_mapping: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub workload_memory_limits: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub workload_memory_requests: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub workload_cpu_limits: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub workload_cpu_requests: Option<String>,
}

impl Default for CharmConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            google_client_id: None,
            google_client_secret: None,
            web_proxy: None,
            charm_function: "all".to_string(),
            discovery_uri: None,
            catalog_config: None,
            acl_mode_default: "all".to_string(),
            acl_user_pattern: ".*".to_string(),
            acl_catalog_pattern: ".*".to_string(),
            user_secret_id: None,
            additional_jvm_options: None,
            coordinator_request_timeout: "10m".to_string(),
            coordinator_connect_timeout: "30s".to_string(),
            worker_request_timeout: "30s".to_string(),
            max_concurrent_queries: 5,
            external_hostname: None,
            ranger_service_name: None,
            oauth_user_mapping: None,
            workload_memory_limits: None,
            workload_memory_requests: None,
            workload_cpu_limits: None,
            workload_cpu_requests: None,
        }
    }
}

impl CharmConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: CharmConfig = toml::from_str(content)?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Hostname advertised to clients and related applications.
    pub fn external_hostname(&self) -> &str {
        self.external_hostname.as_deref().unwrap_or(APP_NAME)
    }
}

/// Typed configuration, produced by the validation layer.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub role: NodeRole,
    pub log_level: LogLevel,
    pub acl_mode: AclMode,
    pub web_proxy: Option<String>,
    /// Parsed `catalog-config`, when set locally.
    pub catalogs: Option<CatalogDocument>,
}

/// Accept strings, integers and floats; treat blank strings as unset.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Str(String),
        Int(i64),
        Float(f64),
    }

    let raw: Option<Raw> = Option::deserialize(deserializer)?;
    Ok(match raw {
        None => None,
        Some(Raw::Str(s)) if s.is_empty() => None,
        Some(Raw::Str(s)) => Some(s),
        Some(Raw::Int(i)) => Some(i.to_string()),
        Some(Raw::Float(f)) => Some(f.to_string()),
    })
}
