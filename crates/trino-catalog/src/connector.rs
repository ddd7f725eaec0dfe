//! Connector actions.
//!
//! `add-connector` and `remove-connector` manage individual catalog
//! files next to the ones rendered from `catalog-config`. Connectors
//! added this way are recorded in node state so other units converge
//! on the same set through [`diff_connectors`].

use std::collections::BTreeMap;

use tracing::{debug, warn};

use trino_core::catalog::Fields;
use trino_core::literals::SYSTEM_CONNECTORS;

use crate::error::ConnectorError;
use crate::validate::{is_valid_name, validate_membership};

/// Parameters of a connector action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectorRequest {
    pub name: String,
    /// Raw `key=value` property text, written verbatim on success.
    pub config: String,
    /// Optional PEM certificate to trust for this connector.
    pub cert: Option<String>,
}

/// Parse `key=value` property text. Blank lines and `#` comments are skipped.
pub fn parse_properties(text: &str) -> Fields {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect()
}

fn check_name(name: &str) -> Result<(), ConnectorError> {
    if is_valid_name(name) {
        Ok(())
    } else {
        Err(ConnectorError::InvalidName(name.to_string()))
    }
}

impl ConnectorRequest {
    /// Check an add request against the catalog files present on disk.
    pub fn check_add(&self, exists: bool) -> Result<(), ConnectorError> {
        check_name(&self.name)?;
        if exists {
            return Err(ConnectorError::AlreadyExists(self.name.clone()));
        }
        let properties = parse_properties(&self.config);
        validate_membership(&self.name, &properties).map_err(|source| {
            warn!(connector = %self.name, error = %source, "connector configuration rejected");
            ConnectorError::InvalidConfig {
                action: "add",
                name: self.name.clone(),
                source,
            }
        })?;
        debug!(connector = %self.name, "add-connector request accepted");
        Ok(())
    }

    /// Check a remove request. The supplied configuration must match the
    /// one recorded when the connector was added.
    pub fn check_remove(
        &self,
        exists: bool,
        recorded: &BTreeMap<String, String>,
    ) -> Result<(), ConnectorError> {
        check_name(&self.name)?;
        if !exists {
            return Err(ConnectorError::DoesNotExist(self.name.clone()));
        }
        match recorded.get(&self.name) {
            Some(config) if *config == self.config => Ok(()),
            _ => Err(ConnectorError::ConfigMismatch(self.name.clone())),
        }
    }
}

/// Changes needed to bring the on-disk connectors in line with node state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectorDiff {
    /// Connectors to write: name → property text.
    pub add: BTreeMap<String, String>,
    pub remove: Vec<String>,
}

impl ConnectorDiff {
    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.remove.is_empty()
    }
}

/// Compare on-disk connectors against the recorded target set.
///
/// Connectors present only on disk are removed, except the engine's
/// system connectors and anything listed in `keep`.
pub fn diff_connectors(
    current: &BTreeMap<String, String>,
    target: &BTreeMap<String, String>,
    keep: &[&str],
) -> ConnectorDiff {
    let add = target
        .iter()
        .filter(|(name, _)| !current.contains_key(*name))
        .map(|(name, config)| (name.clone(), config.clone()))
        .collect();
    let remove = current
        .keys()
        .filter(|name| !target.contains_key(*name))
        .filter(|name| !SYSTEM_CONNECTORS.contains(&name.as_str()))
        .filter(|name| !keep.contains(&name.as_str()))
        .cloned()
        .collect();
    ConnectorDiff { add, remove }
}
