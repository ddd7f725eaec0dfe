//! Operator error type and its mapping onto unit status.

use thiserror::Error;

use trino_catalog::{CatalogError, ConnectorError, ValidationError};
use trino_resources::PatchError;
use trino_state::StateError;
use trino_topology::TopologyError;

use crate::status::UnitStatus;
use crate::workload::WorkloadError;

pub type CharmResult<T> = Result<T, CharmError>;

#[derive(Debug, Error)]
pub enum CharmError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Topology(#[from] TopologyError),

    #[error(transparent)]
    Connector(#[from] ConnectorError),

    #[error("statefulset patch failed: {0}")]
    Patch(#[from] PatchError),

    #[error("state store: {0}")]
    State(#[from] StateError),

    #[error("workload: {0}")]
    Workload(#[from] WorkloadError),

    #[error("template {name}: {reason}")]
    Template { name: String, reason: String },

    #[error("user secret {id:?}: {reason}")]
    UserSecret { id: String, reason: String },

    #[error("Waiting for coordinator discovery URI.")]
    DiscoveryUriPending,

    #[error("tls: {0}")]
    Tls(String),

    #[error("Failed to {action} Ranger plugin.")]
    RangerPlugin {
        action: &'static str,
        #[source]
        source: WorkloadError,
    },

    #[error("A Ranger relation is required to use OpenSearch.")]
    OpensearchWithoutRanger,

    #[error("Only Trino coordinator can relate to Opensearch")]
    OpensearchNotCoordinator,

    #[error("opensearch secret {id:?} has no {field:?} field")]
    OpensearchSecret { id: String, field: String },
}

impl CharmError {
    /// Status a failed reconciliation leaves the unit in.
    pub fn status(&self) -> UnitStatus {
        match self {
            CharmError::Patch(e) if e.is_transient() => UnitStatus::Waiting(self.to_string()),
            CharmError::Workload(WorkloadError::NotConnected) | CharmError::DiscoveryUriPending => {
                UnitStatus::Waiting(self.to_string())
            }
            _ => UnitStatus::Blocked(self.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statuses_are_distinct() {
        let errors = [
            CharmError::Validation(ValidationError::BlankWebProxy),
            CharmError::Validation(ValidationError::IncompleteOauth),
            CharmError::OpensearchWithoutRanger,
            CharmError::OpensearchNotCoordinator,
            CharmError::Tls("bad pem".into()),
            CharmError::State(StateError::SecretNotFound("s1".into())),
        ];
        let messages: std::collections::BTreeSet<_> =
            errors.iter().map(|e| e.status().to_string()).collect();
        assert_eq!(messages.len(), errors.len());
    }

    #[test]
    fn test_transient_patch_waits() {
        let status = CharmError::Patch(PatchError::Api("timeout".into())).status();
        assert!(matches!(status, UnitStatus::Waiting(_)));
        let status = CharmError::Patch(PatchError::NotFound("trino-k8s".into())).status();
        assert!(status.is_blocked());
    }
}
