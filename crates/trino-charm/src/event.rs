//! Events delivered by the host runtime and handler results.

use trino_catalog::ConnectorRequest;

use crate::status::UnitStatus;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Install,
    /// The workload container became reachable.
    WorkloadReady,
    ConfigChanged,
    UpdateStatus,
    PeerRelationChanged,
    /// The runtime has stored the relation record before delivery.
    RelationCreated { endpoint: String, id: u32 },
    RelationChanged { endpoint: String, id: u32 },
    /// The runtime has deleted the relation record before delivery.
    RelationBroken {
        endpoint: String,
        id: u32,
        remote_app: String,
    },
    SecretChanged { label: Option<String>, id: String },
    /// A signed certificate for our CSR; PEM, plain or base64.
    CertificateAvailable { certificate: String, ca: String },
    Action(Action),
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::Install => "install",
            Event::WorkloadReady => "workload-ready",
            Event::ConfigChanged => "config-changed",
            Event::UpdateStatus => "update-status",
            Event::PeerRelationChanged => "peer-relation-changed",
            Event::RelationCreated { .. } => "relation-created",
            Event::RelationChanged { .. } => "relation-changed",
            Event::RelationBroken { .. } => "relation-broken",
            Event::SecretChanged { .. } => "secret-changed",
            Event::CertificateAvailable { .. } => "certificate-available",
            Event::Action(action) => action.name(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    AddConnector(ConnectorRequest),
    RemoveConnector(ConnectorRequest),
    Restart,
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::AddConnector(_) => "add-connector",
            Action::RemoveConnector(_) => "remove-connector",
            Action::Restart => "restart",
        }
    }
}

/// Whether the runtime should redeliver the event later.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerOutcome {
    Done,
    Deferred(String),
}

/// Everything a handler reports back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerReport {
    pub outcome: HandlerOutcome,
    pub status: UnitStatus,
    /// Result message of an action: `Ok` on success, `Err` on failure.
    pub action: Option<Result<String, String>>,
}

impl HandlerReport {
    pub fn is_deferred(&self) -> bool {
        matches!(self.outcome, HandlerOutcome::Deferred(_))
    }
}
