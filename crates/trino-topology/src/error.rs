use thiserror::Error;
use trino_core::NodeRole;
use trino_state::StateError;

pub type TopologyResult<T> = Result<T, TopologyError>;

#[derive(Debug, Error)]
pub enum TopologyError {
    #[error("Incorrect trino relation configuration: {role} must not use the {endpoint} relation.")]
    ForeignRelation { role: NodeRole, endpoint: String },

    #[error("{0}")]
    MissingRelation(&'static str),

    #[error("catalog secret {id:?} has no {field:?} field")]
    MalformedSecret { id: String, field: String },

    #[error(transparent)]
    State(#[from] StateError),
}

impl TopologyError {
    /// Whether the failure is a missing or ungranted secret.
    pub fn is_secret_access(&self) -> bool {
        matches!(self, TopologyError::State(e) if e.is_secret_access())
    }
}
