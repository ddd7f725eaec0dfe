use thiserror::Error;

pub type PatchResult<T> = Result<T, PatchError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatchError {
    #[error("statefulset {0:?} not found")]
    NotFound(String),

    #[error("orchestrator API error: {0}")]
    Api(String),

    #[error("io error: {0}")]
    Io(String),

    #[error("serialization error: {0}")]
    Serialize(String),
}

impl PatchError {
    /// Errors worth retrying on the next status tick.
    pub fn is_transient(&self) -> bool {
        matches!(self, PatchError::Api(_) | PatchError::Io(_))
    }
}
