//! Error types for the operator state store.

use thiserror::Error;

/// Result type alias for state store operations.
pub type StateResult<T> = Result<T, StateError>;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to open database: {0}")]
    Open(String),

    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("table error: {0}")]
    Table(String),

    #[error("read error: {0}")]
    Read(String),

    #[error("write error: {0}")]
    Write(String),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("deserialization error: {0}")]
    Deserialize(String),

    #[error("relation not found: {0}")]
    RelationNotFound(String),

    #[error("secret {0:?} not found")]
    SecretNotFound(String),

    #[error("application {consumer:?} has no access to secret {id:?}")]
    SecretAccessDenied { id: String, consumer: String },
}

impl StateError {
    /// Whether this error is a missing or ungranted secret.
    pub fn is_secret_access(&self) -> bool {
        matches!(
            self,
            StateError::SecretNotFound(_) | StateError::SecretAccessDenied { .. }
        )
    }
}
