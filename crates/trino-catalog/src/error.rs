//! Error types for validation, catalog rendering and connector actions.

use thiserror::Error;
use trino_core::CatalogFormatError;
use trino_state::StateError;

pub type ValidationResult<T> = Result<T, ValidationError>;
pub type CatalogResult<T> = Result<T, CatalogError>;

/// A configuration value was rejected. Every variant renders as a
/// distinct, user-facing message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("config: invalid log level {0:?}")]
    InvalidLogLevel(String),

    #[error("config: invalid charm function {0:?}")]
    InvalidRole(String),

    #[error("config: invalid acl-mode-default {0:?}, expected \"all\" or \"none\"")]
    InvalidAclMode(String),

    #[error("config: web-proxy is set but blank")]
    BlankWebProxy,

    #[error("config: google-client-id and google-client-secret must be set together")]
    IncompleteOauth,

    #[error(transparent)]
    CatalogFormat(#[from] CatalogFormatError),

    #[error("{subject}: unsupported connector {connector:?}")]
    UnsupportedConnector { subject: String, connector: String },

    #[error("{subject}: missing required field {field:?}")]
    MissingField { subject: String, field: String },

    #[error("{subject}: field {field:?} is not allowed")]
    UnexpectedField { subject: String, field: String },

    #[error("{subject}: {url:?} is not a valid jdbc:{dialect} url")]
    InvalidJdbcUrl {
        subject: String,
        dialect: String,
        url: String,
    },

    #[error("{subject}: invalid {what} {value:?}, expected letters, digits, '_' or '-'")]
    InvalidName {
        subject: String,
        what: &'static str,
        value: String,
    },

    #[error("catalog {catalog:?} renders {name:?}, which another catalog already renders")]
    DuplicateCatalog { catalog: String, name: String },
}

/// Rendering a catalog failed after validation passed.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("catalog {catalog:?}: {source}")]
    Secret {
        catalog: String,
        #[source]
        source: StateError,
    },

    #[error("catalog {catalog:?}: secret has no {field:?} field")]
    MissingSecretField { catalog: String, field: String },

    #[error("catalog {catalog:?}: malformed {field:?} in secret: {reason}")]
    SecretFormat {
        catalog: String,
        field: String,
        reason: String,
    },

    #[error("catalog {catalog:?}: no service account for {key:?}")]
    MissingServiceAccount { catalog: String, key: String },
}

impl CatalogError {
    /// Whether the failure is a missing or ungranted secret.
    pub fn is_secret_access(&self) -> bool {
        matches!(self, CatalogError::Secret { source, .. } if source.is_secret_access())
    }
}

/// A connector action was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectorError {
    #[error("Failed to add {0}, connector already exists")]
    AlreadyExists(String),

    #[error("Failed to remove {0}, connector does not exist")]
    DoesNotExist(String),

    #[error("Failed to {action} {name}, invalid configuration: {source}")]
    InvalidConfig {
        action: &'static str,
        name: String,
        #[source]
        source: ValidationError,
    },

    #[error("Failed to remove {0}, configuration does not match")]
    ConfigMismatch(String),

    #[error("invalid connector name {0:?}")]
    InvalidName(String),
}
