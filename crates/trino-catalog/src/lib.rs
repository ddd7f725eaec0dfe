//! Catalog handling for the Trino operator.
//!
//! - [`validate`] gates every reconciliation: configuration enums,
//!   catalog document shape, per-backend schemas and the connector
//!   field table used by the connector actions.
//! - [`backend`] turns a validated catalog document into rendered
//!   catalog property files, dereferencing credential secrets.
//! - [`connector`] implements the add/remove connector actions and the
//!   peer convergence diff.

pub mod backend;
pub mod connector;
pub mod error;
pub mod validate;

pub use backend::{BackendKind, RenderedCatalogs, render_catalogs, substitute_placeholders};
pub use connector::{ConnectorDiff, ConnectorRequest, diff_connectors, parse_properties};
pub use error::{CatalogError, CatalogResult, ConnectorError, ValidationError, ValidationResult};
pub use validate::check_config;
