//! Catalog configuration document.
//!
//! The document is YAML with two top-level mappings:
//!
//! ```yaml
//! backends:
//!   dwh:
//!     connector: postgresql
//!     url: jdbc:postgresql://host:5432
//!     params: ssl=true
//!     config: |
//!       case-insensitive-name-matching=true
//! catalogs:
//!   sales:
//!     backend: dwh
//!     database: sales
//!     secret-id: secret:abc
//! ```
//!
//! Entries are kept as flat string maps; the per-backend schema check is
//! performed by the validation layer, which knows the field tables.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Flat field map of one backend or catalog entry.
pub type Fields = BTreeMap<String, String>;

/// Raised when `catalog-config` is not a well-formed catalog document.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogFormatError {
    #[error("catalog-config is not valid YAML: {0}")]
    Yaml(String),

    #[error("catalog {catalog:?} references unknown backend {backend:?}")]
    UnknownBackend { catalog: String, backend: String },

    #[error("catalog {0:?} does not declare a backend")]
    MissingBackend(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CatalogDocument {
    #[serde(default)]
    pub backends: BTreeMap<String, Fields>,
    #[serde(default)]
    pub catalogs: BTreeMap<String, Fields>,
}

impl CatalogDocument {
    /// Parse a catalog document. Blank input yields an empty document.
    pub fn parse(text: &str) -> Result<Self, CatalogFormatError> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        let doc: CatalogDocument =
            serde_yaml::from_str(text).map_err(|e| CatalogFormatError::Yaml(e.to_string()))?;
        doc.check_references()?;
        Ok(doc)
    }

    pub fn is_empty(&self) -> bool {
        self.catalogs.is_empty()
    }

    /// Backend fields referenced by a catalog entry.
    pub fn backend_of(&self, catalog: &str) -> Option<&Fields> {
        let name = self.catalogs.get(catalog)?.get("backend")?;
        self.backends.get(name)
    }

    /// `(catalog name, connector)` pairs in name order.
    pub fn summaries(&self) -> Vec<(String, String)> {
        self.catalogs
            .keys()
            .map(|name| {
                let connector = self
                    .backend_of(name)
                    .and_then(|b| b.get("connector"))
                    .cloned()
                    .unwrap_or_default();
                (name.clone(), connector)
            })
            .collect()
    }

    fn check_references(&self) -> Result<(), CatalogFormatError> {
        for (name, fields) in &self.catalogs {
            let backend = fields
                .get("backend")
                .ok_or_else(|| CatalogFormatError::MissingBackend(name.clone()))?;
            if !self.backends.contains_key(backend) {
                return Err(CatalogFormatError::UnknownBackend {
                    catalog: name.clone(),
                    backend: backend.clone(),
                });
            }
        }
        Ok(())
    }
}
