pub mod catalog;
pub mod config;
pub mod literals;
pub mod types;

pub use catalog::{CatalogDocument, CatalogFormatError};
pub use config::{CharmConfig, Settings};
pub use types::*;
