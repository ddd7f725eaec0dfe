//! trino-charm: operator for a Trino cluster on Kubernetes.
//!
//! Each unit runs one [`TrinoCharm`] next to its Trino container. Events
//! from the host runtime are handled one at a time; every handler ends in
//! a reconcile pass that recomputes the desired configuration and syncs
//! it to the workload idempotently.
//!
//! - [`merge`] folds configuration, node state and secrets together.
//! - [`sync`] writes files, rebuilds catalogs and replans the service.
//! - [`resources`] derives container resources for the statefulset patch.
//! - [`policy`], [`opensearch`], [`tls`] and [`catalog_provider`] handle
//!   the optional integrations.

pub mod actions;
pub mod catalog_provider;
pub mod charm;
pub mod error;
pub mod event;
pub mod jvm;
pub mod merge;
pub mod opensearch;
pub mod policy;
pub mod resources;
pub mod status;
pub mod sync;
pub mod templates;
pub mod tls;
pub mod workload;

pub use charm::TrinoCharm;
pub use error::{CharmError, CharmResult};
pub use event::{Action, Event, HandlerOutcome, HandlerReport};
pub use merge::{DesiredConfig, compute_desired_config};
pub use status::UnitStatus;
pub use workload::{LocalWorkload, ServicePlan, Workload, WorkloadError};
