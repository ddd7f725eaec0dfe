//! Container resource requirements for the Trino statefulset.
//!
//! The orchestrator may revert resource settings independently, so the
//! patch is re-evaluated on every install and status tick. Only
//! containers whose observed limits/requests differ from the desired
//! ones are rewritten, and nothing is submitted when none differ.

pub mod api;
pub mod error;
pub mod patch;
pub mod requirements;

pub use api::{FileStatefulSetApi, MemoryStatefulSetApi, StatefulSetApi};
pub use error::{PatchError, PatchResult};
pub use patch::{PatchOutcome, patch_statefulset};
pub use requirements::{
    Container, LimitsRequests, Quantity, ResourceRequirements, ResourceSpec, ResourceUpdates,
    StatefulSet, build_resource_requirements, is_patched,
};
