//! trino-state: persisted operator state.
//!
//! Backed by [redb](https://docs.rs/redb), this crate holds everything the
//! host runtime would otherwise keep for the operator between invocations:
//!
//! - the peer-group `NodeState` (one record per application),
//! - relation records (`{endpoint}:{id}`), each side owning its own fields,
//! - secrets with labels, revisions and per-application grants.
//!
//! All values are JSON-serialized into `&[u8]` columns. The `StateStore`
//! is `Clone` (backed by `Arc<Database>`).

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::{LeaderGate, StateStore};
pub use types::*;
