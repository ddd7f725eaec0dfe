//! Coordinator/worker topology protocol.
//!
//! One coordinator application publishes its discovery URI and catalog
//! document to N worker applications. The catalog document travels in a
//! labelled secret granted to each worker; the relation record only
//! carries the secret reference.
//!
//! - [`state`] decides whether the relations present are legal for the
//!   configured role.
//! - [`coordinator`] publishes and withdraws the catalog secret.
//! - [`worker`] adopts published data into node state.

pub mod coordinator;
pub mod error;
pub mod state;
pub mod worker;

pub use coordinator::{PublishOutcome, publish, relation_broken as coordinator_relation_broken};
pub use error::{TopologyError, TopologyResult};
pub use state::{RelationPresence, TopologyState, evaluate};
pub use worker::{
    SyncOutcome, adopt_from_relation, adopt_secret_change,
    relation_broken as worker_relation_broken,
};
