//! redb table definitions for the operator state store.
//!
//! Each table uses `&str` keys and `&[u8]` values (JSON-serialized types).

use redb::TableDefinition;

/// Peer-group node state keyed by `{app}`.
pub const PEER_STATE: TableDefinition<&str, &[u8]> = TableDefinition::new("peer_state");

/// Relation records keyed by `{endpoint}:{relation_id}`.
pub const RELATIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("relations");

/// Secrets keyed by `{secret_id}`.
pub const SECRETS: TableDefinition<&str, &[u8]> = TableDefinition::new("secrets");
