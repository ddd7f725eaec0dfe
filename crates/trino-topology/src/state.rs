//! Per-node topology state.

use tracing::debug;

use trino_core::NodeRole;
use trino_core::literals::{COORDINATOR_RELATION, WORKER_RELATION};
use trino_state::{StateResult, StateStore};

use crate::error::TopologyError;

/// Which of the two topology relations exist on this application.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelationPresence {
    /// The `trino-coordinator` endpoint (offered by a coordinator) is related.
    pub coordinator: bool,
    /// The `trino-worker` endpoint (used by a worker) is related.
    pub worker: bool,
}

impl RelationPresence {
    pub fn observe(store: &StateStore) -> StateResult<Self> {
        Ok(Self {
            coordinator: !store.relations(COORDINATOR_RELATION)?.is_empty(),
            worker: !store.relations(WORKER_RELATION)?.is_empty(),
        })
    }
}

#[derive(Debug)]
pub enum TopologyState {
    /// No peer-group state yet.
    Uninitialized,
    /// Peer group formed; the role's counterpart relation is missing.
    AwaitingPeer(TopologyError),
    /// The role-appropriate relation is present and no foreign one.
    Synced,
    /// A relation illegal for the configured role is present.
    Blocked(TopologyError),
}

impl TopologyState {
    /// Whether this state keeps the node from reporting active.
    pub fn is_blocking(&self) -> bool {
        !matches!(self, TopologyState::Synced)
    }

    /// The reason a blocking state carries, if any.
    pub fn reason(&self) -> Option<&TopologyError> {
        match self {
            TopologyState::AwaitingPeer(e) | TopologyState::Blocked(e) => Some(e),
            TopologyState::Uninitialized | TopologyState::Synced => None,
        }
    }
}

/// Evaluate the topology of a node.
///
/// A coordinator needs `trino-coordinator` and must not have
/// `trino-worker`; a worker is the mirror image. A combined node must
/// have neither.
pub fn evaluate(role: NodeRole, peer_ready: bool, presence: RelationPresence) -> TopologyState {
    if !peer_ready {
        return TopologyState::Uninitialized;
    }
    let foreign = |endpoint: &str| {
        TopologyState::Blocked(TopologyError::ForeignRelation {
            role,
            endpoint: endpoint.to_string(),
        })
    };
    let state = match role {
        NodeRole::Coordinator if presence.worker => foreign(WORKER_RELATION),
        NodeRole::Coordinator if !presence.coordinator => TopologyState::AwaitingPeer(
            TopologyError::MissingRelation("Missing Trino worker relation."),
        ),
        NodeRole::Worker if presence.coordinator => foreign(COORDINATOR_RELATION),
        NodeRole::Worker if !presence.worker => TopologyState::AwaitingPeer(
            TopologyError::MissingRelation("Missing Trino coordinator relation."),
        ),
        NodeRole::All if presence.coordinator => foreign(COORDINATOR_RELATION),
        NodeRole::All if presence.worker => foreign(WORKER_RELATION),
        _ => TopologyState::Synced,
    };
    debug!(%role, ?presence, ?state, "topology evaluated");
    state
}

#[cfg(test)]
mod tests {
    use super::*;

    fn presence(coordinator: bool, worker: bool) -> RelationPresence {
        RelationPresence {
            coordinator,
            worker,
        }
    }

    #[test]
    fn exclusivity_grid() {
        for role in [NodeRole::Coordinator, NodeRole::Worker, NodeRole::All] {
            for coordinator in [false, true] {
                for worker in [false, true] {
                    let state = evaluate(role, true, presence(coordinator, worker));
                    let expected_ok = match role {
                        NodeRole::Coordinator => coordinator && !worker,
                        NodeRole::Worker => worker && !coordinator,
                        NodeRole::All => !coordinator && !worker,
                    };
                    assert_eq!(
                        !state.is_blocking(),
                        expected_ok,
                        "{role} coordinator={coordinator} worker={worker}"
                    );
                }
            }
        }
    }

    #[test]
    fn uninitialized_before_peer_group() {
        let state = evaluate(NodeRole::Coordinator, false, presence(true, false));
        assert!(matches!(state, TopologyState::Uninitialized));
        assert!(state.is_blocking());
    }

    #[test]
    fn missing_counterpart_messages() {
        let coordinator = evaluate(NodeRole::Coordinator, true, presence(false, false));
        assert_eq!(
            coordinator.reason().unwrap().to_string(),
            "Missing Trino worker relation."
        );
        let worker = evaluate(NodeRole::Worker, true, presence(false, false));
        assert_eq!(
            worker.reason().unwrap().to_string(),
            "Missing Trino coordinator relation."
        );
    }

    #[test]
    fn foreign_relation_blocks() {
        let state = evaluate(NodeRole::Worker, true, presence(true, true));
        assert!(matches!(
            state,
            TopologyState::Blocked(TopologyError::ForeignRelation { ref endpoint, .. })
                if endpoint == COORDINATOR_RELATION
        ));
        assert!(
            state
                .reason()
                .unwrap()
                .to_string()
                .starts_with("Incorrect trino relation configuration")
        );
    }

    #[test]
    fn presence_is_observed_from_store() {
        let store = StateStore::open_in_memory().unwrap();
        assert_eq!(RelationPresence::observe(&store).unwrap(), presence(false, false));
        store
            .put_relation(&trino_state::RelationRecord::new(WORKER_RELATION, 4, "coord"))
            .unwrap();
        assert_eq!(RelationPresence::observe(&store).unwrap(), presence(false, true));
    }
}
