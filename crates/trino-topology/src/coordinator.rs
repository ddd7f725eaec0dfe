//! Coordinator side: the single writer of cluster-wide catalog truth.

use tracing::{debug, info};

use trino_core::literals::{
    CATALOG_SECRET_FIELD, CATALOG_SECRET_ID_KEY, CATALOG_SECRET_LABEL, COORDINATOR_RELATION,
    DISCOVERY_URI_KEY, USER_SECRET_ID_KEY,
};
use trino_state::{SecretContent, SecretId, StateStore};

use crate::error::TopologyResult;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    /// This unit is not the leader; nothing was written.
    NotLeader,
    /// No worker is related.
    NoRelations,
    Published {
        relations: usize,
        /// Catalog secret, absent when the catalog document is empty.
        secret_id: Option<SecretId>,
        /// Whether any relation record or secret content changed.
        changed: bool,
    },
}

/// Publish the discovery URI and catalog document to every related worker.
///
/// The catalog secret is found by its stable label, so republishing
/// updates the existing secret instead of creating another one; a new
/// revision is only created when the content differs.
pub fn publish(
    store: &StateStore,
    app: &str,
    is_leader: bool,
    discovery_uri: &str,
    catalog_config: Option<&str>,
    user_secret_id: Option<&str>,
) -> TopologyResult<PublishOutcome> {
    if !is_leader {
        return Ok(PublishOutcome::NotLeader);
    }
    let relations = store.relations(COORDINATOR_RELATION)?;
    if relations.is_empty() {
        debug!("no worker relations to publish to");
        return Ok(PublishOutcome::NoRelations);
    }

    let catalogs = catalog_config.filter(|c| !c.trim().is_empty());
    let existing = store.secret_by_label(app, CATALOG_SECRET_LABEL)?;
    let mut changed = false;

    let secret_id = match (catalogs, existing) {
        (Some(text), Some(secret)) => {
            changed |= store.set_secret_content(&secret.id, catalog_content(text))?;
            Some(secret.id)
        }
        (Some(text), None) => {
            changed = true;
            Some(store.create_secret(app, Some(CATALOG_SECRET_LABEL), catalog_content(text))?)
        }
        (None, Some(secret)) => {
            changed |= store.remove_secret(&secret.id)?;
            None
        }
        (None, None) => None,
    };

    for relation in &relations {
        if let Some(id) = &secret_id {
            store.grant_secret(id, &relation.remote_app)?;
        }
        changed |= store.set_local_data(
            COORDINATOR_RELATION,
            relation.id,
            &[
                (DISCOVERY_URI_KEY, Some(discovery_uri.to_string())),
                (CATALOG_SECRET_ID_KEY, secret_id.clone()),
                (USER_SECRET_ID_KEY, user_secret_id.map(str::to_string)),
            ],
        )?;
    }

    info!(
        relations = relations.len(),
        secret = ?secret_id,
        changed,
        "published catalog configuration to workers"
    );
    Ok(PublishOutcome::Published {
        relations: relations.len(),
        secret_id,
        changed,
    })
}

/// Withdraw access after a worker relation is gone.
///
/// `remote_app` lost its grant; once no worker relation remains the
/// catalog secret is removed with all its revisions.
pub fn relation_broken(
    store: &StateStore,
    app: &str,
    is_leader: bool,
    remote_app: &str,
) -> TopologyResult<bool> {
    if !is_leader {
        return Ok(false);
    }
    let Some(secret) = store.secret_by_label(app, CATALOG_SECRET_LABEL)? else {
        return Ok(false);
    };
    if store.relations(COORDINATOR_RELATION)?.is_empty() {
        store.remove_secret(&secret.id)?;
        info!(secret = %secret.id, "last worker relation gone, catalog secret removed");
    } else {
        store.revoke_secret(&secret.id, remote_app)?;
        info!(secret = %secret.id, worker = %remote_app, "catalog secret revoked");
    }
    Ok(true)
}

fn catalog_content(text: &str) -> SecretContent {
    let mut content = SecretContent::new();
    content.insert(CATALOG_SECRET_FIELD.to_string(), text.to_string());
    content
}

#[cfg(test)]
mod tests {
    use super::*;
    use trino_state::RelationRecord;

    const APP: &str = "coord";
    const URI: &str = "http://coord:8080";
    const DOC: &str = "backends: {}\ncatalogs: {}\n";

    fn store_with_worker() -> StateStore {
        let store = StateStore::open_in_memory().unwrap();
        store
            .put_relation(&RelationRecord::new(COORDINATOR_RELATION, 1, "workers"))
            .unwrap();
        store
    }

    #[test]
    fn non_leader_does_not_publish() {
        let store = store_with_worker();
        let outcome = publish(&store, APP, false, URI, Some(DOC), None).unwrap();
        assert_eq!(outcome, PublishOutcome::NotLeader);
        assert!(store.secret_by_label(APP, CATALOG_SECRET_LABEL).unwrap().is_none());
    }

    #[test]
    fn publish_writes_relation_and_grants_secret() {
        let store = store_with_worker();
        let outcome = publish(&store, APP, true, URI, Some(DOC), Some("secret:users")).unwrap();
        let id = match outcome {
            PublishOutcome::Published {
                secret_id: Some(id),
                changed: true,
                relations: 1,
            } => id,
            other => panic!("unexpected outcome {other:?}"),
        };

        let rel = store.get_relation(COORDINATOR_RELATION, 1).unwrap().unwrap();
        assert_eq!(rel.local[DISCOVERY_URI_KEY], URI);
        assert_eq!(rel.local[CATALOG_SECRET_ID_KEY], id);
        assert_eq!(rel.local[USER_SECRET_ID_KEY], "secret:users");
        assert_eq!(
            store.read_secret(&id, "workers").unwrap()[CATALOG_SECRET_FIELD],
            DOC
        );
    }

    #[test]
    fn republish_reuses_secret_by_label() {
        let store = store_with_worker();
        publish(&store, APP, true, URI, Some(DOC), None).unwrap();
        let first = store.secret_by_label(APP, CATALOG_SECRET_LABEL).unwrap().unwrap();

        let outcome = publish(&store, APP, true, URI, Some(DOC), None).unwrap();
        assert!(matches!(outcome, PublishOutcome::Published { changed: false, .. }));

        publish(&store, APP, true, URI, Some("catalogs: {}\n"), None).unwrap();
        let second = store.secret_by_label(APP, CATALOG_SECRET_LABEL).unwrap().unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.revision, first.revision + 1);
    }

    #[test]
    fn empty_catalog_withdraws_secret_reference() {
        let store = store_with_worker();
        publish(&store, APP, true, URI, Some(DOC), None).unwrap();
        let outcome = publish(&store, APP, true, URI, Some("  "), None).unwrap();
        assert!(matches!(outcome, PublishOutcome::Published { secret_id: None, .. }));

        let rel = store.get_relation(COORDINATOR_RELATION, 1).unwrap().unwrap();
        assert!(!rel.local.contains_key(CATALOG_SECRET_ID_KEY));
        assert!(store.secret_by_label(APP, CATALOG_SECRET_LABEL).unwrap().is_none());
    }

    #[test]
    fn no_relations_is_reported() {
        let store = StateStore::open_in_memory().unwrap();
        assert_eq!(
            publish(&store, APP, true, URI, Some(DOC), None).unwrap(),
            PublishOutcome::NoRelations
        );
    }

    #[test]
    fn broken_relation_revokes_then_removes() {
        let store = store_with_worker();
        store
            .put_relation(&RelationRecord::new(COORDINATOR_RELATION, 2, "more-workers"))
            .unwrap();
        publish(&store, APP, true, URI, Some(DOC), None).unwrap();
        let id = store.secret_by_label(APP, CATALOG_SECRET_LABEL).unwrap().unwrap().id;

        store.delete_relation(COORDINATOR_RELATION, 2).unwrap();
        assert!(relation_broken(&store, APP, true, "more-workers").unwrap());
        assert!(store.read_secret(&id, "more-workers").is_err());
        assert!(store.read_secret(&id, "workers").is_ok());

        store.delete_relation(COORDINATOR_RELATION, 1).unwrap();
        assert!(relation_broken(&store, APP, true, "workers").unwrap());
        assert!(store.secret(&id).unwrap().is_none());
    }
}
