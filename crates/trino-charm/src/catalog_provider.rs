//! Catalog provider (`trino-catalog` relation).
//!
//! Consumers learn where to reach the engine, which catalogs exist and
//! which secret holds the user credentials.

use serde::Serialize;
use tracing::{debug, info};

use trino_core::literals::{
    CATALOG_RELATION, HTTPS_PORT, TRINO_CATALOGS_KEY, TRINO_CREDENTIALS_KEY, TRINO_URL_KEY,
};
use trino_core::{CatalogDocument, CharmConfig};
use trino_state::StateStore;

use crate::error::{CharmError, CharmResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogSummary {
    pub name: String,
    pub connector: String,
    pub description: String,
}

/// Catalog summaries sorted by name.
pub fn catalog_summaries(doc: Option<&CatalogDocument>) -> Vec<CatalogSummary> {
    let mut summaries: Vec<CatalogSummary> = doc
        .map(CatalogDocument::summaries)
        .unwrap_or_default()
        .into_iter()
        .map(|(name, connector)| CatalogSummary {
            name,
            connector,
            description: String::new(),
        })
        .collect();
    summaries.sort_by(|a, b| a.name.cmp(&b.name));
    summaries
}

/// The fields published on every catalog relation.
pub fn provider_fields(
    config: &CharmConfig,
    catalogs: Option<&CatalogDocument>,
) -> CharmResult<Vec<(&'static str, Option<String>)>> {
    let url = config
        .external_hostname
        .as_ref()
        .map(|host| format!("{host}:{HTTPS_PORT}"));
    let summaries = serde_json::to_string(&catalog_summaries(catalogs))
        .map_err(|e| CharmError::Template {
            name: TRINO_CATALOGS_KEY.to_string(),
            reason: e.to_string(),
        })?;
    Ok(vec![
        (TRINO_URL_KEY, url),
        (TRINO_CATALOGS_KEY, Some(summaries)),
        (TRINO_CREDENTIALS_KEY, config.user_secret_id.clone()),
    ])
}

/// Publish to one relation, or to all when `relation_id` is `None`.
///
/// Fields without a value are left as they are. Returns the number of
/// relations whose data changed.
pub fn publish(
    store: &StateStore,
    config: &CharmConfig,
    catalogs: Option<&CatalogDocument>,
    is_leader: bool,
    relation_id: Option<u32>,
) -> CharmResult<usize> {
    if !is_leader {
        return Ok(0);
    }
    let fields = provider_fields(config, catalogs)?;
    let updates: Vec<(&str, Option<String>)> = fields
        .into_iter()
        .filter(|(_, value)| value.is_some())
        .collect();

    let ids: Vec<u32> = match relation_id {
        Some(id) => vec![id],
        None => store
            .relations(CATALOG_RELATION)?
            .iter()
            .map(|r| r.id)
            .collect(),
    };
    let mut changed = 0;
    for id in ids {
        if store.set_local_data(CATALOG_RELATION, id, &updates)? {
            changed += 1;
            info!(relation = id, "catalog provider data updated");
        } else {
            debug!(relation = id, "catalog provider data unchanged");
        }
    }
    Ok(changed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use trino_state::RelationRecord;

    const DOC: &str = r#"
backends:
  pg:
    connector: postgresql
    url: jdbc:postgresql://db:5432
  bq:
    connector: bigquery
catalogs:
  zeta:
    backend: pg
    database: app
    secret-id: s1
  alpha:
    backend: bq
    project: p
    secret-id: s2
"#;

    #[test]
    fn test_summaries_sorted() {
        let doc = CatalogDocument::parse(DOC).unwrap();
        let summaries = catalog_summaries(Some(&doc));
        assert_eq!(summaries[0].name, "alpha");
        assert_eq!(summaries[0].connector, "bigquery");
        assert_eq!(summaries[1].name, "zeta");
        assert!(catalog_summaries(None).is_empty());
    }

    #[test]
    fn test_url_skipped_without_hostname() {
        let fields = provider_fields(&CharmConfig::default(), None).unwrap();
        assert_eq!(fields[0], (TRINO_URL_KEY, None));
        assert_eq!(fields[1], (TRINO_CATALOGS_KEY, Some("[]".to_string())));
    }

    #[test]
    fn test_publish_writes_only_on_change() {
        let store = StateStore::open_in_memory().unwrap();
        store
            .put_relation(&RelationRecord::new(CATALOG_RELATION, 2, "superset"))
            .unwrap();
        let config = CharmConfig {
            external_hostname: Some("trino.example.com".into()),
            user_secret_id: Some("secret:users".into()),
            ..CharmConfig::default()
        };
        let doc = CatalogDocument::parse(DOC).unwrap();

        assert_eq!(publish(&store, &config, Some(&doc), false, None).unwrap(), 0);
        assert_eq!(publish(&store, &config, Some(&doc), true, None).unwrap(), 1);
        assert_eq!(publish(&store, &config, Some(&doc), true, Some(2)).unwrap(), 0);

        let relation = store.get_relation(CATALOG_RELATION, 2).unwrap().unwrap();
        assert_eq!(relation.local[TRINO_URL_KEY], "trino.example.com:8443");
        assert_eq!(relation.local[TRINO_CREDENTIALS_KEY], "secret:users");
        let catalogs: serde_json::Value =
            serde_json::from_str(&relation.local[TRINO_CATALOGS_KEY]).unwrap();
        assert_eq!(catalogs[1]["name"], "zeta");
        assert_eq!(catalogs[1]["description"], "");
    }
}
