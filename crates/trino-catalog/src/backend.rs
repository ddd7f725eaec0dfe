//! Catalog backends.
//!
//! Each [`BackendKind`] maps to a pair of functions: one fetching the
//! credentials a catalog needs from its secret, one rendering the catalog
//! property files from them. The kind set, its schemas and its handlers
//! live together here so a new backend is a single match arm away.

use std::collections::BTreeMap;

use serde_yaml::Value;
use tracing::{debug, info};

use trino_core::catalog::Fields;
use trino_core::literals::{CONF_DIR, SSL_PATH_PLACEHOLDER, SSL_PWD_PLACEHOLDER, trino_path};
use trino_core::CatalogDocument;
use trino_state::{SecretContent, StateStore};

use crate::error::{CatalogError, CatalogResult, ValidationError};
use crate::validate::{
    BIGQUERY_BACKEND_SCHEMA, BIGQUERY_CATALOG_SCHEMA, GSHEETS_BACKEND_SCHEMA,
    GSHEETS_CATALOG_SCHEMA, REPLICA_SCHEMA, SQL_BACKEND_SCHEMA, SQL_CATALOG_SCHEMA, Schema,
    validate_catalog_document, validate_keys, validate_name,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    Postgresql,
    Mysql,
    Redshift,
    Bigquery,
    Gsheets,
}

/// Credentials fetched for one catalog.
#[derive(Debug, Clone, PartialEq)]
enum Credentials {
    /// One entry per replica, plus certificates to trust.
    Replicas {
        replicas: Vec<Fields>,
        certs: BTreeMap<String, String>,
    },
    /// A service account JSON document.
    ServiceAccount(String),
}

/// Everything a handler needs to know about the catalog being rendered.
struct CatalogInput<'a> {
    name: &'a str,
    info: &'a Fields,
    backend: &'a Fields,
    store: &'a StateStore,
    consumer: &'a str,
}

type FetchFn = fn(&CatalogInput<'_>) -> CatalogResult<Credentials>;
type RenderFn = fn(&CatalogInput<'_>, Credentials, &mut RenderedCatalogs) -> CatalogResult<()>;

impl BackendKind {
    pub fn from_connector(connector: &str) -> Option<Self> {
        match connector {
            "postgresql" => Some(BackendKind::Postgresql),
            "mysql" => Some(BackendKind::Mysql),
            "redshift" => Some(BackendKind::Redshift),
            "bigquery" => Some(BackendKind::Bigquery),
            "gsheets" => Some(BackendKind::Gsheets),
            _ => None,
        }
    }

    pub fn connector(&self) -> &'static str {
        match self {
            BackendKind::Postgresql => "postgresql",
            BackendKind::Mysql => "mysql",
            BackendKind::Redshift => "redshift",
            BackendKind::Bigquery => "bigquery",
            BackendKind::Gsheets => "gsheets",
        }
    }

    pub fn backend_schema(&self) -> &'static Schema {
        match self {
            BackendKind::Postgresql | BackendKind::Mysql | BackendKind::Redshift => {
                &SQL_BACKEND_SCHEMA
            }
            BackendKind::Bigquery => &BIGQUERY_BACKEND_SCHEMA,
            BackendKind::Gsheets => &GSHEETS_BACKEND_SCHEMA,
        }
    }

    pub fn catalog_schema(&self) -> &'static Schema {
        match self {
            BackendKind::Postgresql | BackendKind::Mysql | BackendKind::Redshift => {
                &SQL_CATALOG_SCHEMA
            }
            BackendKind::Bigquery => &BIGQUERY_CATALOG_SCHEMA,
            BackendKind::Gsheets => &GSHEETS_CATALOG_SCHEMA,
        }
    }

    fn handlers(&self) -> (FetchFn, RenderFn) {
        match self {
            BackendKind::Postgresql | BackendKind::Mysql | BackendKind::Redshift => {
                (fetch_replicas, render_sql)
            }
            BackendKind::Bigquery => (fetch_bigquery_account, render_bigquery),
            BackendKind::Gsheets => (fetch_gsheets_account, render_gsheets),
        }
    }
}

/// Output of [`render_catalogs`]: what must exist in the workload after
/// the catalog directory is rebuilt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderedCatalogs {
    /// Catalog name → property text, placeholders not yet substituted.
    pub catalogs: BTreeMap<String, String>,
    /// File name under the conf directory → content (service accounts).
    pub credential_files: BTreeMap<String, String>,
    /// Certificate alias → PEM, to be imported into the truststore.
    pub certs: BTreeMap<String, String>,
}

impl RenderedCatalogs {
    pub fn is_empty(&self) -> bool {
        self.catalogs.is_empty()
    }
}

/// Render every catalog of `doc`, reading credential secrets as `consumer`.
///
/// The document is validated first, so a document adopted from a peer
/// gets the same checks as a locally configured one.
pub fn render_catalogs(
    doc: &CatalogDocument,
    store: &StateStore,
    consumer: &str,
) -> CatalogResult<RenderedCatalogs> {
    validate_catalog_document(doc)?;

    let mut rendered = RenderedCatalogs::default();
    for (name, info) in &doc.catalogs {
        let Some(backend) = doc.backend_of(name) else {
            continue;
        };
        let Some(kind) = backend
            .get("connector")
            .and_then(|c| BackendKind::from_connector(c))
        else {
            continue;
        };
        let input = CatalogInput {
            name,
            info,
            backend,
            store,
            consumer,
        };
        let (fetch, render) = kind.handlers();
        let credentials = fetch(&input)?;
        render(&input, credentials, &mut rendered)?;
        info!(catalog = %name, connector = kind.connector(), "catalog rendered");
    }
    Ok(rendered)
}

/// Replace the truststore placeholders in catalog text.
pub fn substitute_placeholders(text: &str, truststore_path: &str, truststore_pwd: &str) -> String {
    text.replace(SSL_PATH_PLACEHOLDER, truststore_path)
        .replace(SSL_PWD_PLACEHOLDER, truststore_pwd)
}

// ── Credential fetch ───────────────────────────────────────────────

fn secret_content(input: &CatalogInput<'_>) -> CatalogResult<SecretContent> {
    let id = input.info.get("secret-id").map(String::as_str).unwrap_or_default();
    input
        .store
        .read_secret(id, input.consumer)
        .map_err(|source| CatalogError::Secret {
            catalog: input.name.to_string(),
            source,
        })
}

fn fetch_replicas(input: &CatalogInput<'_>) -> CatalogResult<Credentials> {
    let secret = secret_content(input)?;
    let raw = secret
        .get("replicas")
        .ok_or_else(|| CatalogError::MissingSecretField {
            catalog: input.name.to_string(),
            field: "replicas".to_string(),
        })?;

    let mut replicas = Vec::new();
    for (replica, value) in yaml_mapping(input.name, "replicas", raw)? {
        let fields = scalar_fields(&value).ok_or_else(|| CatalogError::SecretFormat {
            catalog: input.name.to_string(),
            field: "replicas".to_string(),
            reason: format!("replica {replica:?} is not a mapping of scalars"),
        })?;
        let subject = format!("catalog {:?} replica {replica:?}", input.name);
        validate_keys(&subject, &fields, &REPLICA_SCHEMA)?;
        // An empty suffix names the replica after the catalog itself.
        match fields.get("suffix").map(String::as_str) {
            None | Some("") => {}
            Some(suffix) => validate_name(&subject, "replica suffix", suffix)?,
        }
        replicas.push(fields);
    }

    let mut certs = BTreeMap::new();
    if let Some(raw) = secret.get("cert") {
        for (alias, value) in yaml_mapping(input.name, "cert", raw)? {
            let pem = scalar_string(&value).ok_or_else(|| CatalogError::SecretFormat {
                catalog: input.name.to_string(),
                field: "cert".to_string(),
                reason: format!("certificate {alias:?} is not a string"),
            })?;
            validate_name(&format!("catalog {:?}", input.name), "certificate alias", &alias)?;
            certs.insert(alias, pem);
        }
    }
    debug!(catalog = input.name, replicas = replicas.len(), certs = certs.len(), "replica credentials fetched");
    Ok(Credentials::Replicas { replicas, certs })
}

fn fetch_service_account(input: &CatalogInput<'_>, key: &str) -> CatalogResult<Credentials> {
    let secret = secret_content(input)?;
    let raw = secret
        .get("service-accounts")
        .ok_or_else(|| CatalogError::MissingSecretField {
            catalog: input.name.to_string(),
            field: "service-accounts".to_string(),
        })?;
    let accounts = yaml_mapping(input.name, "service-accounts", raw)?;
    let account = accounts
        .get(key)
        .and_then(scalar_string)
        .ok_or_else(|| CatalogError::MissingServiceAccount {
            catalog: input.name.to_string(),
            key: key.to_string(),
        })?;
    Ok(Credentials::ServiceAccount(account))
}

/// BigQuery service accounts are keyed by project.
fn fetch_bigquery_account(input: &CatalogInput<'_>) -> CatalogResult<Credentials> {
    let project = input.info.get("project").map(String::as_str).unwrap_or_default();
    fetch_service_account(input, project)
}

/// Google Sheets service accounts are keyed by catalog name.
fn fetch_gsheets_account(input: &CatalogInput<'_>) -> CatalogResult<Credentials> {
    fetch_service_account(input, input.name)
}

// ── Property rendering ─────────────────────────────────────────────

fn field<'a>(fields: &'a Fields, key: &str) -> &'a str {
    fields.get(key).map(String::as_str).unwrap_or_default()
}

fn append_config(mut properties: String, backend: &Fields) -> String {
    properties.push_str(field(backend, "config"));
    properties
}

/// Add one rendered catalog; two catalogs may never share a file.
fn insert_catalog(
    out: &mut RenderedCatalogs,
    input: &CatalogInput<'_>,
    name: String,
    properties: String,
) -> CatalogResult<()> {
    if out.catalogs.contains_key(&name) {
        return Err(ValidationError::DuplicateCatalog {
            catalog: input.name.to_string(),
            name,
        }
        .into());
    }
    out.catalogs.insert(name, append_config(properties, input.backend));
    Ok(())
}

fn render_sql(
    input: &CatalogInput<'_>,
    credentials: Credentials,
    out: &mut RenderedCatalogs,
) -> CatalogResult<()> {
    let Credentials::Replicas { replicas, certs } = credentials else {
        return Ok(());
    };

    let connector = field(input.backend, "connector");
    let mut url = if connector == BackendKind::Redshift.connector() {
        field(input.backend, "url").to_string()
    } else {
        format!("{}/{}", field(input.backend, "url"), field(input.info, "database"))
    };
    let params = field(input.backend, "params");
    if !params.is_empty() {
        url = format!("{url}?{params}");
    }

    for replica in &replicas {
        let name = format!("{}{}", input.name, field(replica, "suffix"));
        let properties = format!(
            "connector.name={connector}\n\
             connection-url={url}\n\
             connection-user={}\n\
             connection-password={}\n",
            field(replica, "user"),
            field(replica, "password"),
        );
        insert_catalog(out, input, name, properties)?;
    }
    out.certs.extend(certs);
    Ok(())
}

fn credentials_file(input: &CatalogInput<'_>, account: String, out: &mut RenderedCatalogs) -> String {
    let file = format!("{}.json", input.name);
    let path = trino_path(&[CONF_DIR, &file]);
    out.credential_files.insert(file, account);
    path
}

fn render_bigquery(
    input: &CatalogInput<'_>,
    credentials: Credentials,
    out: &mut RenderedCatalogs,
) -> CatalogResult<()> {
    let Credentials::ServiceAccount(account) = credentials else {
        return Ok(());
    };
    let path = credentials_file(input, account, out);
    let properties = format!(
        "connector.name={}\nbigquery.project-id={}\nbigquery.credentials-file={path}\n",
        field(input.backend, "connector"),
        field(input.info, "project"),
    );
    insert_catalog(out, input, input.name.to_string(), properties)
}

fn render_gsheets(
    input: &CatalogInput<'_>,
    credentials: Credentials,
    out: &mut RenderedCatalogs,
) -> CatalogResult<()> {
    let Credentials::ServiceAccount(account) = credentials else {
        return Ok(());
    };
    let path = credentials_file(input, account, out);
    let properties = format!(
        "connector.name={}\ngsheets.metadata-sheet-id={}\ngsheets.credentials-path={path}\n",
        field(input.backend, "connector"),
        field(input.info, "metasheet-id"),
    );
    insert_catalog(out, input, input.name.to_string(), properties)
}

// ── YAML helpers ───────────────────────────────────────────────────

fn yaml_mapping(catalog: &str, field: &str, text: &str) -> CatalogResult<BTreeMap<String, Value>> {
    if text.trim().is_empty() {
        return Ok(BTreeMap::new());
    }
    serde_yaml::from_str(text).map_err(|e| CatalogError::SecretFormat {
        catalog: catalog.to_string(),
        field: field.to_string(),
        reason: e.to_string(),
    })
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn scalar_fields(value: &Value) -> Option<Fields> {
    let mapping = value.as_mapping()?;
    mapping
        .iter()
        .map(|(k, v)| Some((scalar_string(k)?, scalar_string(v)?)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use trino_state::StateError;

    const CONSUMER: &str = "trino";

    fn secret(store: &StateStore, pairs: &[(&str, &str)]) -> String {
        let content: SecretContent = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let id = store.create_secret("admin", None, content).unwrap();
        store.grant_secret(&id, CONSUMER).unwrap();
        id
    }

    fn pg_doc(secret_id: &str) -> CatalogDocument {
        CatalogDocument::parse(&format!(
            r#"
backends:
  dwh:
    connector: postgresql
    url: jdbc:postgresql://db.example.com:5432
    params: sslmode=require
    config: |
      case-insensitive-name-matching=true
      ssl.truststore={{SSL_PATH}}
catalogs:
  sales:
    backend: dwh
    database: sales
    secret-id: {secret_id}
"#
        ))
        .unwrap()
    }

    const REPLICAS: &str = r#"
ro:
  user: reader
  password: r3ad
rw:
  user: writer
  password: 12345
  suffix: _rw
"#;

    #[test]
    fn postgresql_replicas_render_one_file_each() {
        let store = StateStore::open_in_memory().unwrap();
        let id = secret(&store, &[("replicas", REPLICAS)]);
        let rendered = render_catalogs(&pg_doc(&id), &store, CONSUMER).unwrap();

        assert_eq!(
            rendered.catalogs.keys().collect::<Vec<_>>(),
            vec!["sales", "sales_rw"]
        );
        let ro = &rendered.catalogs["sales"];
        let rw = &rendered.catalogs["sales_rw"];
        let url = "connection-url=jdbc:postgresql://db.example.com:5432/sales?sslmode=require";
        assert!(ro.contains(url) && rw.contains(url));
        assert!(ro.contains("connection-user=reader\nconnection-password=r3ad\n"));
        assert!(rw.contains("connection-user=writer\nconnection-password=12345\n"));
        assert!(ro.starts_with("connector.name=postgresql\n"));
        assert!(ro.ends_with("ssl.truststore={SSL_PATH}\n"));
        assert!(rendered.certs.is_empty());
    }

    #[test]
    fn sql_certs_are_collected() {
        let store = StateStore::open_in_memory().unwrap();
        let id = secret(
            &store,
            &[
                ("replicas", "ro: {user: a, password: b}"),
                ("cert", "dwh-ca: |\n  -----BEGIN CERTIFICATE-----\n  abc\n"),
            ],
        );
        let rendered = render_catalogs(&pg_doc(&id), &store, CONSUMER).unwrap();
        assert!(rendered.certs["dwh-ca"].starts_with("-----BEGIN CERTIFICATE-----"));
    }

    #[test]
    fn redshift_url_is_used_verbatim() {
        let store = StateStore::open_in_memory().unwrap();
        let id = secret(&store, &[("replicas", "ro: {user: a, password: b}")]);
        let doc = CatalogDocument::parse(&format!(
            "backends:\n  rs:\n    connector: redshift\n    url: jdbc:redshift://c.example.com:5439/dev\n\
             catalogs:\n  lake:\n    backend: rs\n    secret-id: {id}\n"
        ))
        .unwrap();
        let rendered = render_catalogs(&doc, &store, CONSUMER).unwrap();
        assert!(
            rendered.catalogs["lake"]
                .contains("connection-url=jdbc:redshift://c.example.com:5439/dev\n")
        );
    }

    #[test]
    fn bigquery_writes_credentials_file() {
        let store = StateStore::open_in_memory().unwrap();
        let id = secret(
            &store,
            &[("service-accounts", "my-project: '{\"type\": \"service_account\"}'")],
        );
        let doc = CatalogDocument::parse(&format!(
            "backends:\n  bq:\n    connector: bigquery\n\
             catalogs:\n  warehouse:\n    backend: bq\n    project: my-project\n    secret-id: {id}\n"
        ))
        .unwrap();
        let rendered = render_catalogs(&doc, &store, CONSUMER).unwrap();
        assert_eq!(
            rendered.credential_files["warehouse.json"],
            "{\"type\": \"service_account\"}"
        );
        assert_eq!(
            rendered.catalogs["warehouse"],
            "connector.name=bigquery\n\
             bigquery.project-id=my-project\n\
             bigquery.credentials-file=/usr/lib/trino/etc/conf/warehouse.json\n"
        );
    }

    #[test]
    fn gsheets_account_is_keyed_by_catalog() {
        let store = StateStore::open_in_memory().unwrap();
        let id = secret(&store, &[("service-accounts", "budget: '{}'")]);
        let doc = CatalogDocument::parse(&format!(
            "backends:\n  gs:\n    connector: gsheets\n\
             catalogs:\n  budget:\n    backend: gs\n    metasheet-id: 1abc\n    secret-id: {id}\n"
        ))
        .unwrap();
        let rendered = render_catalogs(&doc, &store, CONSUMER).unwrap();
        assert!(rendered.catalogs["budget"].contains("gsheets.metadata-sheet-id=1abc\n"));
        assert!(rendered.catalogs["budget"].contains(
            "gsheets.credentials-path=/usr/lib/trino/etc/conf/budget.json\n"
        ));
    }

    #[test]
    fn missing_service_account_is_an_error() {
        let store = StateStore::open_in_memory().unwrap();
        let id = secret(&store, &[("service-accounts", "other: '{}'")]);
        let doc = CatalogDocument::parse(&format!(
            "backends:\n  gs:\n    connector: gsheets\n\
             catalogs:\n  budget:\n    backend: gs\n    metasheet-id: 1abc\n    secret-id: {id}\n"
        ))
        .unwrap();
        let err = render_catalogs(&doc, &store, CONSUMER).unwrap_err();
        assert!(matches!(err, CatalogError::MissingServiceAccount { key, .. } if key == "budget"));
    }

    #[test]
    fn ungranted_secret_is_a_secret_access_error() {
        let store = StateStore::open_in_memory().unwrap();
        let content: SecretContent =
            [("replicas".to_string(), REPLICAS.to_string())].into_iter().collect();
        let id = store.create_secret("admin", None, content).unwrap();
        let err = render_catalogs(&pg_doc(&id), &store, CONSUMER).unwrap_err();
        assert!(err.is_secret_access());
        assert!(matches!(
            err,
            CatalogError::Secret { source: StateError::SecretAccessDenied { .. }, .. }
        ));
    }

    #[test]
    fn replica_with_unknown_field_is_rejected() {
        let store = StateStore::open_in_memory().unwrap();
        let id = secret(&store, &[("replicas", "ro: {user: a, password: b, host: x}")]);
        let err = render_catalogs(&pg_doc(&id), &store, CONSUMER).unwrap_err();
        assert!(matches!(err, CatalogError::Validation(_)));
    }

    #[test]
    fn missing_replicas_field_is_reported() {
        let store = StateStore::open_in_memory().unwrap();
        let id = secret(&store, &[("cert", "")]);
        let err = render_catalogs(&pg_doc(&id), &store, CONSUMER).unwrap_err();
        assert!(matches!(err, CatalogError::MissingSecretField { field, .. } if field == "replicas"));
    }

    #[test]
    fn replica_suffix_cannot_leave_the_catalog_dir() {
        let store = StateStore::open_in_memory().unwrap();
        let id = secret(&store, &[("replicas", "rw: {user: a, password: b, suffix: /../../x}")]);
        let err = render_catalogs(&pg_doc(&id), &store, CONSUMER).unwrap_err();
        assert!(matches!(
            err,
            CatalogError::Validation(ValidationError::InvalidName { what: "replica suffix", value, .. })
                if value == "/../../x"
        ));
    }

    #[test]
    fn empty_suffix_is_the_catalog_name() {
        let store = StateStore::open_in_memory().unwrap();
        let id = secret(&store, &[("replicas", "ro: {user: a, password: b, suffix: ''}")]);
        let rendered = render_catalogs(&pg_doc(&id), &store, CONSUMER).unwrap();
        assert_eq!(rendered.catalogs.keys().collect::<Vec<_>>(), vec!["sales"]);
    }

    #[test]
    fn certificate_alias_must_be_a_file_stem() {
        let store = StateStore::open_in_memory().unwrap();
        let id = secret(
            &store,
            &[
                ("replicas", "ro: {user: a, password: b}"),
                ("cert", "'../ca': pem"),
            ],
        );
        let err = render_catalogs(&pg_doc(&id), &store, CONSUMER).unwrap_err();
        assert!(matches!(
            err,
            CatalogError::Validation(ValidationError::InvalidName { what: "certificate alias", .. })
        ));
    }

    #[test]
    fn replicas_without_suffix_collide() {
        let store = StateStore::open_in_memory().unwrap();
        let id = secret(
            &store,
            &[("replicas", "ro: {user: reader, password: r}\nrw: {user: writer, password: w}")],
        );
        let err = render_catalogs(&pg_doc(&id), &store, CONSUMER).unwrap_err();
        assert!(matches!(
            err,
            CatalogError::Validation(ValidationError::DuplicateCatalog { catalog, name })
                if catalog == "sales" && name == "sales"
        ));
    }

    #[test]
    fn suffixed_replica_collides_with_another_catalog() {
        let store = StateStore::open_in_memory().unwrap();
        let id = secret(&store, &[("replicas", REPLICAS)]);
        let doc = CatalogDocument::parse(&format!(
            r#"
backends:
  dwh:
    connector: postgresql
    url: jdbc:postgresql://db.example.com:5432
catalogs:
  sales:
    backend: dwh
    database: sales
    secret-id: {id}
  sales_rw:
    backend: dwh
    database: other
    secret-id: {id}
"#
        ))
        .unwrap();
        let err = render_catalogs(&doc, &store, CONSUMER).unwrap_err();
        assert!(matches!(
            err,
            CatalogError::Validation(ValidationError::DuplicateCatalog { name, .. }) if name == "sales_rw"
        ));
    }

    #[test]
    fn placeholders_are_substituted() {
        let text = "ssl.truststore={SSL_PATH}\nssl.password={SSL_PWD}\n";
        assert_eq!(
            substitute_placeholders(text, "/etc/ts.jks", "pw"),
            "ssl.truststore=/etc/ts.jks\nssl.password=pw\n"
        );
    }

    #[test]
    fn empty_document_renders_nothing() {
        let store = StateStore::open_in_memory().unwrap();
        let rendered = render_catalogs(&CatalogDocument::default(), &store, CONSUMER).unwrap();
        assert!(rendered.is_empty());
    }
}
