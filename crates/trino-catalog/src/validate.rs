//! Validation layer.
//!
//! Every check here runs before any state is computed or any file is
//! written. A failure aborts the reconciliation with a descriptive
//! [`ValidationError`].

use std::collections::BTreeMap;

use regex::Regex;
use tracing::debug;

use trino_core::catalog::Fields;
use trino_core::{AclMode, CatalogDocument, CharmConfig, LogLevel, NodeRole, Settings};

use crate::backend::BackendKind;
use crate::error::{ValidationError, ValidationResult};

// ── Schemas ────────────────────────────────────────────────────────

/// Allowed keys of one flat mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schema {
    pub required: &'static [&'static str],
    pub optional: &'static [&'static str],
}

impl Schema {
    fn allows(&self, key: &str) -> bool {
        self.required.contains(&key) || self.optional.contains(&key)
    }
}

pub const SQL_BACKEND_SCHEMA: Schema = Schema {
    required: &["connector", "url"],
    optional: &["params", "config"],
};

pub const BIGQUERY_BACKEND_SCHEMA: Schema = Schema {
    required: &["connector"],
    optional: &["config"],
};

pub const GSHEETS_BACKEND_SCHEMA: Schema = Schema {
    required: &["connector"],
    optional: &["config"],
};

pub const SQL_CATALOG_SCHEMA: Schema = Schema {
    required: &["backend", "secret-id"],
    optional: &["database"],
};

pub const BIGQUERY_CATALOG_SCHEMA: Schema = Schema {
    required: &["backend", "secret-id", "project"],
    optional: &[],
};

pub const GSHEETS_CATALOG_SCHEMA: Schema = Schema {
    required: &["backend", "secret-id", "metasheet-id"],
    optional: &[],
};

/// One entry of the `replicas` mapping in a SQL credentials secret.
pub const REPLICA_SCHEMA: Schema = Schema {
    required: &["user", "password"],
    optional: &["suffix"],
};

/// Check that `fields` holds every required key and nothing outside
/// required ∪ optional.
pub fn validate_keys(subject: &str, fields: &Fields, schema: &Schema) -> ValidationResult<()> {
    for field in schema.required {
        if !fields.contains_key(*field) {
            return Err(ValidationError::MissingField {
                subject: subject.to_string(),
                field: field.to_string(),
            });
        }
    }
    if let Some(extra) = fields.keys().find(|k| !schema.allows(k)) {
        return Err(ValidationError::UnexpectedField {
            subject: subject.to_string(),
            field: extra.clone(),
        });
    }
    Ok(())
}

// ── Connector field table ──────────────────────────────────────────

const JDBC_REQUIRED: &[&str] = &[
    "connector.name",
    "connection-url",
    "connection-user",
    "connection-password",
];

const JDBC_TUNING: &[&str] = &[
    "case-insensitive-name-matching",
    "case-insensitive-name-matching.cache-ttl",
    "metadata.cache-ttl",
    "metadata.cache-missing",
    "metadata.cache-maximum-size",
    "write.batch-size",
    "dynamic-filtering.enabled",
    "dynamic-filtering.wait-timeout",
];

/// Properties accepted by the connector actions, per `connector.name`.
pub const CONNECTOR_FIELDS: &[(&str, Schema)] = &[
    (
        "accumulo",
        Schema {
            required: &[
                "connector.name",
                "accumulo.instance",
                "accumulo.zookeepers",
                "accumulo.username",
                "accumulo.password",
            ],
            optional: &[],
        },
    ),
    (
        "bigquery",
        Schema {
            required: &["connector.name", "bigquery.project-id"],
            optional: &[],
        },
    ),
    (
        "cassandra",
        Schema {
            required: &[
                "connector.name",
                "cassandra.contact-points",
                "cassandra.load-policy.dc-aware.local-dc",
            ],
            optional: &[],
        },
    ),
    ("clickhouse", Schema { required: JDBC_REQUIRED, optional: &[] }),
    (
        "delta_lake",
        Schema {
            required: &["connector.name", "hive.metastore.uri"],
            optional: &[],
        },
    ),
    (
        "druid",
        Schema {
            required: &["connector.name", "connection-url"],
            optional: &[],
        },
    ),
    (
        "elasticsearch",
        Schema {
            required: &[
                "connector.name",
                "elasticsearch.host",
                "elasticsearch.port",
                "elasticsearch.default-schema-name",
            ],
            optional: &[],
        },
    ),
    (
        "hive",
        Schema {
            required: &["connector.name", "hive.metastore.uri"],
            optional: &[],
        },
    ),
    (
        "hudi",
        Schema {
            required: &["connector.name", "hive.metastore.uri"],
            optional: &[],
        },
    ),
    ("ignite", Schema { required: JDBC_REQUIRED, optional: &[] }),
    (
        "jmx",
        Schema {
            required: &[
                "connector.name",
                "jmx.dump-tables",
                "jmx.dump-period",
                "jmx.max-entries",
            ],
            optional: &[],
        },
    ),
    (
        "kinesis",
        Schema {
            required: &["connector.name", "kinesis.access-key", "kinesis.secret-key"],
            optional: &[],
        },
    ),
    ("mariadb", Schema { required: JDBC_REQUIRED, optional: &[] }),
    (
        "mongodb",
        Schema {
            required: &["connector.name", "mongodb.connection-url"],
            optional: &[],
        },
    ),
    ("mysql", Schema { required: JDBC_REQUIRED, optional: JDBC_TUNING }),
    ("oracle", Schema { required: JDBC_REQUIRED, optional: &[] }),
    (
        "pinot",
        Schema {
            required: &["connector.name", "pinot.controller-urls"],
            optional: &[],
        },
    ),
    ("postgresql", Schema { required: JDBC_REQUIRED, optional: JDBC_TUNING }),
    (
        "redis",
        Schema {
            required: &["connector.name", "redis.table-names", "redis.nodes"],
            optional: &[],
        },
    ),
    ("redshift", Schema { required: JDBC_REQUIRED, optional: &[] }),
    ("singlestore", Schema { required: JDBC_REQUIRED, optional: &[] }),
    ("sqlserver", Schema { required: JDBC_REQUIRED, optional: &[] }),
    (
        "trino_thrift",
        Schema {
            required: &["connector.name", "trino.thrift.client.addresses"],
            optional: &[],
        },
    ),
];

pub fn connector_schema(connector: &str) -> Option<&'static Schema> {
    CONNECTOR_FIELDS
        .iter()
        .find(|(name, _)| *name == connector)
        .map(|(_, schema)| schema)
}

/// Validate a connector property map against the connector field table.
///
/// The `postgresql` connector additionally needs a well-formed JDBC URL:
/// a malformed one keeps the whole engine from starting.
pub fn validate_membership(subject: &str, properties: &Fields) -> ValidationResult<()> {
    let connector = properties
        .get("connector.name")
        .ok_or_else(|| ValidationError::MissingField {
            subject: subject.to_string(),
            field: "connector.name".to_string(),
        })?;
    let schema = connector_schema(connector).ok_or_else(|| {
        ValidationError::UnsupportedConnector {
            subject: subject.to_string(),
            connector: connector.clone(),
        }
    })?;
    validate_keys(subject, properties, schema)?;
    if connector == "postgresql" {
        let url = properties
            .get("connection-url")
            .map(String::as_str)
            .unwrap_or_default();
        validate_jdbc_url(subject, "postgresql", url)?;
    }
    Ok(())
}

/// Check `url` against `jdbc:<dialect>://host[:port][/path][?params]`.
pub fn validate_jdbc_url(subject: &str, dialect: &str, url: &str) -> ValidationResult<()> {
    let pattern = format!(
        r"^jdbc:{}://[A-Za-z0-9._-]+(:[0-9]{{1,5}})?(/[^\s?]*)?(\?\S*)?$",
        regex::escape(dialect)
    );
    let valid = Regex::new(&pattern)
        .map(|re| re.is_match(url))
        .unwrap_or(false);
    if valid {
        Ok(())
    } else {
        Err(ValidationError::InvalidJdbcUrl {
            subject: subject.to_string(),
            dialect: dialect.to_string(),
            url: url.to_string(),
        })
    }
}

/// Catalog names, replica suffixes, certificate aliases and connector
/// names all become file names in the workload.
pub const NAME_PATTERN: &str = r"^[A-Za-z0-9_-]+$";

pub fn is_valid_name(value: &str) -> bool {
    Regex::new(NAME_PATTERN)
        .map(|re| re.is_match(value))
        .unwrap_or(false)
}

/// Reject `value` unless it is safe to use as a file name stem.
pub fn validate_name(subject: &str, what: &'static str, value: &str) -> ValidationResult<()> {
    if is_valid_name(value) {
        Ok(())
    } else {
        Err(ValidationError::InvalidName {
            subject: subject.to_string(),
            what,
            value: value.to_string(),
        })
    }
}

// ── Catalog document ───────────────────────────────────────────────

/// Check every backend and catalog entry of a parsed document against
/// the schema of its backend kind.
pub fn validate_catalog_document(doc: &CatalogDocument) -> ValidationResult<()> {
    let mut kinds = BTreeMap::new();
    for (name, backend) in &doc.backends {
        let subject = format!("backend {name:?}");
        let kind = backend_kind(&subject, backend)?;
        validate_keys(&subject, backend, kind.backend_schema())?;
        if kind == BackendKind::Postgresql {
            let url = backend.get("url").map(String::as_str).unwrap_or_default();
            validate_jdbc_url(&subject, "postgresql", url)?;
        }
        kinds.insert(name.as_str(), kind);
    }

    for (name, catalog) in &doc.catalogs {
        let subject = format!("catalog {name:?}");
        validate_name(&subject, "catalog name", name)?;
        // Dangling references were rejected while parsing.
        let Some(kind) = catalog.get("backend").and_then(|b| kinds.get(b.as_str())) else {
            continue;
        };
        validate_keys(&subject, catalog, kind.catalog_schema())?;
    }
    debug!(
        backends = doc.backends.len(),
        catalogs = doc.catalogs.len(),
        "catalog document validated"
    );
    Ok(())
}

fn backend_kind(subject: &str, backend: &Fields) -> ValidationResult<BackendKind> {
    let connector = backend
        .get("connector")
        .ok_or_else(|| ValidationError::MissingField {
            subject: subject.to_string(),
            field: "connector".to_string(),
        })?;
    BackendKind::from_connector(connector).ok_or_else(|| ValidationError::UnsupportedConnector {
        subject: subject.to_string(),
        connector: connector.clone(),
    })
}

// ── Local configuration ────────────────────────────────────────────

/// Validate the local configuration and produce its typed view.
pub fn check_config(config: &CharmConfig) -> ValidationResult<Settings> {
    let log_level: LogLevel = config
        .log_level
        .parse()
        .map_err(|_| ValidationError::InvalidLogLevel(config.log_level.clone()))?;

    let role: NodeRole = config
        .charm_function
        .parse()
        .map_err(|_| ValidationError::InvalidRole(config.charm_function.clone()))?;

    let acl_mode: AclMode = config
        .acl_mode_default
        .parse()
        .map_err(|_| ValidationError::InvalidAclMode(config.acl_mode_default.clone()))?;

    let web_proxy = match config.web_proxy.as_deref() {
        None | Some("") => None,
        Some(proxy) if proxy.trim().is_empty() => return Err(ValidationError::BlankWebProxy),
        Some(proxy) => Some(proxy.trim().to_string()),
    };

    if config.google_client_id.is_some() != config.google_client_secret.is_some() {
        return Err(ValidationError::IncompleteOauth);
    }

    let catalogs = match config.catalog_config.as_deref() {
        Some(text) => {
            let doc = CatalogDocument::parse(text)?;
            validate_catalog_document(&doc)?;
            Some(doc)
        }
        None => None,
    };

    Ok(Settings {
        role,
        log_level,
        acl_mode,
        web_proxy,
        catalogs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use trino_core::CatalogFormatError;

    fn fields(pairs: &[(&str, &str)]) -> Fields {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    const PG_DOC: &str = r#"
backends:
  dwh:
    connector: postgresql
    url: jdbc:postgresql://db.example.com:5432
    params: sslmode=require
catalogs:
  sales:
    backend: dwh
    database: sales
    secret-id: secret:pg
"#;

    #[test]
    fn default_config_is_valid() {
        let settings = check_config(&CharmConfig::default()).unwrap();
        assert_eq!(settings.role, NodeRole::All);
        assert_eq!(settings.log_level, LogLevel::Info);
        assert_eq!(settings.acl_mode, AclMode::All);
        assert!(settings.catalogs.is_none());
    }

    #[test]
    fn rejects_unknown_log_level() {
        let config = CharmConfig {
            log_level: "verbose".to_string(),
            ..Default::default()
        };
        assert_eq!(
            check_config(&config).unwrap_err(),
            ValidationError::InvalidLogLevel("verbose".to_string())
        );
    }

    #[test]
    fn rejects_blank_web_proxy() {
        let config = CharmConfig {
            web_proxy: Some("   ".to_string()),
            ..Default::default()
        };
        assert_eq!(check_config(&config).unwrap_err(), ValidationError::BlankWebProxy);
    }

    #[test]
    fn acl_mode_is_exact() {
        let config = CharmConfig {
            acl_mode_default: "All".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            check_config(&config).unwrap_err(),
            ValidationError::InvalidAclMode(_)
        ));
    }

    #[test]
    fn oauth_needs_both_halves() {
        let config = CharmConfig {
            google_client_id: Some("id".to_string()),
            ..Default::default()
        };
        assert_eq!(check_config(&config).unwrap_err(), ValidationError::IncompleteOauth);
    }

    #[test]
    fn malformed_catalog_document_is_a_format_error() {
        let config = CharmConfig {
            catalog_config: Some("backends: [".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            check_config(&config).unwrap_err(),
            ValidationError::CatalogFormat(CatalogFormatError::Yaml(_))
        ));
    }

    #[test]
    fn valid_catalog_document_is_parsed() {
        let config = CharmConfig {
            catalog_config: Some(PG_DOC.to_string()),
            ..Default::default()
        };
        let settings = check_config(&config).unwrap();
        assert_eq!(settings.catalogs.unwrap().catalogs.len(), 1);
    }

    #[test]
    fn backend_with_unknown_field_is_rejected() {
        let text = PG_DOC.replace("params: sslmode=require", "port: \"5432\"");
        let doc = CatalogDocument::parse(&text).unwrap();
        assert_eq!(
            validate_catalog_document(&doc).unwrap_err(),
            ValidationError::UnexpectedField {
                subject: "backend \"dwh\"".to_string(),
                field: "port".to_string(),
            }
        );
    }

    #[test]
    fn catalog_missing_secret_is_rejected() {
        let text = PG_DOC.replace("    secret-id: secret:pg\n", "");
        let doc = CatalogDocument::parse(&text).unwrap();
        assert!(matches!(
            validate_catalog_document(&doc).unwrap_err(),
            ValidationError::MissingField { field, .. } if field == "secret-id"
        ));
    }

    #[test]
    fn catalog_name_must_be_a_plain_file_stem() {
        for name in ["../../conf/evil", "sales/x", "sales.prod", "sales name"] {
            let text = PG_DOC.replace("  sales:\n", &format!("  {name:?}:\n"));
            let doc = CatalogDocument::parse(&text).unwrap();
            assert!(
                matches!(
                    validate_catalog_document(&doc).unwrap_err(),
                    ValidationError::InvalidName { what: "catalog name", value, .. } if value == name
                ),
                "{name} accepted"
            );
        }
        assert!(is_valid_name("sales_rw-2"));
        assert!(!is_valid_name(""));
    }

    #[test]
    fn postgresql_backend_url_must_be_jdbc() {
        let text = PG_DOC.replace("jdbc:postgresql://", "postgres://");
        let doc = CatalogDocument::parse(&text).unwrap();
        assert!(matches!(
            validate_catalog_document(&doc).unwrap_err(),
            ValidationError::InvalidJdbcUrl { .. }
        ));
    }

    #[test]
    fn unsupported_backend_connector() {
        let text = PG_DOC.replace("connector: postgresql", "connector: oracle");
        let doc = CatalogDocument::parse(&text).unwrap();
        assert!(matches!(
            validate_catalog_document(&doc).unwrap_err(),
            ValidationError::UnsupportedConnector { connector, .. } if connector == "oracle"
        ));
    }

    #[test]
    fn jdbc_url_shapes() {
        for url in [
            "jdbc:postgresql://host:5432/db",
            "jdbc:postgresql://host",
            "jdbc:postgresql://10.0.0.1:5432/db?ssl=true",
        ] {
            assert!(validate_jdbc_url("t", "postgresql", url).is_ok(), "{url}");
        }
        for url in [
            "jdbc:mysql://host:3306",
            "jdbc:postgresql:/host",
            "jdbc:postgresql://host:port",
            "jdbc:postgresql://host db",
            "",
        ] {
            assert!(validate_jdbc_url("t", "postgresql", url).is_err(), "{url}");
        }
    }

    #[test]
    fn membership_accepts_optional_fields() {
        let props = fields(&[
            ("connector.name", "mysql"),
            ("connection-url", "jdbc:mysql://host:3306"),
            ("connection-user", "u"),
            ("connection-password", "p"),
            ("write.batch-size", "1000"),
        ]);
        validate_membership("conn", &props).unwrap();
    }

    #[test]
    fn membership_rejects_missing_and_extra_fields() {
        let missing = fields(&[("connector.name", "hive")]);
        assert!(matches!(
            validate_membership("conn", &missing).unwrap_err(),
            ValidationError::MissingField { field, .. } if field == "hive.metastore.uri"
        ));

        let extra = fields(&[
            ("connector.name", "hive"),
            ("hive.metastore.uri", "thrift://meta:9083"),
            ("hive.bogus", "x"),
        ]);
        assert!(matches!(
            validate_membership("conn", &extra).unwrap_err(),
            ValidationError::UnexpectedField { field, .. } if field == "hive.bogus"
        ));
    }

    #[test]
    fn membership_checks_postgresql_url_only() {
        let pg = fields(&[
            ("connector.name", "postgresql"),
            ("connection-url", "postgresql://host"),
            ("connection-user", "u"),
            ("connection-password", "p"),
        ]);
        assert!(matches!(
            validate_membership("conn", &pg).unwrap_err(),
            ValidationError::InvalidJdbcUrl { .. }
        ));

        let mut oracle = pg.clone();
        oracle.insert("connector.name".to_string(), "oracle".to_string());
        validate_membership("conn", &oracle).unwrap();
    }

    #[test]
    fn membership_rejects_unknown_connector() {
        let props = fields(&[("connector.name", "kafka")]);
        assert!(matches!(
            validate_membership("conn", &props).unwrap_err(),
            ValidationError::UnsupportedConnector { .. }
        ));
    }

    #[test]
    fn connector_table_entries_require_connector_name() {
        for (name, schema) in CONNECTOR_FIELDS {
            assert!(schema.required.contains(&"connector.name"), "{name}");
        }
    }
}
