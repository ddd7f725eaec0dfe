//! Literals shared by the Trino operator crates.

pub const APP_NAME: &str = "trino-k8s";
pub const WORKLOAD_CONTAINER: &str = "trino";
pub const WORKLOAD_SERVICE: &str = "trino";
pub const CHARM_CONTAINER: &str = "charm";

pub const HTTP_PORT: u16 = 8080;
pub const HTTPS_PORT: u16 = 8443;
pub const JMX_PORT: u16 = 9081;
pub const METRICS_PORT: u16 = 9090;

// ── Filesystem layout inside the workload container ───────────────

pub const TRINO_HOME: &str = "/usr/lib/trino/etc";
pub const CATALOG_DIR: &str = "catalog";
pub const CERTS_DIR: &str = "certs";
pub const CONF_DIR: &str = "conf";
pub const CONFIG_FILE: &str = "config.properties";
pub const LOG_FILE: &str = "log.properties";
pub const JVM_FILE: &str = "jvm.config";
pub const RULES_FILE: &str = "rules.json";
pub const PASSWORD_DB_FILE: &str = "password.db";
pub const AUTHENTICATOR_FILE: &str = "password-authenticator.properties";
pub const TRUSTSTORE_FILE: &str = "truststore.jks";
pub const KEYSTORE_FILE: &str = "keystore.p12";
pub const ACCESS_CONTROL_FILE: &str = "access-control.properties";
pub const RESOURCE_GROUPS_FILE: &str = "resource-groups.properties";
pub const RESOURCE_GROUPS_CONFIG_FILE: &str = "resource-groups.json";
pub const SERVER_KEY_FILE: &str = "server.key";
pub const SERVER_CERT_FILE: &str = "server.crt";
pub const CA_FILE: &str = "ca.pem";
pub const RANGER_PLUGIN_DIR: &str = "/usr/lib/ranger";
pub const RANGER_PROPERTIES_FILE: &str = "install.properties";
pub const RANGER_POLICY_DIR: &str = "/etc/ranger";
pub const JAVA_HOME: &str = "/opt/java/openjdk";
pub const OPENSEARCH_CERT_PATH: &str = "/opensearch.crt";
pub const OPENSEARCH_CERT_ALIAS: &str = "opensearch-ca";
/// Password of the JVM's default `cacerts` store.
pub const JAVA_CACERTS_PASSWORD: &str = "changeit";
pub const ENTRYPOINT: &str = "./entrypoint.sh";

// ── Relation endpoints ────────────────────────────────────────────

pub const PEER_RELATION: &str = "peer";
pub const COORDINATOR_RELATION: &str = "trino-coordinator";
pub const WORKER_RELATION: &str = "trino-worker";
pub const POLICY_RELATION: &str = "policy";
pub const OPENSEARCH_RELATION: &str = "opensearch";
pub const CERTIFICATES_RELATION: &str = "certificates";
pub const CATALOG_RELATION: &str = "trino-catalog";

// ── Relation record fields ────────────────────────────────────────

pub const DISCOVERY_URI_KEY: &str = "discovery-uri";
pub const CATALOG_SECRET_ID_KEY: &str = "catalog-secret-id";
pub const USER_SECRET_ID_KEY: &str = "user-secret-id";
pub const POLICY_MANAGER_URL_KEY: &str = "policy_manager_url";
pub const OPENSEARCH_TLS_SECRET_KEY: &str = "secret-tls";
pub const OPENSEARCH_INDEX_KEY: &str = "index";
pub const OPENSEARCH_USER_SECRET_KEY: &str = "secret-user";
pub const OPENSEARCH_ENDPOINTS_KEY: &str = "endpoints";
pub const CSR_KEY: &str = "certificate_signing_request";
pub const TRINO_URL_KEY: &str = "trino_url";
pub const TRINO_CATALOGS_KEY: &str = "trino_catalogs";
pub const TRINO_CREDENTIALS_KEY: &str = "trino_credentials_secret_id";

/// Label of the rotating secret carrying the catalog document to workers.
pub const CATALOG_SECRET_LABEL: &str = "catalog-config";
/// Key inside the catalog secret content.
pub const CATALOG_SECRET_FIELD: &str = "catalogs";

pub const OPENSEARCH_INDEX_NAME: &str = "ranger_audits";

/// Connectors shipped with the engine; never removed during connector diffs.
pub const SYSTEM_CONNECTORS: &[&str] = &["jmx", "memory", "tpcds", "tpch"];

/// Placeholders substituted in backend-supplied catalog text.
pub const SSL_PATH_PLACEHOLDER: &str = "{SSL_PATH}";
pub const SSL_PWD_PLACEHOLDER: &str = "{SSL_PWD}";

pub const DEFAULT_JVM_OPTIONS: &[&str] = &[
    "-server",
    "-Xmx2G",
    "-XX:InitialRAMPercentage=80",
    "-XX:MaxRAMPercentage=80",
    "-XX:G1HeapRegionSize=32M",
    "-XX:+ExplicitGCInvokesConcurrent",
    "-XX:+ExitOnOutOfMemoryError",
    "-XX:+HeapDumpOnOutOfMemoryError",
    "-XX:-OmitStackTraceInFastThrow",
    "-XX:ReservedCodeCacheSize=512M",
    "-XX:PerMethodRecompilationCutoff=10000",
    "-XX:PerBytecodeRecompilationCutoff=10000",
    "-Djdk.attach.allowAttachSelf=true",
    "-Djdk.nio.maxCachedBufferSize=2000000",
    "-Dfile.encoding=UTF-8",
];

/// Build the absolute path of a file under the Trino home directory.
pub fn trino_path(parts: &[&str]) -> String {
    let mut path = String::from(TRINO_HOME);
    for part in parts {
        path.push('/');
        path.push_str(part);
    }
    path
}
