//! trino-charm: the Trino operator binary.
//!
//! Each invocation handles one hook or action for one unit. The host
//! runtime passes relation data on the command line; everything else is
//! read from the state store and the workload root.
//!
//! # Usage
//!
//! ```text
//! trino-charm --config charm.toml --leader hook config-changed
//! trino-charm hook relation-changed --endpoint trino-worker --id 4 --data discovery_uri=http://coord:8080
//! trino-charm add-connector --name pg --config-file pg.properties
//! trino-charm run --interval 300
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;

use trino_catalog::{ConnectorRequest, check_config};
use trino_charm::{Action, Event, HandlerReport, LocalWorkload, TrinoCharm};
use trino_core::CharmConfig;
use trino_core::literals::APP_NAME;
use trino_resources::FileStatefulSetApi;
use trino_state::{RelationRecord, StateStore};

#[derive(Parser)]
#[command(name = "trino-charm", about = "Trino cluster operator")]
struct Cli {
    /// Directory holding the state store and statefulset manifests.
    #[arg(long, global = true, default_value = "/var/lib/trino-charm")]
    state_dir: PathBuf,

    /// Application name of this unit.
    #[arg(long, global = true, default_value = APP_NAME)]
    app: String,

    /// Whether this unit holds leadership.
    #[arg(long, global = true)]
    leader: bool,

    /// Operator configuration (TOML). Defaults apply when absent.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Root of the workload container filesystem.
    #[arg(long, global = true, default_value = "/srv/trino")]
    workload_root: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Handle one hook.
    Hook {
        event: Hook,

        /// Relation endpoint for relation hooks.
        #[arg(long)]
        endpoint: Option<String>,

        /// Relation id for relation hooks.
        #[arg(long, default_value = "0")]
        id: u32,

        /// Application on the other side of the relation.
        #[arg(long, default_value = "")]
        remote_app: String,

        /// Remote relation data, `key=value`; an empty value deletes the key.
        #[arg(long = "data", value_name = "KEY=VALUE")]
        data: Vec<String>,

        /// Label of the changed secret.
        #[arg(long)]
        label: Option<String>,

        /// Id of the changed secret.
        #[arg(long)]
        secret_id: Option<String>,

        /// Signed certificate file (PEM or base64).
        #[arg(long)]
        certificate: Option<PathBuf>,

        /// CA certificate file (PEM or base64).
        #[arg(long)]
        ca: Option<PathBuf>,
    },

    /// Handle update-status on an interval until interrupted.
    Run {
        /// Seconds between status checks.
        #[arg(long, default_value = "300")]
        interval: u64,
    },

    /// Validate the configuration without touching the workload.
    Validate,

    /// Add a catalog connector.
    AddConnector {
        #[arg(long)]
        name: String,
        /// Connector property file.
        #[arg(long)]
        config_file: PathBuf,
        /// PEM certificate the connector should trust.
        #[arg(long)]
        cert: Option<PathBuf>,
    },

    /// Remove a catalog connector added before.
    RemoveConnector {
        #[arg(long)]
        name: String,
        /// The property file the connector was added with.
        #[arg(long)]
        config_file: PathBuf,
        #[arg(long)]
        cert: Option<PathBuf>,
    },

    /// Restart the Trino service.
    Restart,
}

#[derive(Clone, Copy, ValueEnum)]
enum Hook {
    Install,
    WorkloadReady,
    ConfigChanged,
    UpdateStatus,
    PeerRelationChanged,
    RelationCreated,
    RelationChanged,
    RelationBroken,
    SecretChanged,
    CertificateAvailable,
}

type Charm = TrinoCharm<LocalWorkload, FileStatefulSetApi>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,trino_charm=debug".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => CharmConfig::from_file(path)?,
        None => CharmConfig::default(),
    };

    if let Command::Validate = cli.command {
        let settings = check_config(&config)?;
        println!("configuration valid: role {}", settings.role);
        return Ok(());
    }

    let mut charm = open_charm(&cli, config)?;
    match cli.command {
        Command::Hook {
            event,
            endpoint,
            id,
            remote_app,
            data,
            label,
            secret_id,
            certificate,
            ca,
        } => {
            let event = match event {
                Hook::Install => Event::Install,
                Hook::WorkloadReady => Event::WorkloadReady,
                Hook::ConfigChanged => Event::ConfigChanged,
                Hook::UpdateStatus => Event::UpdateStatus,
                Hook::PeerRelationChanged => Event::PeerRelationChanged,
                Hook::RelationCreated | Hook::RelationChanged | Hook::RelationBroken => {
                    let endpoint = endpoint.context("relation hooks need --endpoint")?;
                    relation_event(charm.store(), event, endpoint, id, remote_app, &data)?
                }
                Hook::SecretChanged => Event::SecretChanged {
                    label,
                    id: secret_id.context("secret-changed needs --secret-id")?,
                },
                Hook::CertificateAvailable => Event::CertificateAvailable {
                    certificate: read(certificate.as_deref(), "--certificate")?,
                    ca: read(ca.as_deref(), "--ca")?,
                },
            };
            report(charm.handle(&event))
        }
        Command::Run { interval } => run(&mut charm, Duration::from_secs(interval)).await,
        Command::AddConnector {
            name,
            config_file,
            cert,
        } => {
            let request = connector_request(name, &config_file, cert.as_deref())?;
            report(charm.handle(&Event::Action(Action::AddConnector(request))))
        }
        Command::RemoveConnector {
            name,
            config_file,
            cert,
        } => {
            let request = connector_request(name, &config_file, cert.as_deref())?;
            report(charm.handle(&Event::Action(Action::RemoveConnector(request))))
        }
        Command::Restart => report(charm.handle(&Event::Action(Action::Restart))),
        Command::Validate => Ok(()),
    }
}

fn open_charm(cli: &Cli, config: CharmConfig) -> anyhow::Result<Charm> {
    std::fs::create_dir_all(&cli.state_dir)?;
    let db_path = cli.state_dir.join("trino-charm.redb");
    let store = StateStore::open(&db_path)?;
    info!(path = ?db_path, "state store opened");

    let statefulsets_dir = cli.state_dir.join("statefulsets");
    std::fs::create_dir_all(&statefulsets_dir)?;
    let statefulsets = FileStatefulSetApi::new(&statefulsets_dir);

    std::fs::create_dir_all(&cli.workload_root)?;
    let workload = LocalWorkload::new(&cli.workload_root)?;

    Ok(TrinoCharm::new(
        config,
        store,
        workload,
        statefulsets,
        cli.app.clone(),
        cli.leader,
    ))
}

/// Record what the runtime delivered with a relation hook, then build
/// the event. The record exists before `relation-created` is handled and
/// is gone before `relation-broken` is.
fn relation_event(
    store: &StateStore,
    hook: Hook,
    endpoint: String,
    id: u32,
    remote_app: String,
    data: &[String],
) -> anyhow::Result<Event> {
    if let Hook::RelationBroken = hook {
        store.delete_relation(&endpoint, id)?;
        return Ok(Event::RelationBroken {
            endpoint,
            id,
            remote_app,
        });
    }

    if store.get_relation(&endpoint, id)?.is_none() {
        store.put_relation(&RelationRecord::new(&endpoint, id, &remote_app))?;
    }
    let updates = parse_data(data)?;
    let updates: Vec<(&str, Option<String>)> = updates
        .iter()
        .map(|(k, v)| (k.as_str(), v.clone()))
        .collect();
    store.set_remote_data(&endpoint, id, &updates)?;

    Ok(match hook {
        Hook::RelationCreated => Event::RelationCreated { endpoint, id },
        _ => Event::RelationChanged { endpoint, id },
    })
}

fn parse_data(data: &[String]) -> anyhow::Result<Vec<(String, Option<String>)>> {
    data.iter()
        .map(|pair| {
            let (key, value) = pair
                .split_once('=')
                .with_context(|| format!("expected KEY=VALUE, got {pair:?}"))?;
            let value = (!value.is_empty()).then(|| value.to_string());
            Ok((key.to_string(), value))
        })
        .collect()
}

fn read(path: Option<&Path>, flag: &str) -> anyhow::Result<String> {
    let path = path.with_context(|| format!("missing {flag}"))?;
    std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
}

fn connector_request(name: String, config_file: &Path, cert: Option<&Path>) -> anyhow::Result<ConnectorRequest> {
    let config = read(Some(config_file), "--config-file")?;
    let cert = match cert {
        Some(path) => Some(read(Some(path), "--cert")?),
        None => None,
    };
    Ok(ConnectorRequest { name, config, cert })
}

fn report(report: HandlerReport) -> anyhow::Result<()> {
    println!("status: {}", report.status);
    if report.is_deferred() {
        println!("deferred");
    }
    match report.action {
        Some(Ok(message)) => println!("{message}"),
        Some(Err(message)) => bail!(message),
        None => {}
    }
    Ok(())
}

async fn run(charm: &mut Charm, interval: Duration) -> anyhow::Result<()> {
    info!(interval = ?interval, "status loop starting");
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let report = charm.handle(&Event::UpdateStatus);
                info!(status = %report.status, deferred = report.is_deferred(), "status checked");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown signal received");
                return Ok(());
            }
        }
    }
}
