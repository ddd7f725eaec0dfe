//! Event dispatch and the reconcile pass.
//!
//! Every event ends in [`TrinoCharm::reconcile`], which recomputes the
//! desired configuration from scratch and syncs it to the workload.
//! Handlers before it only record what the event delivered: relation
//! data, secrets and certificates land in node state, and the pass picks
//! them up from there.

use tracing::{debug, info, info_span, warn};

use trino_catalog::{RenderedCatalogs, check_config};
use trino_core::literals::{
    APP_NAME, CATALOG_RELATION, CERTIFICATES_RELATION, COORDINATOR_RELATION, OPENSEARCH_RELATION,
    POLICY_RELATION, WORKER_RELATION,
};
use trino_core::{CatalogDocument, CharmConfig, NodeRole, Settings};
use trino_resources::{PatchOutcome, StatefulSetApi, patch_statefulset};
use trino_state::{LeaderGate, NodeState, StateStore};
use trino_topology::{
    PublishOutcome, RelationPresence, SyncOutcome, TopologyState, adopt_from_relation,
    adopt_secret_change, coordinator_relation_broken, evaluate, publish, worker_relation_broken,
};

use crate::actions;
use crate::catalog_provider;
use crate::error::CharmResult;
use crate::event::{Action, Event, HandlerOutcome, HandlerReport};
use crate::merge::{compute_desired_config, default_discovery_uri};
use crate::opensearch;
use crate::policy;
use crate::resources::resource_updates;
use crate::status::UnitStatus;
use crate::sync::{SyncReport, rebuild_catalogs, sync_workload};
use crate::tls::{self, generate_password};
use crate::workload::Workload;

const WAITING_WORKLOAD: &str = "waiting for the Trino container";
const WAITING_PEERS: &str = "Waiting for peer relation to be created";

/// One unit of the operator.
pub struct TrinoCharm<W, A> {
    config: CharmConfig,
    store: StateStore,
    workload: W,
    statefulsets: A,
    app: String,
    is_leader: bool,
    status: UnitStatus,
    last_sync: Option<SyncReport>,
}

impl<W, A> TrinoCharm<W, A>
where
    W: Workload,
    A: StatefulSetApi,
{
    pub fn new(
        config: CharmConfig,
        store: StateStore,
        workload: W,
        statefulsets: A,
        app: impl Into<String>,
        is_leader: bool,
    ) -> Self {
        Self {
            config,
            store,
            workload,
            statefulsets,
            app: app.into(),
            is_leader,
            status: UnitStatus::Maintenance(String::new()),
            last_sync: None,
        }
    }

    pub fn config(&self) -> &CharmConfig {
        &self.config
    }

    /// Replace the configuration; applied by the next `ConfigChanged`.
    pub fn set_config(&mut self, config: CharmConfig) {
        self.config = config;
    }

    pub fn set_leader(&mut self, is_leader: bool) {
        self.is_leader = is_leader;
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn workload(&self) -> &W {
        &self.workload
    }

    pub fn statefulsets(&self) -> &A {
        &self.statefulsets
    }

    pub fn status(&self) -> &UnitStatus {
        &self.status
    }

    /// Report of the last sync pass that reached the workload.
    pub fn last_sync(&self) -> Option<&SyncReport> {
        self.last_sync.as_ref()
    }

    /// Handle one event to completion.
    ///
    /// Failures never escape: they become the unit status. A failed
    /// action reports its message and leaves the status alone.
    pub fn handle(&mut self, event: &Event) -> HandlerReport {
        let span = info_span!("event", name = event.name(), app = %self.app, leader = self.is_leader);
        let _enter = span.enter();

        if let Event::Action(action) = event {
            let result = self.run_action(action).map_err(|e| {
                warn!(error = %e, "action failed");
                e.to_string()
            });
            return HandlerReport {
                outcome: HandlerOutcome::Done,
                status: self.status.clone(),
                action: Some(result),
            };
        }

        let outcome = match self.dispatch(event) {
            Ok(outcome) => outcome,
            Err(e) => {
                self.status = e.status();
                warn!(error = %e, status = %self.status, "event handling failed");
                HandlerOutcome::Done
            }
        };
        if let HandlerOutcome::Deferred(reason) = &outcome {
            info!(%reason, "event deferred");
        }
        HandlerReport {
            outcome,
            status: self.status.clone(),
            action: None,
        }
    }

    fn dispatch(&mut self, event: &Event) -> CharmResult<HandlerOutcome> {
        match event {
            Event::Install => {
                self.status = UnitStatus::Maintenance("installing".to_string());
                self.patch_resources()?;
                Ok(HandlerOutcome::Done)
            }
            Event::WorkloadReady => self.reconcile(),
            Event::ConfigChanged | Event::UpdateStatus => {
                let reconciled = self.reconcile();
                let patched = self.patch_resources();
                let outcome = reconciled?;
                patched?;
                Ok(outcome)
            }
            Event::PeerRelationChanged => {
                if self.workload.can_connect() {
                    self.converge_connectors()?;
                }
                self.reconcile()
            }
            Event::RelationCreated { endpoint, id } => self.relation_created(endpoint, *id),
            Event::RelationChanged { endpoint, id } => self.relation_changed(endpoint, *id),
            Event::RelationBroken {
                endpoint,
                id,
                remote_app,
            } => self.relation_broken(endpoint, *id, remote_app),
            Event::SecretChanged { label, id } => {
                let outcome =
                    adopt_secret_change(&self.store, &self.app, self.is_leader, label.as_deref(), id)?;
                if let SyncOutcome::Deferred(reason) = outcome {
                    return Ok(HandlerOutcome::Deferred(reason.to_string()));
                }
                self.reconcile()
            }
            Event::CertificateAvailable { certificate, ca } => {
                tls::store_certificate(&self.store, &self.app, self.is_leader, certificate, ca)?;
                self.reconcile()
            }
            Event::Action(_) => Ok(HandlerOutcome::Done),
        }
    }

    // ── Relations ─────────────────────────────────────────────────────

    fn relation_created(&mut self, endpoint: &str, id: u32) -> CharmResult<HandlerOutcome> {
        match endpoint {
            POLICY_RELATION => {
                policy::publish_service(&self.store, &self.config, self.is_leader, id)?;
            }
            OPENSEARCH_RELATION => {
                opensearch::request_index(&self.store, self.is_leader, id)?;
            }
            CERTIFICATES_RELATION => {
                tls::request_certificate(
                    &self.store,
                    &self.app,
                    self.is_leader,
                    id,
                    &self.hostnames(),
                )?;
            }
            CATALOG_RELATION => self.publish_catalogs(Some(id))?,
            _ => {}
        }
        self.reconcile()
    }

    fn relation_changed(&mut self, endpoint: &str, id: u32) -> CharmResult<HandlerOutcome> {
        match endpoint {
            WORKER_RELATION => {
                let outcome = adopt_from_relation(&self.store, &self.app, self.is_leader, id)?;
                if let SyncOutcome::Deferred(reason) = outcome {
                    return Ok(HandlerOutcome::Deferred(reason.to_string()));
                }
            }
            POLICY_RELATION => {
                if policy::enable(&self.store, &self.config, &self.app, self.is_leader, id)?.is_none() {
                    debug!(relation = id, "policy manager URL not published yet");
                }
            }
            OPENSEARCH_RELATION => {
                let settings = check_config(&self.config)?;
                let node = self.store.node_state(&self.app)?;
                let gate = opensearch::enable(
                    &self.store,
                    &node,
                    settings.role,
                    &self.app,
                    self.is_leader,
                    id,
                )?;
                if gate.is_none() {
                    debug!(relation = id, "audit index credentials not published yet");
                }
            }
            CATALOG_RELATION => self.publish_catalogs(Some(id))?,
            _ => {}
        }
        self.reconcile()
    }

    fn relation_broken(&mut self, endpoint: &str, id: u32, remote_app: &str) -> CharmResult<HandlerOutcome> {
        match endpoint {
            WORKER_RELATION => {
                worker_relation_broken(&self.store, &self.app, self.is_leader)?;
                if self.workload.can_connect() {
                    self.clear_catalogs()?;
                }
            }
            COORDINATOR_RELATION => {
                coordinator_relation_broken(&self.store, &self.app, self.is_leader, remote_app)?;
            }
            POLICY_RELATION => {
                policy::disable(&self.store, &self.app, self.is_leader)?;
            }
            OPENSEARCH_RELATION => {
                let settings = check_config(&self.config)?;
                let node = self.store.node_state(&self.app)?;
                opensearch::disable(&self.store, &node, settings.role, &self.app, self.is_leader)?;
            }
            CERTIFICATES_RELATION => {
                tls::clear_certificate(&self.store, &self.app, self.is_leader)?;
            }
            _ => debug!(relation = id, %endpoint, "relation gone"),
        }
        self.reconcile()
    }

    /// Catalog files rendered from a departed coordinator's document go;
    /// recorded connectors stay.
    fn clear_catalogs(&self) -> CharmResult<()> {
        let node = self.store.node_state(&self.app)?;
        rebuild_catalogs(
            &self.workload,
            &RenderedCatalogs::default(),
            &node.connectors,
            node.truststore_password.as_deref(),
        )?;
        self.workload.restart()?;
        info!("coordinator catalogs removed");
        Ok(())
    }

    // ── Reconcile ─────────────────────────────────────────────────────

    /// Recompute the desired configuration and apply it.
    pub fn reconcile(&mut self) -> CharmResult<HandlerOutcome> {
        if !self.workload.can_connect() {
            self.status = UnitStatus::Waiting(WAITING_WORKLOAD.to_string());
            return Ok(HandlerOutcome::Deferred(WAITING_WORKLOAD.to_string()));
        }
        if !self.store.is_ready()? {
            self.status = UnitStatus::Waiting(WAITING_PEERS.to_string());
            return Ok(HandlerOutcome::Deferred(WAITING_PEERS.to_string()));
        }

        let settings = check_config(&self.config)?;
        let presence = RelationPresence::observe(&self.store)?;
        match evaluate(settings.role, true, presence) {
            TopologyState::Synced => {}
            TopologyState::AwaitingPeer(e) | TopologyState::Blocked(e) => return Err(e.into()),
            TopologyState::Uninitialized => {
                self.status = UnitStatus::Waiting(WAITING_PEERS.to_string());
                return Ok(HandlerOutcome::Deferred(WAITING_PEERS.to_string()));
            }
        }

        self.record_cluster_state(&settings)?;
        if settings.role == NodeRole::Coordinator {
            self.publish_to_workers()?;
        }

        let node = self.store.node_state(&self.app)?;
        let desired = compute_desired_config(&self.config, &settings, &node, &self.store, &self.app)?;
        let report = sync_workload(&self.workload, &desired)?;
        self.last_sync = Some(report);

        self.publish_catalogs(None)?;
        self.status = UnitStatus::active();
        Ok(HandlerOutcome::Done)
    }

    /// Leader writes the cluster-wide fields an authoritative node owns.
    fn record_cluster_state(&self, settings: &Settings) -> CharmResult<()> {
        let role = settings.role;
        let discovery_uri = self
            .config
            .discovery_uri
            .clone()
            .unwrap_or_else(default_discovery_uri);
        let config = &self.config;
        let gate = self.store.update_node_state(&self.app, self.is_leader, |state: &mut NodeState| {
            if role.is_authoritative() {
                state.discovery_uri = Some(discovery_uri);
                state.catalog_config = config.catalog_config.clone();
                state.user_secret_id = config.user_secret_id.clone();
            }
            if role == NodeRole::All {
                state.internal_secret.get_or_insert_with(generate_password);
            }
        })?;
        if gate == LeaderGate::Skipped {
            debug!("not leader, cluster state left to the leader");
        }
        Ok(())
    }

    fn publish_to_workers(&self) -> CharmResult<()> {
        let discovery_uri = self
            .config
            .discovery_uri
            .clone()
            .unwrap_or_else(default_discovery_uri);
        let outcome = publish(
            &self.store,
            &self.app,
            self.is_leader,
            &discovery_uri,
            self.config.catalog_config.as_deref(),
            self.config.user_secret_id.as_deref(),
        )?;
        if let PublishOutcome::Published { changed: true, .. } = outcome {
            info!("worker data republished");
        }
        Ok(())
    }

    fn publish_catalogs(&self, relation_id: Option<u32>) -> CharmResult<()> {
        let settings = check_config(&self.config)?;
        if settings.role == NodeRole::Worker {
            return Ok(());
        }
        catalog_provider::publish(
            &self.store,
            &self.config,
            settings.catalogs.as_ref(),
            self.is_leader,
            relation_id,
        )?;
        Ok(())
    }

    fn hostnames(&self) -> Vec<String> {
        let mut names = vec![APP_NAME.to_string()];
        let external = self.config.external_hostname();
        if external != APP_NAME {
            names.push(external.to_string());
        }
        names
    }

    // ── Resources ─────────────────────────────────────────────────────

    /// Patch container resources; the leader owns the statefulset.
    fn patch_resources(&self) -> CharmResult<()> {
        if !self.is_leader {
            return Ok(());
        }
        let outcome = patch_statefulset(&self.statefulsets, &self.app, &resource_updates(&self.config))?;
        if let PatchOutcome::Patched { containers } = outcome {
            info!(?containers, "container resources patched");
        }
        Ok(())
    }

    // ── Connectors ────────────────────────────────────────────────────

    /// Catalog names configured for this node, which connector
    /// convergence must leave alone.
    fn configured_catalogs(&self) -> CharmResult<Vec<String>> {
        let settings = check_config(&self.config)?;
        let doc = if settings.role.is_authoritative() {
            settings.catalogs
        } else {
            match self.store.node_state(&self.app)?.catalog_config {
                Some(text) => CatalogDocument::parse(&text).ok(),
                None => None,
            }
        };
        Ok(doc.map(|d| d.catalogs.into_keys().collect()).unwrap_or_default())
    }

    fn converge_connectors(&self) -> CharmResult<()> {
        let recorded = self.store.node_state(&self.app)?.connectors;
        let keep = self.configured_catalogs()?;
        let keep: Vec<&str> = keep.iter().map(String::as_str).collect();
        actions::converge_connectors(&self.workload, &recorded, &keep)?;
        Ok(())
    }

    fn run_action(&mut self, action: &Action) -> CharmResult<String> {
        match action {
            Action::AddConnector(request) => {
                actions::add_connector(&self.workload, &self.store, &self.app, self.is_leader, request)
                    .map(|r| r.message)
            }
            Action::RemoveConnector(request) => {
                actions::remove_connector(&self.workload, &self.store, &self.app, self.is_leader, request)
                    .map(|r| r.message)
            }
            Action::Restart => actions::restart(&self.workload),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trino_core::literals::PEER_RELATION;
    use trino_resources::{Container, MemoryStatefulSetApi, ResourceRequirements, StatefulSet};
    use trino_state::RelationRecord;

    use crate::workload::LocalWorkload;

    type Charm = TrinoCharm<LocalWorkload, MemoryStatefulSetApi>;

    fn charm(dir: &tempfile::TempDir, config: CharmConfig) -> Charm {
        let workload = LocalWorkload::new(dir.path()).unwrap();
        let api = MemoryStatefulSetApi::new();
        api.insert(StatefulSet {
            name: "trino".into(),
            containers: vec![Container {
                name: "charm".into(),
                resources: ResourceRequirements::default(),
            }],
        });
        let store = StateStore::open_in_memory().unwrap();
        TrinoCharm::new(config, store, workload, api, "trino", true)
    }

    fn join_peers(charm: &Charm) {
        charm
            .store()
            .put_relation(&RelationRecord::new(PEER_RELATION, 0, "trino"))
            .unwrap();
    }

    #[test]
    fn test_defers_until_ready() {
        let dir = tempfile::tempdir().unwrap();
        let mut charm = charm(&dir, CharmConfig::default());
        charm.workload().set_connected(false);
        let report = charm.handle(&Event::ConfigChanged);
        assert!(report.is_deferred());
        assert_eq!(report.status, UnitStatus::Waiting(WAITING_WORKLOAD.into()));

        charm.workload().set_connected(true);
        let report = charm.handle(&Event::ConfigChanged);
        assert_eq!(report.outcome, HandlerOutcome::Deferred(WAITING_PEERS.into()));
    }

    #[test]
    fn test_all_role_goes_active() {
        let dir = tempfile::tempdir().unwrap();
        let mut charm = charm(&dir, CharmConfig::default());
        join_peers(&charm);

        let report = charm.handle(&Event::ConfigChanged);
        assert_eq!(report.status, UnitStatus::active());
        assert!(charm.last_sync().unwrap().replanned);
        let state = charm.store().node_state("trino").unwrap();
        assert_eq!(state.discovery_uri.as_deref(), Some("http://trino-k8s:8080"));
        assert!(state.internal_secret.is_some());
        assert_eq!(charm.statefulsets().patches().len(), 1);

        let report = charm.handle(&Event::UpdateStatus);
        assert_eq!(report.status, UnitStatus::active());
        assert!(!charm.last_sync().unwrap().replanned);
        assert_eq!(charm.statefulsets().patches().len(), 1);
    }

    #[test]
    fn test_invalid_config_blocks() {
        let dir = tempfile::tempdir().unwrap();
        let config = CharmConfig {
            google_client_id: Some("id".into()),
            ..CharmConfig::default()
        };
        let mut charm = charm(&dir, config);
        join_peers(&charm);

        let report = charm.handle(&Event::ConfigChanged);
        assert!(report.status.is_blocked());
        assert!(charm.workload().plan().unwrap().is_none());
    }

    #[test]
    fn test_action_failure_keeps_status() {
        let dir = tempfile::tempdir().unwrap();
        let mut charm = charm(&dir, CharmConfig::default());
        join_peers(&charm);
        charm.handle(&Event::ConfigChanged);

        let request = trino_catalog::ConnectorRequest {
            name: "pg".into(),
            config: "connector.name=postgresql\n\
                     connection-url=jdbc:postgresql://db:5432/app\n\
                     connection-user=trino\n\
                     connection-password=secret\n"
                .into(),
            cert: None,
        };
        let action = Event::Action(Action::AddConnector(request));
        let report = charm.handle(&action);
        assert_eq!(report.action, Some(Ok("Successfully added pg".to_string())));

        let report = charm.handle(&action);
        assert_eq!(report.status, UnitStatus::active());
        assert!(matches!(report.action, Some(Err(_))));
    }
}
