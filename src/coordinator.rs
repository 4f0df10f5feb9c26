//! Coordinator context
//!
//! Owns the registry, project store, orchestration log and session set for
//! one process, and hands each subsystem the handles it needs.

use crate::conference::{ConferenceManager, ConferenceSettings};
use crate::config::Config;
use crate::delegation::DelegationEngine;
use crate::error::Result;
use crate::handlers::{Handlers, LocalPersonaHandler};
use crate::messaging::{BroadcastCoordinator, MessagingRouter};
use crate::orchestrator::{MachineSettings, OrchestrationLog, OrchestrationStateMachine};
use crate::projects::ProjectStore;
use crate::registry::{AgentRegistry, Allowlists, DiscoverySource, HttpDiscovery, RefreshSummary};
use crate::remote::{
    AgentTransport, GuardedTransport, HttpOrchestrator, HttpSessionStore, HttpTransport, RemoteOrchestrator,
    SessionStore,
};
use std::sync::Arc;
use tracing::warn;

/// External collaborators injected into a coordinator
pub struct Collaborators {
    pub transport: Arc<dyn AgentTransport>,
    pub orchestrator: Option<Arc<dyn RemoteOrchestrator>>,
    pub session_store: Option<Arc<dyn SessionStore>>,
    pub discovery: Vec<Arc<dyn DiscoverySource>>,
}

impl Collaborators {
    /// HTTP collaborators for the endpoints named in `config`
    pub fn from_config(config: &Config) -> Result<Self> {
        let timeout = config.remote.timeout();
        let http: Arc<dyn AgentTransport> = Arc::new(HttpTransport::new(timeout)?);
        let transport = Arc::new(GuardedTransport::new(http, timeout, config.circuit_breaker.clone()));

        let orchestrator = match &config.remote.orchestration_url {
            Some(url) => Some(Arc::new(HttpOrchestrator::new(url.clone(), timeout)?) as Arc<dyn RemoteOrchestrator>),
            None => None,
        };
        let session_store = match &config.remote.session_url {
            Some(url) => Some(Arc::new(HttpSessionStore::new(url.clone(), timeout)?) as Arc<dyn SessionStore>),
            None => None,
        };

        let mut discovery: Vec<Arc<dyn DiscoverySource>> = Vec::new();
        for url in &config.registry.discovery_urls {
            match HttpDiscovery::new(url.clone(), timeout) {
                Ok(source) => discovery.push(Arc::new(source)),
                Err(e) => warn!("Skipping discovery source {}: {}", url, e),
            }
        }

        Ok(Self {
            transport,
            orchestrator,
            session_store,
            discovery,
        })
    }
}

/// One coordinator instance and every subsystem it owns
pub struct Coordinator {
    pub registry: Arc<AgentRegistry>,
    pub projects: Arc<ProjectStore>,
    pub log: OrchestrationLog,
    pub delegation: Arc<DelegationEngine>,
    pub orchestration: OrchestrationStateMachine,
    pub router: Arc<MessagingRouter>,
    pub broadcast: BroadcastCoordinator,
    pub conference: ConferenceManager,
    discovery: Vec<Arc<dyn DiscoverySource>>,
}

impl Coordinator {
    pub fn new(config: &Config, collaborators: Collaborators) -> Self {
        let registry = Arc::new(
            AgentRegistry::new(Allowlists::from_config(&config.registry))
                .with_strict_unknown(config.registry.strict_unknown_agents),
        );
        let projects = Arc::new(ProjectStore::new());
        let log = OrchestrationLog::new(config.orchestration.log_capacity);

        let handlers = Arc::new(Handlers::new(
            LocalPersonaHandler::new(config.delegation.local_latency()),
            collaborators.transport,
        ));

        let delegation = Arc::new(DelegationEngine::new(
            projects.clone(),
            registry.clone(),
            handlers.clone(),
            log.clone(),
        ));
        let orchestration = OrchestrationStateMachine::new(
            projects.clone(),
            delegation.clone(),
            collaborators.orchestrator,
            log.clone(),
            MachineSettings::from_config(&config.remote, &config.orchestration),
        );

        let router = Arc::new(MessagingRouter::new(registry.clone(), handlers));
        let broadcast = BroadcastCoordinator::new(router.clone());
        let conference = ConferenceManager::new(
            router.clone(),
            collaborators.session_store,
            ConferenceSettings::from_config(&config.conference, &config.remote),
        );

        Self {
            registry,
            projects,
            log,
            delegation,
            orchestration,
            router,
            broadcast,
            conference,
            discovery: collaborators.discovery,
        }
    }

    /// Coordinator wired to the HTTP collaborators in `config`
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(config, Collaborators::from_config(config)?))
    }

    /// Re-run agent discovery
    pub async fn refresh_agents(&self) -> RefreshSummary {
        self.registry.refresh(&self.discovery).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::MockAgentTransport;

    #[tokio::test]
    async fn test_refresh_loads_builtin_agents() {
        let collaborators = Collaborators {
            transport: Arc::new(MockAgentTransport::new()),
            orchestrator: None,
            session_store: None,
            discovery: vec![],
        };
        let coordinator = Coordinator::new(&Config::default(), collaborators);
        let summary = coordinator.refresh_agents().await;
        assert_eq!(summary.total, 9);
        assert!(coordinator.registry.contains("vault").await);
    }

    #[test]
    fn test_from_config_builds_http_collaborators() {
        let mut config = Config::default();
        config.remote.orchestration_url = Some("http://127.0.0.1:9/orchestrate".into());
        let collaborators = Collaborators::from_config(&config).unwrap();
        assert!(collaborators.orchestrator.is_some());
        assert!(collaborators.session_store.is_none());
    }
}
