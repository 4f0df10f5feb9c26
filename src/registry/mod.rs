//! Agent registry
//!
//! Source of truth for agent identity, classification, status and metrics.
//! Discovery sources are merged by id on top of the built-in list; later
//! sightings override mutable fields, classification is fixed at first sight.

pub mod classify;
pub mod descriptor;
pub mod discovery;

pub use classify::{Allowlists, Classification, ClassificationKind};
pub use descriptor::{AgentDescriptor, AgentRecord, AgentStatus, PerformanceMetrics};
pub use discovery::{builtin_agents, DiscoverySource, HttpDiscovery, StaticDiscovery};

use crate::error::{CoordinatorError, Result};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Outcome of a registry refresh
#[derive(Debug, Clone, Default)]
pub struct RefreshSummary {
    /// Records merged, built-in list included
    pub records_merged: usize,
    /// Agents newly registered by this refresh
    pub new_agents: usize,
    /// Sources that failed and were skipped
    pub failed_sources: Vec<String>,
    /// Registry size after the refresh
    pub total: usize,
}

/// Registry of known agents
pub struct AgentRegistry {
    allowlists: Allowlists,
    /// Reject ids that are neither registered nor allowlisted
    strict_unknown: bool,
    agents: RwLock<HashMap<String, AgentDescriptor>>,
}

impl AgentRegistry {
    pub fn new(allowlists: Allowlists) -> Self {
        Self {
            allowlists,
            strict_unknown: false,
            agents: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_strict_unknown(mut self, strict: bool) -> Self {
        self.strict_unknown = strict;
        self
    }

    /// Merge the built-in list and every source, in order
    pub async fn refresh(&self, sources: &[Arc<dyn DiscoverySource>]) -> RefreshSummary {
        let mut summary = RefreshSummary::default();

        let builtin = builtin_agents();
        summary.records_merged += builtin.len();
        summary.new_agents += self.merge(&builtin).await;

        for source in sources {
            match source.discover().await {
                Ok(records) => {
                    debug!("Discovery source {} returned {} agents", source.name(), records.len());
                    summary.records_merged += records.len();
                    summary.new_agents += self.merge(&records).await;
                }
                Err(e) => {
                    warn!("Discovery source {} failed, skipping: {}", source.name(), e);
                    summary.failed_sources.push(source.name().to_string());
                }
            }
        }

        summary.total = self.len().await;
        info!(
            "Registry refreshed: {} agents ({} new, {} sources failed)",
            summary.total,
            summary.new_agents,
            summary.failed_sources.len()
        );
        summary
    }

    /// Merge records by id. Returns how many ids were seen for the first time.
    pub async fn merge(&self, records: &[AgentRecord]) -> usize {
        let mut agents = self.agents.write().await;
        let mut new_agents = 0;
        for record in records {
            if record.id.trim().is_empty() {
                warn!("Ignoring agent record with empty id");
                continue;
            }
            match agents.get_mut(&record.id) {
                Some(existing) => existing.apply(record),
                None => {
                    let classification = self.allowlists.classify(&record.id);
                    agents.insert(
                        record.id.clone(),
                        AgentDescriptor::from_record(record, classification),
                    );
                    new_agents += 1;
                }
            }
        }
        new_agents
    }

    /// Look up a descriptor
    pub async fn get(&self, id: &str) -> Result<AgentDescriptor> {
        let agents = self.agents.read().await;
        agents
            .get(id)
            .cloned()
            .ok_or_else(|| CoordinatorError::not_found("agent", id))
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.agents.read().await.contains_key(id)
    }

    /// Allowlist classification of an id; unknown ids default to `LocalPersona`
    pub fn classify(&self, id: &str) -> Classification {
        self.allowlists.classify(id)
    }

    /// Classification used for routing: the one stored at registration, or the
    /// allowlist result for unregistered ids. In strict mode an id that is
    /// neither registered nor allowlisted is an error.
    pub async fn resolve(&self, id: &str) -> Result<Classification> {
        if let Some(descriptor) = self.agents.read().await.get(id) {
            return Ok(descriptor.classification.clone());
        }
        if self.strict_unknown && !self.allowlists.is_listed(id) {
            return Err(CoordinatorError::UnknownAgent(id.to_string()));
        }
        Ok(self.allowlists.classify(id))
    }

    /// All agents sorted by id
    pub async fn list(&self) -> Vec<AgentDescriptor> {
        let agents = self.agents.read().await;
        let mut list: Vec<_> = agents.values().cloned().collect();
        list.sort_by(|a, b| a.id.cmp(&b.id));
        list
    }

    /// All registered ids, sorted
    pub async fn ids(&self) -> Vec<String> {
        let agents = self.agents.read().await;
        let mut ids: Vec<_> = agents.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Ids of agents with `Active` status, sorted
    pub async fn active_ids(&self) -> Vec<String> {
        let agents = self.agents.read().await;
        let mut ids: Vec<_> = agents
            .values()
            .filter(|a| a.is_active())
            .map(|a| a.id.clone())
            .collect();
        ids.sort();
        ids
    }

    pub async fn len(&self) -> usize {
        self.agents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.agents.read().await.is_empty()
    }

    /// Periodic metric update
    pub async fn update_metrics(&self, id: &str, metrics: PerformanceMetrics) -> Result<()> {
        self.with_agent(id, |agent| {
            agent.metrics = PerformanceMetrics {
                efficiency: metrics.efficiency.min(100),
                accuracy: metrics.accuracy.min(100),
                responsiveness: metrics.responsiveness.min(100),
            };
        })
        .await
    }

    pub async fn set_status(&self, id: &str, status: AgentStatus) -> Result<()> {
        self.with_agent(id, |agent| agent.status = status).await
    }

    pub async fn set_load(&self, id: &str, load: u8) -> Result<()> {
        self.with_agent(id, |agent| agent.load = load.min(100)).await
    }

    /// Stamp last activity; unregistered ids are ignored
    pub async fn touch(&self, id: &str) {
        if let Some(agent) = self.agents.write().await.get_mut(id) {
            agent.last_activity = Utc::now();
        }
    }

    async fn with_agent<F>(&self, id: &str, update: F) -> Result<()>
    where
        F: FnOnce(&mut AgentDescriptor),
    {
        let mut agents = self.agents.write().await;
        let agent = agents
            .get_mut(id)
            .ok_or_else(|| CoordinatorError::not_found("agent", id))?;
        update(agent);
        agent.last_activity = Utc::now();
        Ok(())
    }
}
