//! Agent classification
//!
//! Routing category for an agent id, resolved from three static allowlists.
//! Priority: external-agent allowlist > local-persona allowlist >
//! core-service allowlist > default `LocalPersona`.

use crate::config::RegistryConfig;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Routing category, carrying the endpoint for remote-backed agents
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Classification {
    /// Locally simulated persona
    LocalPersona,
    /// External API-backed agent
    ExternalService { endpoint: String },
    /// Internal infrastructure service
    CoreService { endpoint: String },
}

/// Endpoint-free view of a classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationKind {
    LocalPersona,
    ExternalService,
    CoreService,
}

impl Classification {
    pub fn kind(&self) -> ClassificationKind {
        match self {
            Classification::LocalPersona => ClassificationKind::LocalPersona,
            Classification::ExternalService { .. } => ClassificationKind::ExternalService,
            Classification::CoreService { .. } => ClassificationKind::CoreService,
        }
    }

    /// Remote endpoint, if this classification is remote-backed
    pub fn endpoint(&self) -> Option<&str> {
        match self {
            Classification::LocalPersona => None,
            Classification::ExternalService { endpoint }
            | Classification::CoreService { endpoint } => Some(endpoint),
        }
    }
}

impl std::fmt::Display for ClassificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClassificationKind::LocalPersona => write!(f, "local persona"),
            ClassificationKind::ExternalService => write!(f, "external service"),
            ClassificationKind::CoreService => write!(f, "core service"),
        }
    }
}

/// The three static allowlists
#[derive(Debug, Clone, Default)]
pub struct Allowlists {
    external: BTreeMap<String, String>,
    local: BTreeSet<String>,
    core: BTreeMap<String, String>,
}

impl Allowlists {
    pub fn new(
        external: BTreeMap<String, String>,
        local: BTreeSet<String>,
        core: BTreeMap<String, String>,
    ) -> Self {
        Self { external, local, core }
    }

    pub fn from_config(config: &RegistryConfig) -> Self {
        Self {
            external: config.external_agents.clone(),
            local: config.local_personas.iter().cloned().collect(),
            core: config.core_services.clone(),
        }
    }

    /// Classify an id. Pure: depends only on the id and the allowlists.
    pub fn classify(&self, id: &str) -> Classification {
        if let Some(endpoint) = self.external.get(id) {
            return Classification::ExternalService { endpoint: endpoint.clone() };
        }
        if self.local.contains(id) {
            return Classification::LocalPersona;
        }
        if let Some(endpoint) = self.core.get(id) {
            return Classification::CoreService { endpoint: endpoint.clone() };
        }
        Classification::LocalPersona
    }

    /// Whether any allowlist names this id
    pub fn is_listed(&self, id: &str) -> bool {
        self.external.contains_key(id) || self.local.contains(id) || self.core.contains_key(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lists() -> Allowlists {
        let mut external = BTreeMap::new();
        external.insert("kimi-k2".to_string(), "http://ext/kimi".to_string());
        external.insert("dual".to_string(), "http://ext/dual".to_string());
        let local: BTreeSet<String> = ["alden", "dual", "shadow"].iter().map(|s| s.to_string()).collect();
        let mut core = BTreeMap::new();
        core.insert("vault".to_string(), "http://core/vault".to_string());
        core.insert("shadow".to_string(), "http://core/shadow".to_string());
        Allowlists::new(external, local, core)
    }

    #[test]
    fn test_priority_order() {
        let lists = lists();
        // external beats local
        assert_eq!(lists.classify("dual").kind(), ClassificationKind::ExternalService);
        // local beats core
        assert_eq!(lists.classify("shadow"), Classification::LocalPersona);
        assert_eq!(
            lists.classify("vault"),
            Classification::CoreService { endpoint: "http://core/vault".into() }
        );
    }

    #[test]
    fn test_unknown_defaults_to_local_persona() {
        let lists = lists();
        assert_eq!(lists.classify("nobody"), Classification::LocalPersona);
        assert!(!lists.is_listed("nobody"));
    }

    #[test]
    fn test_classify_is_order_independent() {
        let lists = lists();
        let ids = ["vault", "kimi-k2", "alden", "nobody", "dual"];
        let forward: Vec<_> = ids.iter().map(|id| lists.classify(id)).collect();
        let mut backward: Vec<_> = ids.iter().rev().map(|id| lists.classify(id)).collect();
        backward.reverse();
        assert_eq!(forward, backward);
    }
}
