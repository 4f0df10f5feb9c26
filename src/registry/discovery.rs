//! Agent discovery sources
//!
//! A discovery source returns agent records. The built-in list is always
//! merged first so the registry is usable when every source is down.

use super::descriptor::AgentRecord;
use crate::error::{CoordinatorError, Result};
use std::time::Duration;

/// Something that can list agents
#[async_trait::async_trait]
pub trait DiscoverySource: Send + Sync {
    /// Source name for logging
    fn name(&self) -> &str;

    /// Fetch the agent records this source knows about
    async fn discover(&self) -> Result<Vec<AgentRecord>>;
}

/// Fixed list of records
pub struct StaticDiscovery {
    name: String,
    records: Vec<AgentRecord>,
}

impl StaticDiscovery {
    pub fn new(name: impl Into<String>, records: Vec<AgentRecord>) -> Self {
        Self { name: name.into(), records }
    }
}

#[async_trait::async_trait]
impl DiscoverySource for StaticDiscovery {
    fn name(&self) -> &str {
        &self.name
    }

    async fn discover(&self) -> Result<Vec<AgentRecord>> {
        Ok(self.records.clone())
    }
}

/// Discovery over HTTP: GET returns a JSON array of records, or `{"agents": [...]}`
pub struct HttpDiscovery {
    url: String,
    client: reqwest::Client,
}

#[derive(serde::Deserialize)]
#[serde(untagged)]
enum DiscoveryPayload {
    List(Vec<AgentRecord>),
    Wrapped { agents: Vec<AgentRecord> },
}

impl HttpDiscovery {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CoordinatorError::Internal(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { url: url.into(), client })
    }
}

#[async_trait::async_trait]
impl DiscoverySource for HttpDiscovery {
    fn name(&self) -> &str {
        &self.url
    }

    async fn discover(&self) -> Result<Vec<AgentRecord>> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| CoordinatorError::RemoteUnavailable(format!("{}: {}", self.url, e)))?;

        if !response.status().is_success() {
            return Err(CoordinatorError::RemoteUnavailable(format!(
                "{} returned {}",
                self.url,
                response.status()
            )));
        }

        let payload: DiscoveryPayload = response
            .json()
            .await
            .map_err(|e| CoordinatorError::RemoteUnavailable(format!("{}: bad payload: {}", self.url, e)))?;

        Ok(match payload {
            DiscoveryPayload::List(records) => records,
            DiscoveryPayload::Wrapped { agents } => agents,
        })
    }
}

/// Built-in fallback agents
pub fn builtin_agents() -> Vec<AgentRecord> {
    vec![
        AgentRecord::new("alden", "Alden")
            .with_capabilities(&["memory", "planning", "productivity"])
            .with_performance(92.0, 94.0, 88.0),
        AgentRecord::new("alice", "Alice")
            .with_capabilities(&["behavioral-analysis", "reflection"])
            .with_performance(85.0, 90.0, 86.0),
        AgentRecord::new("mimic", "Mimic")
            .with_capabilities(&["persona-creation", "adaptation"])
            .with_status("learning")
            .with_performance(78.0, 82.0, 90.0),
        AgentRecord::new("sentry", "Sentry")
            .with_capabilities(&["security", "audit"])
            .with_status("monitoring")
            .with_performance(95.0, 97.0, 93.0),
        AgentRecord::new("kimi-k2", "Kimi K2")
            .with_capabilities(&["reasoning", "coding", "tool-use"])
            .with_performance(88.0, 91.0, 80.0),
        AgentRecord::new("claude-code", "Claude Code")
            .with_capabilities(&["coding", "refactoring"])
            .with_performance(90.0, 93.0, 82.0),
        AgentRecord::new("core", "Core")
            .with_capabilities(&["orchestration", "routing"])
            .with_performance(97.0, 96.0, 95.0),
        AgentRecord::new("vault", "Vault")
            .with_capabilities(&["storage", "retrieval"])
            .with_performance(96.0, 98.0, 92.0),
        AgentRecord::new("synapse", "Synapse")
            .with_capabilities(&["plugins", "integration"])
            .with_performance(89.0, 90.0, 91.0),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_ids_unique() {
        let agents = builtin_agents();
        let mut ids: Vec<_> = agents.iter().map(|a| a.id.as_str()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), agents.len());
    }

    #[test]
    fn test_payload_shapes() {
        let list: DiscoveryPayload = serde_json::from_str(r#"[{"id": "a"}]"#).unwrap();
        assert!(matches!(list, DiscoveryPayload::List(ref r) if r.len() == 1));

        let wrapped: DiscoveryPayload =
            serde_json::from_str(r#"{"agents": [{"id": "a", "name": "A", "status": "active"}]}"#).unwrap();
        assert!(matches!(wrapped, DiscoveryPayload::Wrapped { ref agents } if agents[0].id == "a"));
    }

    #[tokio::test]
    async fn test_static_discovery() {
        let source = StaticDiscovery::new("fixture", vec![AgentRecord::new("x", "X")]);
        let records = source.discover().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(source.name(), "fixture");
    }
}
