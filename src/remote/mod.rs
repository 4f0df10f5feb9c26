//! Remote collaborators
//!
//! Contracts for the services the coordinator talks to: remote agent
//! endpoints, the remote orchestration endpoint and the session store.
//! HTTP implementations live in [`http`]; every call is bounded by a timeout.

pub mod circuit_breaker;
pub mod fallback;
pub mod http;

pub use circuit_breaker::{CircuitBreaker, CircuitState, GuardedTransport};
pub use fallback::{with_fallback, Route};
pub use http::{HttpOrchestrator, HttpSessionStore, HttpTransport};

use crate::conference::ConferenceSession;
use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Normalised reply from a remote agent or service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteReply {
    pub content: String,
    /// Token usage or other accounting, passed through untouched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<serde_json::Value>,
}

impl RemoteReply {
    pub fn text(content: impl Into<String>) -> Self {
        Self { content: content.into(), usage: None }
    }
}

/// Calls a remote-backed agent (ExternalService or CoreService)
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait AgentTransport: Send + Sync {
    /// Deliver a JSON payload to the agent's endpoint.
    /// Failures are `Delivery` errors tagged with `agent_id`.
    async fn call(&self, agent_id: &str, endpoint: &str, payload: serde_json::Value) -> Result<RemoteReply>;
}

/// Project state reported by the remote orchestrator
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteProjectState {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub progress: Option<f64>,
}

/// Response body of the remote orchestration endpoint
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrchestrationResponse {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub project: RemoteProjectState,
}

/// Remote orchestration endpoint
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait RemoteOrchestrator: Send + Sync {
    /// Ask the remote side to orchestrate a project.
    /// Network failures and non-success responses are `RemoteUnavailable`.
    async fn orchestrate(&self, project_id: &str) -> Result<OrchestrationResponse>;
}

/// Remote session persistence
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait SessionStore: Send + Sync {
    /// Fetch a session; `Ok(None)` when the store has never seen it
    async fn load(&self, session_id: &str) -> Result<Option<ConferenceSession>>;

    /// Persist a session snapshot
    async fn save(&self, session: &ConferenceSession) -> Result<()>;
}
