//! Classification handlers
//!
//! One delivery path per classification, shared by task delegation and the
//! messaging router. Local personas are simulated with artificial latency and
//! never fail; external and core services go through the agent transport.

use crate::error::{CoordinatorError, Result};
use crate::registry::Classification;
use crate::remote::{AgentTransport, RemoteReply};
use futures::FutureExt;
use serde_json::json;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// What a handler is asked to do
#[derive(Debug, Clone, PartialEq)]
pub enum HandlerRequest {
    Task {
        project_id: String,
        task_id: String,
        name: String,
        description: String,
    },
    Message {
        from: String,
        content: String,
    },
}

impl HandlerRequest {
    /// JSON payload for an external agent endpoint
    fn external_payload(&self, agent_id: &str) -> serde_json::Value {
        match self {
            HandlerRequest::Task { project_id, task_id, name, description } => json!({
                "agent_id": agent_id,
                "task": {
                    "id": task_id,
                    "project_id": project_id,
                    "name": name,
                    "description": description,
                },
            }),
            HandlerRequest::Message { from, content } => json!({
                "agent_id": agent_id,
                "message": content,
                "from": from,
            }),
        }
    }

    /// JSON payload for a core service endpoint
    fn service_payload(&self, agent_id: &str) -> serde_json::Value {
        match self {
            HandlerRequest::Task { .. } => json!({
                "service": agent_id,
                "operation": "execute_task",
                "payload": self.external_payload(agent_id)["task"].clone(),
            }),
            HandlerRequest::Message { from, content } => json!({
                "service": agent_id,
                "operation": "message",
                "payload": { "from": from, "content": content },
            }),
        }
    }
}

/// Simulated local persona
#[derive(Debug, Clone)]
pub struct LocalPersonaHandler {
    latency: Duration,
}

impl LocalPersonaHandler {
    pub fn new(latency: Duration) -> Self {
        Self { latency }
    }

    pub async fn respond(&self, agent_id: &str, request: &HandlerRequest) -> RemoteReply {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let content = match request {
            HandlerRequest::Task { name, description, .. } => {
                format!("{} completed '{}': {}", agent_id, name, snippet(description, 120))
            }
            HandlerRequest::Message { from, content } => {
                format!("{} received your message from {}: \"{}\"", agent_id, from, snippet(content, 80))
            }
        };
        RemoteReply::text(content)
    }
}

fn snippet(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= max_chars {
        trimmed.to_string()
    } else {
        let cut: String = trimmed.chars().take(max_chars).collect();
        format!("{}...", cut)
    }
}

/// Dispatches a request to the handler for a classification
pub struct Handlers {
    local: LocalPersonaHandler,
    transport: Arc<dyn AgentTransport>,
}

impl Handlers {
    pub fn new(local: LocalPersonaHandler, transport: Arc<dyn AgentTransport>) -> Self {
        Self { local, transport }
    }

    /// Run the handler for `classification`. Panics inside a handler become
    /// `Internal` errors.
    pub async fn dispatch(
        &self,
        classification: &Classification,
        agent_id: &str,
        request: &HandlerRequest,
    ) -> Result<RemoteReply> {
        debug!("Dispatching to {} via {} handler", agent_id, classification.kind());

        let call = async {
            match classification {
                Classification::LocalPersona => Ok(self.local.respond(agent_id, request).await),
                Classification::ExternalService { endpoint } => {
                    self.transport
                        .call(agent_id, endpoint, request.external_payload(agent_id))
                        .await
                }
                Classification::CoreService { endpoint } => {
                    self.transport
                        .call(agent_id, endpoint, request.service_payload(agent_id))
                        .await
                }
            }
        };

        match AssertUnwindSafe(call).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => {
                let detail = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "handler panicked".to_string());
                Err(CoordinatorError::Internal(format!("handler for {} panicked: {}", agent_id, detail)))
            }
        }
    }
}
