//! Point-to-point message router

use crate::error::{CoordinatorError, Result};
use crate::handlers::{HandlerRequest, Handlers};
use crate::registry::{AgentRegistry, ClassificationKind};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Delivered,
}

/// Normalised successful delivery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delivery {
    pub target_id: String,
    pub kind: ClassificationKind,
    pub status: DeliveryStatus,
    pub response: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<serde_json::Value>,
}

pub struct MessagingRouter {
    registry: Arc<AgentRegistry>,
    handlers: Arc<Handlers>,
}

impl MessagingRouter {
    pub fn new(registry: Arc<AgentRegistry>, handlers: Arc<Handlers>) -> Self {
        Self { registry, handlers }
    }

    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.registry
    }

    /// Deliver `content` from `from_id` to one agent.
    ///
    /// Every failure past input validation comes back as a `Delivery` error
    /// tagged with `target_id`.
    pub async fn send_message(&self, target_id: &str, content: &str, from_id: &str) -> Result<Delivery> {
        if target_id.trim().is_empty() {
            return Err(CoordinatorError::Validation("target agent id must not be empty".into()));
        }

        let classification = self
            .registry
            .resolve(target_id)
            .await
            .map_err(|e| tag_with_target(target_id, e))?;
        debug!("Routing message from {} to {} ({})", from_id, target_id, classification.kind());

        let request = HandlerRequest::Message {
            from: from_id.to_string(),
            content: content.to_string(),
        };
        let result = self.handlers.dispatch(&classification, target_id, &request).await;
        self.registry.touch(target_id).await;

        match result {
            Ok(reply) => Ok(Delivery {
                target_id: target_id.to_string(),
                kind: classification.kind(),
                status: DeliveryStatus::Delivered,
                response: reply.content,
                usage: reply.usage,
            }),
            Err(e) => {
                warn!("Message to {} failed: {}", target_id, e);
                Err(tag_with_target(target_id, e))
            }
        }
    }
}

fn tag_with_target(target_id: &str, error: CoordinatorError) -> CoordinatorError {
    match error {
        CoordinatorError::Delivery { agent_id, reason } if agent_id == target_id => {
            CoordinatorError::Delivery { agent_id, reason }
        }
        other => CoordinatorError::delivery(target_id, other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::LocalPersonaHandler;
    use crate::registry::{AgentRecord, Allowlists};
    use crate::remote::{MockAgentTransport, RemoteReply};
    use std::collections::{BTreeMap, BTreeSet};
    use std::time::Duration;

    fn allowlists() -> Allowlists {
        let mut external = BTreeMap::new();
        external.insert("kimi-k2".to_string(), "http://ext/kimi".to_string());
        Allowlists::new(external, BTreeSet::from(["alice".to_string()]), BTreeMap::new())
    }

    fn router(transport: MockAgentTransport, strict: bool) -> MessagingRouter {
        let registry = Arc::new(AgentRegistry::new(allowlists()).with_strict_unknown(strict));
        let handlers = Arc::new(Handlers::new(LocalPersonaHandler::new(Duration::ZERO), Arc::new(transport)));
        MessagingRouter::new(registry, handlers)
    }

    #[tokio::test]
    async fn test_local_delivery() {
        let router = router(MockAgentTransport::new(), false);
        let delivery = router.send_message("alice", "hi", "user").await.unwrap();
        assert_eq!(delivery.status, DeliveryStatus::Delivered);
        assert_eq!(delivery.kind, ClassificationKind::LocalPersona);
        assert!(delivery.response.contains("hi"));
    }

    #[tokio::test]
    async fn test_external_delivery_carries_usage() {
        let mut transport = MockAgentTransport::new();
        transport.expect_call().times(1).returning(|_, _, _| {
            Ok(RemoteReply {
                content: "pong".into(),
                usage: Some(serde_json::json!({ "total_tokens": 12 })),
            })
        });
        let router = router(transport, false);
        let delivery = router.send_message("kimi-k2", "ping", "user").await.unwrap();
        assert_eq!(delivery.kind, ClassificationKind::ExternalService);
        assert_eq!(delivery.response, "pong");
        assert_eq!(delivery.usage.unwrap()["total_tokens"], 12);
    }

    #[tokio::test]
    async fn test_failure_is_tagged_with_target() {
        let mut transport = MockAgentTransport::new();
        transport
            .expect_call()
            .returning(|_, _, _| Err(CoordinatorError::Internal("socket closed".into())));
        let router = router(transport, false);
        let err = router.send_message("kimi-k2", "ping", "user").await.unwrap_err();
        assert!(matches!(err, CoordinatorError::Delivery { ref agent_id, .. } if agent_id == "kimi-k2"));
    }

    #[tokio::test]
    async fn test_unknown_agent_defaults_to_local() {
        let router = router(MockAgentTransport::new(), false);
        assert!(router.send_message("nobody", "hi", "user").await.is_ok());
    }

    #[tokio::test]
    async fn test_strict_mode_rejects_unknown_agent() {
        let router = router(MockAgentTransport::new(), true);
        router.registry().merge(&[AgentRecord::new("registered", "R")]).await;

        let err = router.send_message("nobody", "hi", "user").await.unwrap_err();
        assert!(matches!(err, CoordinatorError::Delivery { ref reason, .. } if reason.contains("unknown agent")));
        assert!(router.send_message("registered", "hi", "user").await.is_ok());
        assert!(router.send_message("alice", "hi", "user").await.is_ok());
    }

    #[tokio::test]
    async fn test_empty_target_rejected() {
        let router = router(MockAgentTransport::new(), false);
        assert!(matches!(
            router.send_message(" ", "hi", "user").await,
            Err(CoordinatorError::Validation(_))
        ));
    }
}
