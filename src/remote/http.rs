//! HTTP implementations of the remote collaborators

use super::{AgentTransport, OrchestrationResponse, RemoteOrchestrator, RemoteReply, SessionStore};
use crate::conference::ConferenceSession;
use crate::error::{CoordinatorError, Result};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| CoordinatorError::Internal(format!("failed to build HTTP client: {}", e)))
}

/// Agent reply body: `{result | response, usage?}`
#[derive(Debug, Deserialize)]
struct AgentReplyBody {
    #[serde(default)]
    result: Option<serde_json::Value>,
    #[serde(default)]
    response: Option<serde_json::Value>,
    #[serde(default)]
    usage: Option<serde_json::Value>,
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    error: Option<String>,
}

fn value_to_text(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    }
}

/// POSTs JSON payloads to agent endpoints
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(Self { client: build_client(timeout)? })
    }
}

#[async_trait::async_trait]
impl AgentTransport for HttpTransport {
    async fn call(&self, agent_id: &str, endpoint: &str, payload: serde_json::Value) -> Result<RemoteReply> {
        debug!("POST {} for agent {}", endpoint, agent_id);

        let response = self
            .client
            .post(endpoint)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    CoordinatorError::delivery(agent_id, "request timed out")
                } else {
                    CoordinatorError::delivery(agent_id, format!("unreachable: {}", e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CoordinatorError::delivery(
                agent_id,
                format!("HTTP {}: {}", status, body.chars().take(200).collect::<String>()),
            ));
        }

        let body: AgentReplyBody = response
            .json()
            .await
            .map_err(|e| CoordinatorError::delivery(agent_id, format!("invalid response body: {}", e)))?;

        if body.success == Some(false) {
            return Err(CoordinatorError::delivery(
                agent_id,
                body.error.unwrap_or_else(|| "agent reported failure".to_string()),
            ));
        }

        let content = body
            .result
            .or(body.response)
            .map(value_to_text)
            .ok_or_else(|| CoordinatorError::delivery(agent_id, "response has neither result nor response"))?;

        Ok(RemoteReply { content, usage: body.usage })
    }
}

/// Remote orchestration over HTTP
pub struct HttpOrchestrator {
    url: String,
    client: Client,
}

impl HttpOrchestrator {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self { url: url.into(), client: build_client(timeout)? })
    }
}

#[async_trait::async_trait]
impl RemoteOrchestrator for HttpOrchestrator {
    async fn orchestrate(&self, project_id: &str) -> Result<OrchestrationResponse> {
        let response = self
            .client
            .post(&self.url)
            .json(&serde_json::json!({ "project_id": project_id }))
            .send()
            .await
            .map_err(|e| CoordinatorError::RemoteUnavailable(format!("{}: {}", self.url, e)))?;

        // Non-2xx is treated the same as a network failure
        if !response.status().is_success() {
            return Err(CoordinatorError::RemoteUnavailable(format!(
                "{} returned {}",
                self.url,
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| CoordinatorError::RemoteUnavailable(format!("{}: bad payload: {}", self.url, e)))
    }
}

/// Session persistence over HTTP: `GET/PUT {base}/{session_id}`
pub struct HttpSessionStore {
    base_url: String,
    client: Client,
}

impl HttpSessionStore {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: build_client(timeout)?,
        })
    }

    fn session_url(&self, session_id: &str) -> String {
        format!("{}/{}", self.base_url, session_id)
    }
}

#[async_trait::async_trait]
impl SessionStore for HttpSessionStore {
    async fn load(&self, session_id: &str) -> Result<Option<ConferenceSession>> {
        let url = self.session_url(session_id);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| CoordinatorError::RemoteUnavailable(format!("{}: {}", url, e)))?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => response
                .json()
                .await
                .map(Some)
                .map_err(|e| CoordinatorError::RemoteUnavailable(format!("{}: bad payload: {}", url, e))),
            status => Err(CoordinatorError::RemoteUnavailable(format!("{} returned {}", url, status))),
        }
    }

    async fn save(&self, session: &ConferenceSession) -> Result<()> {
        let url = self.session_url(&session.id);
        let response = self
            .client
            .put(&url)
            .json(session)
            .send()
            .await
            .map_err(|e| CoordinatorError::RemoteUnavailable(format!("{}: {}", url, e)))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(CoordinatorError::RemoteUnavailable(format!("{} returned {}", url, response.status())))
        }
    }
}
