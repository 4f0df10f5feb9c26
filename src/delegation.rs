//! Task delegation engine
//!
//! Executes one task against the handler for its assignee's classification.
//! A delegated task always ends in exactly one of Completed or Error, and
//! every attempt appends exactly one orchestration log entry.

use crate::error::{CoordinatorError, Result};
use crate::handlers::{HandlerRequest, Handlers};
use crate::orchestrator::log::{LogEntry, OrchestrationLog, Severity};
use crate::orchestrator::state::Stage;
use crate::projects::{ProjectStore, TaskStatus};
use crate::registry::AgentRegistry;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Outcome of one delegation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelegationResult {
    pub success: bool,
    pub output: String,
    pub error: Option<String>,
    pub agent_id: String,
}

pub struct DelegationEngine {
    projects: Arc<ProjectStore>,
    registry: Arc<AgentRegistry>,
    handlers: Arc<Handlers>,
    log: OrchestrationLog,
}

impl DelegationEngine {
    pub fn new(
        projects: Arc<ProjectStore>,
        registry: Arc<AgentRegistry>,
        handlers: Arc<Handlers>,
        log: OrchestrationLog,
    ) -> Self {
        Self { projects, registry, handlers, log }
    }

    /// Delegate one task.
    ///
    /// `NotFound` / `Validation` are returned before anything is mutated.
    /// Handler failures are captured into the task and the returned result.
    pub async fn delegate(&self, project_id: &str, task_id: &str) -> Result<DelegationResult> {
        let task = self.projects.task(project_id, task_id).await?;

        // Pending -> InProgress, checked under the write lock
        self.projects
            .update_task(project_id, task_id, |task| {
                if task.status != TaskStatus::Pending {
                    return Err(CoordinatorError::Validation(format!(
                        "task {} is {:?}, only pending tasks can be delegated",
                        task.id, task.status
                    )));
                }
                task.status = TaskStatus::InProgress;
                task.started_at = Some(Utc::now());
                Ok(())
            })
            .await??;

        debug!("Delegating task '{}' to {}", task.name, task.assignee);

        let request = HandlerRequest::Task {
            project_id: project_id.to_string(),
            task_id: task_id.to_string(),
            name: task.name.clone(),
            description: task.description.clone(),
        };

        let outcome = match self.registry.resolve(&task.assignee).await {
            Ok(classification) => self
                .handlers
                .dispatch(&classification, &task.assignee, &request)
                .await
                .map(|reply| (classification.kind(), reply)),
            Err(e) => Err(e),
        };
        self.registry.touch(&task.assignee).await;

        let result = match &outcome {
            Ok((_, reply)) => DelegationResult {
                success: true,
                output: reply.content.clone(),
                error: None,
                agent_id: task.assignee.clone(),
            },
            Err(e) => DelegationResult {
                success: false,
                output: String::new(),
                error: Some(e.to_string()),
                agent_id: task.assignee.clone(),
            },
        };

        let payload = match &outcome {
            Ok((_, reply)) => Some(serde_json::json!({
                "output": reply.content,
                "usage": reply.usage,
            })),
            Err(_) => None,
        };
        let finalize = self
            .projects
            .update_task(project_id, task_id, |task| {
                task.completed_at = Some(Utc::now());
                if result.success {
                    task.status = TaskStatus::Completed;
                    task.result = payload;
                    task.error = None;
                } else {
                    task.status = TaskStatus::Error;
                    task.error = result.error.clone();
                }
            })
            .await;

        let entry = match &outcome {
            Ok((kind, _)) => LogEntry::new(
                Stage::Delegating,
                Severity::Success,
                format!("Task '{}' completed by {} ({})", task.name, task.assignee, kind),
            ),
            Err(e) => LogEntry::new(
                Stage::Delegating,
                Severity::Error,
                format!("Task '{}' failed on {}: {}", task.name, task.assignee, e),
            ),
        };
        self.log.push(entry.for_project(project_id));

        finalize?;
        Ok(result)
    }

    /// Delegate every pending task of a project, each settling independently
    pub async fn delegate_pending(&self, project_id: &str) -> Result<Vec<(String, Result<DelegationResult>)>> {
        let pending = self.projects.get(project_id).await?.pending_task_ids();
        let futures = pending.into_iter().map(|task_id| async move {
            let result = self.delegate(project_id, &task_id).await;
            (task_id, result)
        });
        Ok(futures::future::join_all(futures).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::LocalPersonaHandler;
    use crate::projects::Task;
    use crate::registry::{AgentRecord, Allowlists};
    use crate::remote::{AgentTransport, MockAgentTransport, RemoteReply};
    use std::collections::{BTreeMap, BTreeSet};
    use std::time::Duration;

    fn allowlists() -> Allowlists {
        let mut external = BTreeMap::new();
        external.insert("kimi-k2".to_string(), "http://ext/kimi".to_string());
        let mut core = BTreeMap::new();
        core.insert("vault".to_string(), "http://core/vault".to_string());
        Allowlists::new(external, BTreeSet::from(["alden".to_string()]), core)
    }

    async fn engine(transport: MockAgentTransport) -> (DelegationEngine, Arc<ProjectStore>, OrchestrationLog) {
        engine_with(Arc::new(transport)).await
    }

    async fn engine_with(
        transport: Arc<dyn AgentTransport>,
    ) -> (DelegationEngine, Arc<ProjectStore>, OrchestrationLog) {
        let registry = Arc::new(AgentRegistry::new(allowlists()));
        registry
            .merge(&[AgentRecord::new("alden", "Alden"), AgentRecord::new("kimi-k2", "Kimi")])
            .await;
        let projects = Arc::new(ProjectStore::new());
        let log = OrchestrationLog::default();
        let handlers = Arc::new(Handlers::new(LocalPersonaHandler::new(Duration::ZERO), transport));
        (
            DelegationEngine::new(projects.clone(), registry, handlers, log.clone()),
            projects,
            log,
        )
    }

    #[tokio::test]
    async fn test_local_task_completes() {
        let (engine, projects, log) = engine(MockAgentTransport::new()).await;
        let project = projects
            .create("P", &[], vec![Task::new("plan", "outline the week", "alden").with_id("t1")])
            .await
            .unwrap();

        let result = engine.delegate(&project.id, "t1").await.unwrap();
        assert!(result.success);
        assert_eq!(result.agent_id, "alden");

        let task = projects.task(&project.id, "t1").await.unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        assert!(task.started_at.is_some() && task.completed_at.is_some());
        assert_eq!(log.len(), 1);
    }

    #[tokio::test]
    async fn test_remote_failure_marks_error() {
        let mut transport = MockAgentTransport::new();
        transport
            .expect_call()
            .returning(|agent_id, _, _| Err(CoordinatorError::delivery(agent_id, "HTTP 502")));
        let (engine, projects, log) = engine(transport).await;
        let project = projects
            .create("P", &[], vec![Task::new("code", "write it", "kimi-k2").with_id("t1")])
            .await
            .unwrap();

        let result = engine.delegate(&project.id, "t1").await.unwrap();
        assert!(!result.success);
        assert!(result.error.as_deref().unwrap_or_default().contains("HTTP 502"));

        let task = projects.task(&project.id, "t1").await.unwrap();
        assert_eq!(task.status, TaskStatus::Error);
        assert!(task.completed_at.is_some());
        assert_eq!(log.entries()[0].severity, Severity::Error);
    }

    #[tokio::test]
    async fn test_panicking_handler_still_finalizes_task() {
        struct Exploding;

        #[async_trait::async_trait]
        impl AgentTransport for Exploding {
            async fn call(&self, _: &str, _: &str, _: serde_json::Value) -> Result<RemoteReply> {
                panic!("connection pool poisoned");
            }
        }

        let (engine, projects, log) = engine_with(Arc::new(Exploding)).await;
        let project = projects
            .create("P", &[], vec![Task::new("code", "write it", "kimi-k2").with_id("t1")])
            .await
            .unwrap();

        let result = engine.delegate(&project.id, "t1").await.unwrap();
        assert!(!result.success);
        assert!(result.error.as_deref().unwrap_or_default().contains("connection pool poisoned"));

        let task = projects.task(&project.id, "t1").await.unwrap();
        assert_eq!(task.status, TaskStatus::Error);
        assert!(task.completed_at.is_some());
        assert_eq!(log.len(), 1);
        assert_eq!(log.entries()[0].severity, Severity::Error);
    }

    #[tokio::test]
    async fn test_missing_task_mutates_nothing() {
        let (engine, projects, log) = engine(MockAgentTransport::new()).await;
        let project = projects.create("P", &[], vec![]).await.unwrap();
        let err = engine.delegate(&project.id, "ghost").await.unwrap_err();
        assert!(matches!(err, CoordinatorError::NotFound { kind: "task", .. }));
        assert!(log.is_empty());
    }

    #[tokio::test]
    async fn test_terminal_task_cannot_be_redelegated() {
        let (engine, projects, log) = engine(MockAgentTransport::new()).await;
        let project = projects
            .create("P", &[], vec![Task::new("plan", "x", "alden").with_id("t1")])
            .await
            .unwrap();
        engine.delegate(&project.id, "t1").await.unwrap();
        let err = engine.delegate(&project.id, "t1").await.unwrap_err();
        assert!(matches!(err, CoordinatorError::Validation(_)));
        assert_eq!(log.len(), 1);
    }

    #[tokio::test]
    async fn test_delegate_pending_settles_independently() {
        let mut transport = MockAgentTransport::new();
        transport
            .expect_call()
            .withf(|agent_id, _, _| agent_id == "kimi-k2")
            .returning(|_, _, _| Ok(RemoteReply::text("done remotely")));
        transport
            .expect_call()
            .withf(|agent_id, _, _| agent_id == "vault")
            .returning(|agent_id, _, _| Err(CoordinatorError::delivery(agent_id, "unreachable")));
        let (engine, projects, log) = engine(transport).await;
        let project = projects
            .create(
                "P",
                &[],
                vec![
                    Task::new("a", "x", "alden"),
                    Task::new("b", "y", "kimi-k2"),
                    Task::new("c", "z", "vault"),
                ],
            )
            .await
            .unwrap();

        let results = engine.delegate_pending(&project.id).await.unwrap();
        assert_eq!(results.len(), 3);
        let succeeded = results.iter().filter(|(_, r)| matches!(r, Ok(d) if d.success)).count();
        assert_eq!(succeeded, 2);
        assert_eq!(log.len(), 3);

        let project = projects.get(&project.id).await.unwrap();
        assert!(project.tasks.iter().all(|t| t.status.is_terminal()));
    }
}
