//! Orchestration state machine
//!
//! Drives a project Idle -> Initializing -> Analyzing -> Delegating ->
//! Monitoring -> Active. Analysis asks the remote orchestrator first; when it
//! is unavailable the same stages are simulated locally and the pending tasks
//! are delegated in-process.

use super::log::{ExecutionPath, LogEntry, OrchestrationLog, Severity};
use super::state::{OrchestrationRun, Stage};
use crate::config::{OrchestrationConfig, RemoteConfig};
use crate::delegation::DelegationEngine;
use crate::error::{CoordinatorError, Result};
use crate::projects::{ProjectStatus, ProjectStore};
use crate::registry::descriptor::clamp_percent;
use crate::remote::{with_fallback, OrchestrationResponse, RemoteOrchestrator, Route};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

/// Timing knobs of the state machine
#[derive(Debug, Clone)]
pub struct MachineSettings {
    /// Bound on the remote orchestration call
    pub remote_timeout: Duration,
    /// Synthetic delay between fallback stages
    pub step_delay: Duration,
    /// Progress added by a fallback run
    pub progress_increment: u8,
}

impl MachineSettings {
    pub fn from_config(remote: &RemoteConfig, orchestration: &OrchestrationConfig) -> Self {
        Self {
            remote_timeout: remote.timeout(),
            step_delay: orchestration.step_delay(),
            progress_increment: orchestration.progress_increment,
        }
    }
}

impl Default for MachineSettings {
    fn default() -> Self {
        Self::from_config(&RemoteConfig::default(), &OrchestrationConfig::default())
    }
}

pub struct OrchestrationStateMachine {
    projects: Arc<ProjectStore>,
    engine: Arc<DelegationEngine>,
    remote: Option<Arc<dyn RemoteOrchestrator>>,
    runs: RwLock<HashMap<String, OrchestrationRun>>,
    log: OrchestrationLog,
    settings: MachineSettings,
}

impl OrchestrationStateMachine {
    pub fn new(
        projects: Arc<ProjectStore>,
        engine: Arc<DelegationEngine>,
        remote: Option<Arc<dyn RemoteOrchestrator>>,
        log: OrchestrationLog,
        settings: MachineSettings,
    ) -> Self {
        Self {
            projects,
            engine,
            remote,
            runs: RwLock::new(HashMap::new()),
            log,
            settings,
        }
    }

    pub fn log(&self) -> &OrchestrationLog {
        &self.log
    }

    /// Start (or restart) orchestration of a project.
    ///
    /// Returns the final run. A failure after the run has started is recorded
    /// on the run (stage `Error`) rather than returned.
    pub async fn start_orchestration(&self, project_id: &str) -> Result<OrchestrationRun> {
        let project = match self.projects.get(project_id).await {
            Ok(project) => project,
            Err(e) => {
                self.log.push(
                    LogEntry::new(Stage::Error, Severity::Error, format!("Cannot orchestrate: {}", e))
                        .for_project(project_id),
                );
                return Err(e);
            }
        };

        {
            let mut runs = self.runs.write().await;
            if let Some(run) = runs.get(project_id) {
                if run.stage.is_in_flight() {
                    return Err(CoordinatorError::Validation(format!(
                        "orchestration of {} is already {}",
                        project_id, run.stage
                    )));
                }
            }
            let previous = runs.remove(project_id).map(|r| r.stage).unwrap_or_default();
            let mut run = OrchestrationRun::new(project_id);
            run.stage = previous;
            run.advance(Stage::Initializing);
            runs.insert(project_id.to_string(), run);
        }
        self.log.push(
            LogEntry::new(
                Stage::Initializing,
                Severity::Info,
                format!("Initializing orchestration for '{}'", project.name),
            )
            .for_project(project_id),
        );

        if let Err(e) = self.drive(project_id).await {
            self.fail(project_id, &e).await;
        }
        self.run(project_id).await
    }

    /// Move an errored run back to Idle
    pub async fn reset(&self, project_id: &str) -> Result<OrchestrationRun> {
        let run = {
            let mut runs = self.runs.write().await;
            let run = runs
                .get_mut(project_id)
                .ok_or_else(|| CoordinatorError::not_found("orchestration run", project_id))?;
            if run.stage != Stage::Error {
                return Err(CoordinatorError::Validation(format!(
                    "only errored runs can be reset, {} is {}",
                    project_id, run.stage
                )));
            }
            run.advance(Stage::Idle);
            run.error = None;
            run.path = None;
            run.clone()
        };
        self.log.push(
            LogEntry::new(Stage::Idle, Severity::Info, "Run reset by caller").for_project(project_id),
        );
        Ok(run)
    }

    /// Reset an errored run and start again
    pub async fn retry(&self, project_id: &str) -> Result<OrchestrationRun> {
        self.reset(project_id).await?;
        self.start_orchestration(project_id).await
    }

    pub async fn run(&self, project_id: &str) -> Result<OrchestrationRun> {
        self.runs
            .read()
            .await
            .get(project_id)
            .cloned()
            .ok_or_else(|| CoordinatorError::not_found("orchestration run", project_id))
    }

    /// All runs, by project id
    pub async fn runs(&self) -> Vec<OrchestrationRun> {
        let mut runs: Vec<_> = self.runs.read().await.values().cloned().collect();
        runs.sort_by(|a, b| a.project_id.cmp(&b.project_id));
        runs
    }

    async fn drive(&self, project_id: &str) -> Result<()> {
        self.transition(project_id, Stage::Analyzing, Severity::Info, None, "Analyzing requirements".into())
            .await?;

        let remote = async {
            match &self.remote {
                Some(remote) => remote.orchestrate(project_id).await.map(Some),
                None => Err(CoordinatorError::RemoteUnavailable("no remote orchestrator configured".into())),
            }
        };
        let local = |reason: String| async move { self.fallback_path(project_id, &reason).await.map(|_| None) };

        match with_fallback(self.settings.remote_timeout, remote, local).await? {
            Route::Remote(Some(response)) => self.remote_path(project_id, response).await,
            Route::Remote(None) | Route::Fallback { .. } => Ok(()),
        }
    }

    async fn remote_path(&self, project_id: &str, response: OrchestrationResponse) -> Result<()> {
        self.set_path(project_id, ExecutionPath::Remote).await;
        let summary = if response.message.is_empty() {
            "Remote orchestrator accepted the project".to_string()
        } else {
            response.message.clone()
        };
        self.transition(project_id, Stage::Delegating, Severity::Info, Some(ExecutionPath::Remote), summary)
            .await?;

        let progress = self
            .projects
            .update(project_id, |project| {
                if let Some(progress) = response.project.progress {
                    project.raise_progress(clamp_percent(progress));
                }
                if let Some(status) = response.project.status.as_deref().and_then(ProjectStatus::from_str_lossy) {
                    project.status = status;
                }
                project.progress
            })
            .await?;

        self.transition(
            project_id,
            Stage::Monitoring,
            Severity::Info,
            Some(ExecutionPath::Remote),
            format!("Monitoring progress: {}%", progress),
        )
        .await?;
        self.transition(
            project_id,
            Stage::Active,
            Severity::Success,
            Some(ExecutionPath::Remote),
            "Orchestration active".into(),
        )
        .await
    }

    async fn fallback_path(&self, project_id: &str, reason: &str) -> Result<()> {
        self.set_path(project_id, ExecutionPath::Fallback).await;
        let pending = self.projects.get(project_id).await?.pending_task_ids().len();
        self.transition(
            project_id,
            Stage::Delegating,
            Severity::Warning,
            Some(ExecutionPath::Fallback),
            format!("Remote unavailable ({}), delegating {} pending tasks locally", reason, pending),
        )
        .await?;

        self.pause().await;
        let results = self.engine.delegate_pending(project_id).await?;
        let completed = results.iter().filter(|(_, r)| matches!(r, Ok(d) if d.success)).count();
        debug!("Fallback delegation for {}: {}/{} completed", project_id, completed, results.len());

        self.transition(
            project_id,
            Stage::Monitoring,
            Severity::Info,
            Some(ExecutionPath::Fallback),
            format!("Monitoring simulated run: {}/{} tasks completed", completed, results.len()),
        )
        .await?;

        self.pause().await;
        let increment = self.settings.progress_increment;
        let progress = self
            .projects
            .update(project_id, |project| {
                project.raise_progress(project.progress.saturating_add(increment));
                project.status = ProjectStatus::Active;
                project.progress
            })
            .await?;

        self.transition(
            project_id,
            Stage::Active,
            Severity::Success,
            Some(ExecutionPath::Fallback),
            format!("Orchestration active, simulated progress {}%", progress),
        )
        .await
    }

    async fn pause(&self) {
        if !self.settings.step_delay.is_zero() {
            tokio::time::sleep(self.settings.step_delay).await;
        }
    }

    async fn set_path(&self, project_id: &str, path: ExecutionPath) {
        if let Some(run) = self.runs.write().await.get_mut(project_id) {
            run.path = Some(path);
        }
    }

    /// Apply one legal transition and append its log entry
    async fn transition(
        &self,
        project_id: &str,
        to: Stage,
        severity: Severity,
        path: Option<ExecutionPath>,
        message: String,
    ) -> Result<()> {
        {
            let mut runs = self.runs.write().await;
            let run = runs
                .get_mut(project_id)
                .ok_or_else(|| CoordinatorError::Internal(format!("run for {} vanished", project_id)))?;
            if !run.stage.can_transition_to(to) {
                return Err(CoordinatorError::Internal(format!(
                    "illegal transition {} -> {} for {}",
                    run.stage, to, project_id
                )));
            }
            run.advance(to);
        }

        let mut entry = LogEntry::new(to, severity, message).for_project(project_id);
        if let Some(path) = path {
            entry = entry.on_path(path);
        }
        self.log.push(entry);
        Ok(())
    }

    /// Record a mid-run failure on the run
    async fn fail(&self, project_id: &str, error: &CoordinatorError) {
        let path = {
            let mut runs = self.runs.write().await;
            let Some(run) = runs.get_mut(project_id) else {
                return;
            };
            if run.stage != Stage::Error {
                run.advance(Stage::Error);
            }
            run.error = Some(error.to_string());
            run.path
        };

        if let Err(e) = self
            .projects
            .update(project_id, |project| project.status = ProjectStatus::Error)
            .await
        {
            debug!("Could not mark project {} as errored: {}", project_id, e);
        }

        let mut entry =
            LogEntry::new(Stage::Error, Severity::Error, format!("Orchestration failed: {}", error)).for_project(project_id);
        if let Some(path) = path {
            entry = entry.on_path(path);
        }
        self.log.push(entry);
    }
}
