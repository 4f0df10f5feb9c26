//! Projects and their tasks
//!
//! In-memory store. Tasks are created with their project and afterwards only
//! mutated by the delegation engine.

use crate::error::{CoordinatorError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Task execution status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Error,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Error)
    }
}

/// One unit of work assigned to an agent
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: String,
    pub name: String,
    pub description: String,
    /// Agent id
    pub assignee: String,
    pub status: TaskStatus,
    pub result: Option<serde_json::Value>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl Task {
    pub fn new(name: impl Into<String>, description: impl Into<String>, assignee: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            description: description.into(),
            assignee: assignee.into(),
            status: TaskStatus::Pending,
            result: None,
            started_at: None,
            completed_at: None,
            error: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }
}

/// Project status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    #[default]
    Planning,
    Active,
    Paused,
    Completed,
    Error,
}

impl ProjectStatus {
    pub fn from_str_lossy(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "planning" | "pending" | "idle" => Some(ProjectStatus::Planning),
            "active" | "running" | "in_progress" => Some(ProjectStatus::Active),
            "paused" => Some(ProjectStatus::Paused),
            "completed" | "done" => Some(ProjectStatus::Completed),
            "error" | "failed" => Some(ProjectStatus::Error),
            _ => None,
        }
    }
}

/// A project with its agents and ordered tasks
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub assigned_agents: BTreeSet<String>,
    pub tasks: Vec<Task>,
    /// 0-100
    pub progress: u8,
    pub status: ProjectStatus,
}

impl Project {
    pub fn task(&self, task_id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == task_id)
    }

    pub fn task_mut(&mut self, task_id: &str) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| t.id == task_id)
    }

    pub fn pending_task_ids(&self) -> Vec<String> {
        self.tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Pending)
            .map(|t| t.id.clone())
            .collect()
    }

    /// Raise progress, never lowering it, capped at 100
    pub fn raise_progress(&mut self, to: u8) {
        self.progress = self.progress.max(to.min(100));
    }
}

/// In-memory project store
#[derive(Default)]
pub struct ProjectStore {
    projects: RwLock<HashMap<String, Project>>,
}

impl ProjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a project; task assignees are added to the assigned agents
    pub async fn create(&self, name: &str, agents: &[&str], tasks: Vec<Task>) -> Result<Project> {
        if name.trim().is_empty() {
            return Err(CoordinatorError::Validation("project name must not be empty".into()));
        }

        let mut assigned_agents: BTreeSet<String> = agents.iter().map(|a| a.to_string()).collect();
        assigned_agents.extend(tasks.iter().map(|t| t.assignee.clone()));

        let project = Project {
            id: Uuid::new_v4().to_string(),
            name: name.trim().to_string(),
            assigned_agents,
            tasks,
            progress: 0,
            status: ProjectStatus::Planning,
        };
        self.insert(project.clone()).await;
        Ok(project)
    }

    /// Insert or replace a project
    pub async fn insert(&self, project: Project) {
        self.projects.write().await.insert(project.id.clone(), project);
    }

    pub async fn get(&self, project_id: &str) -> Result<Project> {
        self.projects
            .read()
            .await
            .get(project_id)
            .cloned()
            .ok_or_else(|| CoordinatorError::not_found("project", project_id))
    }

    pub async fn contains(&self, project_id: &str) -> bool {
        self.projects.read().await.contains_key(project_id)
    }

    pub async fn task(&self, project_id: &str, task_id: &str) -> Result<Task> {
        let project = self.get(project_id).await?;
        project
            .task(task_id)
            .cloned()
            .ok_or_else(|| CoordinatorError::not_found("task", task_id))
    }

    /// Projects sorted by name
    pub async fn list(&self) -> Vec<Project> {
        let mut list: Vec<_> = self.projects.read().await.values().cloned().collect();
        list.sort_by(|a, b| a.name.cmp(&b.name));
        list
    }

    /// Apply a mutation to one project under the write lock
    pub async fn update<F, R>(&self, project_id: &str, f: F) -> Result<R>
    where
        F: FnOnce(&mut Project) -> R,
    {
        let mut projects = self.projects.write().await;
        let project = projects
            .get_mut(project_id)
            .ok_or_else(|| CoordinatorError::not_found("project", project_id))?;
        Ok(f(project))
    }

    /// Apply a mutation to one task under the write lock
    pub async fn update_task<F, R>(&self, project_id: &str, task_id: &str, f: F) -> Result<R>
    where
        F: FnOnce(&mut Task) -> R,
    {
        let mut projects = self.projects.write().await;
        let project = projects
            .get_mut(project_id)
            .ok_or_else(|| CoordinatorError::not_found("project", project_id))?;
        let task = project
            .task_mut(task_id)
            .ok_or_else(|| CoordinatorError::not_found("task", task_id))?;
        Ok(f(task))
    }
}
