//! Orchestration stages and runs

use super::log::ExecutionPath;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Transition history kept per run
pub const RUN_HISTORY_CAPACITY: usize = 100;

/// Orchestration stage
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    #[default]
    Idle,
    Initializing,
    Analyzing,
    Delegating,
    Monitoring,
    Active,
    Error,
}

impl Stage {
    /// A new run may start from here
    pub fn can_start(&self) -> bool {
        matches!(self, Stage::Idle | Stage::Active | Stage::Error)
    }

    /// A run is between Initializing and Monitoring
    pub fn is_in_flight(&self) -> bool {
        !self.can_start()
    }

    /// Legal single-step transitions
    pub fn can_transition_to(&self, next: Stage) -> bool {
        use Stage::*;
        match (self, next) {
            (Idle | Active | Error, Initializing) => true,
            (Initializing, Analyzing) => true,
            (Analyzing, Delegating) => true,
            (Delegating, Monitoring) => true,
            (Monitoring, Active) => true,
            // explicit caller retry only
            (Error, Idle) => true,
            (from, Error) => *from != Error,
            _ => false,
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Idle => "idle",
            Stage::Initializing => "initializing",
            Stage::Analyzing => "analyzing",
            Stage::Delegating => "delegating",
            Stage::Monitoring => "monitoring",
            Stage::Active => "active",
            Stage::Error => "error",
        };
        write!(f, "{}", name)
    }
}

/// One recorded transition
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StageTransition {
    pub from: Stage,
    pub to: Stage,
    pub at: DateTime<Utc>,
}

/// One orchestration run of a project
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrchestrationRun {
    pub project_id: String,
    pub stage: Stage,
    pub started_at: DateTime<Utc>,
    /// Path chosen after analysis, once known
    pub path: Option<ExecutionPath>,
    /// Message of the failure that moved the run to Error
    pub error: Option<String>,
    pub history: VecDeque<StageTransition>,
}

impl OrchestrationRun {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            stage: Stage::Idle,
            started_at: Utc::now(),
            path: None,
            error: None,
            history: VecDeque::new(),
        }
    }

    /// Record a stage change, keeping the bounded history
    pub(crate) fn advance(&mut self, to: Stage) {
        if self.history.len() >= RUN_HISTORY_CAPACITY {
            self.history.pop_front();
        }
        self.history.push_back(StageTransition {
            from: self.stage,
            to,
            at: Utc::now(),
        });
        self.stage = to;
    }

    pub fn is_fallback(&self) -> bool {
        self.path == Some(ExecutionPath::Fallback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_guards() {
        assert!(Stage::Idle.can_start());
        assert!(Stage::Active.can_start());
        assert!(Stage::Error.can_start());
        assert!(Stage::Analyzing.is_in_flight());
    }

    #[test]
    fn test_transition_table() {
        assert!(Stage::Initializing.can_transition_to(Stage::Analyzing));
        assert!(Stage::Monitoring.can_transition_to(Stage::Active));
        assert!(Stage::Delegating.can_transition_to(Stage::Error));
        assert!(Stage::Error.can_transition_to(Stage::Idle));
        assert!(!Stage::Active.can_transition_to(Stage::Idle));
        assert!(!Stage::Analyzing.can_transition_to(Stage::Active));
        assert!(!Stage::Error.can_transition_to(Stage::Error));
    }

    #[test]
    fn test_history_is_bounded() {
        let mut run = OrchestrationRun::new("p");
        for _ in 0..150 {
            run.advance(Stage::Initializing);
        }
        assert_eq!(run.history.len(), RUN_HISTORY_CAPACITY);
    }
}
