//! Error taxonomy for the coordination layer

use thiserror::Error;

/// Coordinator error type
///
/// `Validation` and `NotFound` are reported to the immediate caller.
/// `Delivery` is usually captured into a task or message result rather than
/// propagated. `RemoteUnavailable` is consumed by the fallback paths.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CoordinatorError {
    /// Bad input (empty session name, empty participant list, ...)
    #[error("validation error: {0}")]
    Validation(String),

    /// Unknown project, task, session or agent id
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// A specific agent or service was unreachable or answered with an error
    #[error("delivery to {agent_id} failed: {reason}")]
    Delivery { agent_id: String, reason: String },

    /// Orchestration or session backing service unreachable
    #[error("remote service unavailable: {0}")]
    RemoteUnavailable(String),

    /// Id is neither registered nor allowlisted (strict mode only)
    #[error("unknown agent: {0}")]
    UnknownAgent(String),

    /// Unexpected failure mid-transition
    #[error("internal error: {0}")]
    Internal(String),
}

impl CoordinatorError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        CoordinatorError::NotFound { kind, id: id.into() }
    }

    pub fn delivery(agent_id: impl Into<String>, reason: impl Into<String>) -> Self {
        CoordinatorError::Delivery {
            agent_id: agent_id.into(),
            reason: reason.into(),
        }
    }

    /// Whether a fallback path should absorb this error
    pub fn is_remote_unavailable(&self) -> bool {
        matches!(self, CoordinatorError::RemoteUnavailable(_))
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, CoordinatorError>;
