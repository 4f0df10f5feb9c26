//! Agent Hub - multi-agent coordination library
//!
//! Coordination layer for a desktop multi-agent assistant:
//! - Agent registry with allowlist classification
//! - Task delegation to local personas, external agents and core services
//! - Per-project orchestration with remote-then-local fallback
//! - Point-to-point messaging and settle-independently broadcast
//! - Conference sessions with mention-triggered replies
//!
//! # Example
//!
//! ```ignore
//! use agent_hub::{Config, Coordinator};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let coordinator = Coordinator::from_config(&Config::load()?)?;
//!     coordinator.refresh_agents().await;
//!     let delivery = coordinator.router.send_message("alden", "Hello!", "user").await?;
//!     println!("{}", delivery.response);
//!     Ok(())
//! }
//! ```

// Core modules (order matters for cross-module dependencies)
pub mod types;
pub mod error;
pub mod config;
pub mod remote;
pub mod registry;
pub mod projects;
pub mod handlers;
pub mod cli;

// Feature modules
pub mod delegation;
pub mod orchestrator;
pub mod messaging;
pub mod conference;
pub mod coordinator;

// Re-export commonly used types for convenience
pub use config::Config;
pub use coordinator::{Collaborators, Coordinator};
pub use error::{CoordinatorError, Result};

pub use registry::{AgentDescriptor, AgentRegistry, Classification};
pub use projects::{Project, ProjectStore, Task, TaskStatus};
pub use delegation::{DelegationEngine, DelegationResult};
pub use orchestrator::{OrchestrationLog, OrchestrationRun, OrchestrationStateMachine, Stage};
pub use messaging::{BroadcastCoordinator, BroadcastReport, MessagingRouter};
pub use conference::{ConferenceManager, ConferenceSession};
pub use types::Message;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Get the library info
pub fn info() -> String {
    format!("{} v{} - Multi-agent coordination library", NAME, VERSION)
}
