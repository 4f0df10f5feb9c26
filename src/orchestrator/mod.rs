//! Project orchestration
//!
//! Per-project state machine with remote-then-local fallback, and the bounded
//! log every transition and delegation outcome is written to.

pub mod log;
pub mod machine;
pub mod state;

pub use log::{ExecutionPath, LogEntry, OrchestrationLog, Severity, DEFAULT_LOG_CAPACITY};
pub use machine::{MachineSettings, OrchestrationStateMachine};
pub use state::{OrchestrationRun, Stage, StageTransition};
