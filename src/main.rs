//! Agent Hub - multi-agent coordinator
//!
//! Routes tasks and messages to local personas, external agents and core
//! services, and drives project orchestration.

// Use the library crate for all modules
use agent_hub::cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging (WARN level by default, use RUST_LOG=info for debug)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into())
        )
        .init();

    // Run CLI
    cli::run().await
}
