//! CLI interface for agent-hub

use crate::config::{self, Config};
use crate::coordinator::Coordinator;
use crate::messaging::DeliveryOutcome;
use crate::orchestrator::Severity;
use crate::projects::Task;
use crate::types::Provenance;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "agent-hub")]
#[command(about = "Multi-agent coordination: routing, delegation, orchestration and conferences", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file (defaults to the platform config directory)
    #[arg(short, long, global = true, env = "AGENT_HUB_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List known agents and their classification
    Agents {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Send a message to one agent
    Send {
        /// Target agent id
        target: String,
        /// Message text
        message: String,
        /// Sender id
        #[arg(short, long, default_value = "user")]
        from: String,
    },
    /// Send a message to many agents at once
    Broadcast {
        /// Message text
        message: String,
        /// Target ids (defaults to every active agent)
        #[arg(short, long, value_delimiter = ',')]
        to: Option<Vec<String>>,
        /// Sender id
        #[arg(short, long, default_value = "user")]
        from: String,
    },
    /// Orchestrate a sample three-task project and print the log
    Demo {
        /// Skip artificial delays
        #[arg(long)]
        fast: bool,
    },
    /// Open a conference session and post messages to it
    Conference {
        /// Session name
        #[arg(short, long, default_value = "Team sync")]
        name: String,
        /// Participant ids
        #[arg(short = 'w', long = "with", value_delimiter = ',', default_value = "user")]
        participants: Vec<String>,
        /// Messages to post, in order (mention agents to get replies)
        #[arg(short, long)]
        message: Vec<String>,
    },
    /// Show or initialise the configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
        /// Print the config file path
        #[arg(long)]
        path: bool,
        /// Print the default configuration as TOML
        #[arg(long)]
        defaults: bool,
    },
}

/// Run the CLI
pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    match cli.command {
        Commands::Agents { json } => list_agents(&config, json).await?,
        Commands::Send { target, message, from } => {
            let coordinator = connect(&config).await?;
            let delivery = coordinator.router.send_message(&target, &message, &from).await?;
            println!("✓ Delivered to {} ({})", delivery.target_id, delivery.kind);
            println!("{}", delivery.response);
        }
        Commands::Broadcast { message, to, from } => {
            let coordinator = connect(&config).await?;
            let report = coordinator.broadcast.broadcast(&message, &from, to).await;
            for (target, outcome) in &report.results {
                match outcome {
                    DeliveryOutcome::Delivered { response } => println!("✓ {:<14} {}", target, response),
                    DeliveryOutcome::Failed { reason } => println!("✗ {:<14} {}", target, reason),
                }
            }
            println!("\n{}/{} delivered", report.succeeded(), report.total());
        }
        Commands::Demo { fast } => {
            let mut config = config;
            if fast {
                config.orchestration.fallback_step_delay_ms = 0;
                config.delegation.local_latency_ms = 0;
            }
            run_demo(&config).await?;
        }
        Commands::Conference { name, participants, message } => {
            run_conference(&config, &name, &participants, &message).await?;
        }
        Commands::Config { show, path, defaults } => {
            if path {
                let path = match &cli.config {
                    Some(path) => path.clone(),
                    None => config::config_path()?,
                };
                println!("{}", path.display());
            } else if defaults {
                print!("{}", config::default_config_toml());
            } else if show {
                config::show_config(&config);
            } else {
                println!("Configuration options:");
                println!("  --show       Display current configuration");
                println!("  --path       Print the config file location");
                println!("  --defaults   Print the default configuration");
            }
        }
    }

    Ok(())
}

async fn connect(config: &Config) -> Result<Coordinator> {
    let coordinator = Coordinator::from_config(config).context("Failed to set up coordinator")?;
    let summary = coordinator.refresh_agents().await;
    for source in &summary.failed_sources {
        eprintln!("⚠️  Discovery source unavailable: {}", source);
    }
    Ok(coordinator)
}

async fn list_agents(config: &Config, json: bool) -> Result<()> {
    let coordinator = connect(config).await?;
    let agents = coordinator.registry.list().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&agents)?);
        return Ok(());
    }

    println!("{:<14} {:<18} {:<11} {:>5} {:>5}  {}", "ID", "CLASSIFICATION", "STATUS", "EFF", "LOAD", "CAPABILITIES");
    for agent in agents {
        let capabilities: Vec<&str> = agent.capabilities.iter().map(|c| c.as_str()).collect();
        println!(
            "{:<14} {:<18} {:<11} {:>5} {:>5}  {}",
            agent.id,
            agent.classification.kind().to_string(),
            agent.status.to_string(),
            agent.metrics.efficiency,
            agent.load,
            capabilities.join(", ")
        );
    }
    Ok(())
}

async fn run_demo(config: &Config) -> Result<()> {
    let coordinator = connect(config).await?;
    let project = coordinator
        .projects
        .create(
            "Quarterly review",
            &[],
            vec![
                Task::new("Outline", "Draft the review outline and owners", "alden"),
                Task::new("Analyse metrics", "Summarise usage and latency trends", "kimi-k2"),
                Task::new("Archive", "Store the final report", "vault"),
            ],
        )
        .await?;

    println!("🚀 Orchestrating '{}' ({})", project.name, project.id);
    let run = coordinator.orchestration.start_orchestration(&project.id).await?;

    println!("\nLog:");
    for entry in coordinator.log.for_project(&project.id) {
        let marker = match entry.severity {
            Severity::Success => "✓",
            Severity::Error => "✗",
            Severity::Warning => "!",
            Severity::Info => "·",
        };
        println!("  {} {} {:<12} {}", entry.timestamp.format("%H:%M:%S"), marker, entry.stage.to_string(), entry.message);
    }

    let project = coordinator.projects.get(&project.id).await?;
    println!("\nTasks:");
    for task in &project.tasks {
        let detail = task.error.as_deref().unwrap_or("");
        println!("  {:<16} {:<12} {:?} {}", task.name, task.assignee, task.status, detail);
    }
    println!("\nRun ended {} with progress {}%", run.stage, project.progress);
    if let Some(error) = run.error {
        println!("Error: {}", error);
    }
    Ok(())
}

async fn run_conference(config: &Config, name: &str, participants: &[String], messages: &[String]) -> Result<()> {
    let coordinator = connect(config).await?;
    let ids: Vec<&str> = participants.iter().map(|p| p.as_str()).collect();
    let session = coordinator.conference.create(name, &ids).await?;

    for message in messages {
        coordinator.conference.post_message(&session.id, message, "user").await?;
    }

    let session = coordinator.conference.session(&session.id).await?;
    println!("💬 {} ({} participants)", session.name, session.participants.len());
    for message in &session.messages {
        let tag = match message.provenance {
            Some(Provenance::MentionError) => " [error]",
            Some(Provenance::MentionReply) => " [reply]",
            _ => "",
        };
        println!("  {}{}: {}", message.sender_id, tag, message.content);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_broadcast_targets() {
        let cli = Cli::try_parse_from(["agent-hub", "broadcast", "hello", "--to", "alden,vault"]).unwrap();
        match cli.command {
            Commands::Broadcast { to, from, .. } => {
                assert_eq!(to, Some(vec!["alden".to_string(), "vault".to_string()]));
                assert_eq!(from, "user");
            }
            _ => panic!("expected broadcast"),
        }
    }

    #[test]
    fn test_parse_conference_defaults() {
        let cli = Cli::try_parse_from(["agent-hub", "conference", "-m", "@alden hi"]).unwrap();
        match cli.command {
            Commands::Conference { name, participants, message } => {
                assert_eq!(name, "Team sync");
                assert_eq!(participants, vec!["user".to_string()]);
                assert_eq!(message, vec!["@alden hi".to_string()]);
            }
            _ => panic!("expected conference"),
        }
    }
}
