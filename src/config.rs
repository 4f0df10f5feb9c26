//! Configuration management
//!
//! Manages coordinator configuration: agent allowlists, remote collaborators,
//! timeouts, fallback pacing and circuit breaker thresholds.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Agent classification allowlists and discovery
    #[serde(default)]
    pub registry: RegistryConfig,
    /// Remote collaborators
    #[serde(default)]
    pub remote: RemoteConfig,
    /// Orchestration state machine pacing
    #[serde(default)]
    pub orchestration: OrchestrationConfig,
    /// Task delegation
    #[serde(default)]
    pub delegation: DelegationConfig,
    /// Conference sessions
    #[serde(default)]
    pub conference: ConferenceConfig,
    /// Circuit breaker for remote agent calls
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// External API-backed agents: id -> endpoint
    #[serde(default = "default_external_agents")]
    pub external_agents: BTreeMap<String, String>,
    /// Locally simulated personas
    #[serde(default = "default_local_personas")]
    pub local_personas: Vec<String>,
    /// Internal infrastructure services: id -> endpoint
    #[serde(default = "default_core_services")]
    pub core_services: BTreeMap<String, String>,
    /// Extra discovery endpoints returning agent records
    #[serde(default)]
    pub discovery_urls: Vec<String>,
    /// Reject ids that are neither registered nor allowlisted
    #[serde(default)]
    pub strict_unknown_agents: bool,
}

fn default_external_agents() -> BTreeMap<String, String> {
    let mut agents = BTreeMap::new();
    agents.insert("kimi-k2".to_string(), "http://127.0.0.1:5002/api/agents/kimi-k2".to_string());
    agents.insert("claude-code".to_string(), "http://127.0.0.1:5002/api/agents/claude-code".to_string());
    agents
}

fn default_local_personas() -> Vec<String> {
    vec!["alden".to_string(), "alice".to_string(), "mimic".to_string(), "sentry".to_string()]
}

fn default_core_services() -> BTreeMap<String, String> {
    let mut services = BTreeMap::new();
    services.insert("core".to_string(), "http://127.0.0.1:5000/api/core".to_string());
    services.insert("vault".to_string(), "http://127.0.0.1:5001/api/vault".to_string());
    services.insert("synapse".to_string(), "http://127.0.0.1:5004/api/synapse".to_string());
    services
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            external_agents: default_external_agents(),
            local_personas: default_local_personas(),
            core_services: default_core_services(),
            discovery_urls: vec![],
            strict_unknown_agents: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Remote orchestration endpoint; local simulation only when unset
    #[serde(default)]
    pub orchestration_url: Option<String>,
    /// Remote session persistence endpoint; in-memory only when unset
    #[serde(default)]
    pub session_url: Option<String>,
    /// Upper bound for every external call
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    10
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            orchestration_url: None,
            session_url: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl RemoteConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrationConfig {
    /// Synthetic delay between fallback stages
    #[serde(default = "default_step_delay_ms")]
    pub fallback_step_delay_ms: u64,
    /// Progress added by a fallback run
    #[serde(default = "default_progress_increment")]
    pub progress_increment: u8,
    /// Orchestration log capacity
    #[serde(default = "default_log_capacity")]
    pub log_capacity: usize,
}

fn default_step_delay_ms() -> u64 {
    800
}

fn default_progress_increment() -> u8 {
    15
}

fn default_log_capacity() -> usize {
    100
}

impl Default for OrchestrationConfig {
    fn default() -> Self {
        Self {
            fallback_step_delay_ms: default_step_delay_ms(),
            progress_increment: default_progress_increment(),
            log_capacity: default_log_capacity(),
        }
    }
}

impl OrchestrationConfig {
    pub fn step_delay(&self) -> Duration {
        Duration::from_millis(self.fallback_step_delay_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelegationConfig {
    /// Artificial latency of locally simulated handlers
    #[serde(default = "default_local_latency_ms")]
    pub local_latency_ms: u64,
}

fn default_local_latency_ms() -> u64 {
    1000
}

impl Default for DelegationConfig {
    fn default() -> Self {
        Self {
            local_latency_ms: default_local_latency_ms(),
        }
    }
}

impl DelegationConfig {
    pub fn local_latency(&self) -> Duration {
        Duration::from_millis(self.local_latency_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConferenceConfig {
    /// Messages kept per session; oldest are trimmed first
    #[serde(default = "default_max_history")]
    pub max_history: usize,
    /// Hours a new session lives before it expires
    #[serde(default = "default_expiry_hours")]
    pub expiry_hours: u32,
    /// Minutes without a posted message before a session counts as idle
    #[serde(default = "default_idle_timeout_minutes")]
    pub idle_timeout_minutes: u32,
}

fn default_max_history() -> usize {
    1000
}

fn default_expiry_hours() -> u32 {
    24
}

fn default_idle_timeout_minutes() -> u32 {
    120
}

impl Default for ConferenceConfig {
    fn default() -> Self {
        Self {
            max_history: default_max_history(),
            expiry_hours: default_expiry_hours(),
            idle_timeout_minutes: default_idle_timeout_minutes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the circuit opens
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// Seconds an open circuit waits before letting a probe through
    #[serde(default = "default_recovery_timeout")]
    pub recovery_timeout_secs: u64,
    /// Successful probes needed to close a half-open circuit
    #[serde(default = "default_success_threshold")]
    pub success_threshold: u32,
}

fn default_failure_threshold() -> u32 {
    3
}

fn default_recovery_timeout() -> u64 {
    30
}

fn default_success_threshold() -> u32 {
    2
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            recovery_timeout_secs: default_recovery_timeout(),
            success_threshold: default_success_threshold(),
        }
    }
}

impl CircuitBreakerConfig {
    pub fn recovery_timeout(&self) -> Duration {
        Duration::from_secs(self.recovery_timeout_secs)
    }
}

impl Config {
    /// Load configuration from the default path, writing defaults on first use
    pub fn load() -> Result<Self> {
        Self::load_from(&config_path()?)
    }

    /// Load configuration from a specific file, writing defaults if missing
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .context("Failed to read config file")?;
            Self::from_toml_str(&contents)
        } else {
            let config = Config::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents).context("Failed to parse config file")
    }

    /// Save configuration to the default path
    pub fn save(&self) -> Result<()> {
        self.save_to(&config_path()?)
    }

    /// Save configuration to a specific file
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let parent = path.parent()
            .context("Config path has no parent")?;

        std::fs::create_dir_all(parent)
            .context("Failed to create config directory")?;

        let contents = toml::to_string_pretty(self)
            .context("Failed to serialize config")?;

        std::fs::write(path, contents)
            .context("Failed to write config file")?;

        Ok(())
    }
}

/// Get the configuration file path
pub fn config_path() -> Result<PathBuf> {
    let base = directories::ProjectDirs::from("com", "agent-hub", "agent-hub")
        .context("Failed to get project directories")?;
    Ok(base.config_dir().join("config.toml"))
}

/// Show current configuration
pub fn show_config(config: &Config) {
    println!("Agent allowlists:");
    for (id, endpoint) in &config.registry.external_agents {
        println!("  {:<14} external  {}", id, endpoint);
    }
    for id in &config.registry.local_personas {
        println!("  {:<14} persona", id);
    }
    for (id, endpoint) in &config.registry.core_services {
        println!("  {:<14} core      {}", id, endpoint);
    }
    println!("\nRemote collaborators:");
    println!("  orchestration:   {}", config.remote.orchestration_url.as_deref().unwrap_or("(local simulation)"));
    println!("  sessions:        {}", config.remote.session_url.as_deref().unwrap_or("(in-memory)"));
    println!("  timeout:         {}s", config.remote.timeout_secs);
    println!("\nFallback pacing:   {}ms per stage, +{}% progress",
        config.orchestration.fallback_step_delay_ms,
        config.orchestration.progress_increment);
    println!("Conference:        {} messages kept, expire after {}h, idle after {}m",
        config.conference.max_history,
        config.conference.expiry_hours,
        config.conference.idle_timeout_minutes);
    println!("Circuit breaker:   open after {} failures, retry after {}s",
        config.circuit_breaker.failure_threshold,
        config.circuit_breaker.recovery_timeout_secs);
    println!("Strict unknown agents: {}", config.registry.strict_unknown_agents);
}

/// Get default configuration as TOML string
pub fn default_config_toml() -> String {
    let config = Config::default();
    toml::to_string_pretty(&config).unwrap_or_else(|_| "# Default configuration\n".to_string())
}
