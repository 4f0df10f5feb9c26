//! Agent descriptors and discovery records

use super::classify::Classification;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Agent status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    #[default]
    Active,
    Inactive,
    Learning,
    Monitoring,
}

impl AgentStatus {
    pub fn from_str_lossy(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "active" | "online" | "ready" => Some(AgentStatus::Active),
            "inactive" | "offline" | "disabled" => Some(AgentStatus::Inactive),
            "learning" | "training" => Some(AgentStatus::Learning),
            "monitoring" => Some(AgentStatus::Monitoring),
            _ => None,
        }
    }
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentStatus::Active => write!(f, "active"),
            AgentStatus::Inactive => write!(f, "inactive"),
            AgentStatus::Learning => write!(f, "learning"),
            AgentStatus::Monitoring => write!(f, "monitoring"),
        }
    }
}

/// Performance metrics, each 0-100
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PerformanceMetrics {
    pub efficiency: u8,
    pub accuracy: u8,
    pub responsiveness: u8,
}

impl PerformanceMetrics {
    /// Build from raw values, clamping each into 0-100
    pub fn clamped(efficiency: f64, accuracy: f64, responsiveness: f64) -> Self {
        Self {
            efficiency: clamp_percent(efficiency),
            accuracy: clamp_percent(accuracy),
            responsiveness: clamp_percent(responsiveness),
        }
    }
}

impl Default for PerformanceMetrics {
    fn default() -> Self {
        Self {
            efficiency: 80,
            accuracy: 80,
            responsiveness: 80,
        }
    }
}

/// Clamp an arbitrary number into a 0-100 percentage
pub fn clamp_percent(value: f64) -> u8 {
    if value.is_nan() {
        return 0;
    }
    value.round().clamp(0.0, 100.0) as u8
}

/// Source of truth for one agent
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentDescriptor {
    pub id: String,
    pub display_name: String,
    /// Fixed at first registration
    pub classification: Classification,
    pub status: AgentStatus,
    pub capabilities: BTreeSet<String>,
    pub metrics: PerformanceMetrics,
    pub load: u8,
    pub last_activity: DateTime<Utc>,
}

impl AgentDescriptor {
    /// First sighting of an agent
    pub fn from_record(record: &AgentRecord, classification: Classification) -> Self {
        let mut descriptor = Self {
            id: record.id.clone(),
            display_name: record.id.clone(),
            classification,
            status: AgentStatus::Active,
            capabilities: BTreeSet::new(),
            metrics: PerformanceMetrics::default(),
            load: 0,
            last_activity: Utc::now(),
        };
        descriptor.apply(record);
        descriptor
    }

    /// Overwrite mutable fields with a later sighting. Classification is untouched.
    pub fn apply(&mut self, record: &AgentRecord) {
        if let Some(name) = record.name.as_deref().filter(|n| !n.trim().is_empty()) {
            self.display_name = name.to_string();
        }
        if let Some(status) = record.status.as_deref().and_then(AgentStatus::from_str_lossy) {
            self.status = status;
        }
        if !record.capabilities.is_empty() {
            self.capabilities = record.capabilities.iter().cloned().collect();
        }
        if let Some(perf) = &record.performance {
            self.metrics = PerformanceMetrics::clamped(perf.efficiency, perf.accuracy, perf.responsiveness);
        }
        if let Some(load) = record.load {
            self.load = clamp_percent(load);
        }
        self.last_activity = Utc::now();
    }

    pub fn is_active(&self) -> bool {
        self.status == AgentStatus::Active
    }
}

/// Agent record as returned by a discovery source
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct AgentRecord {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub performance: Option<RecordMetrics>,
    #[serde(default)]
    pub load: Option<f64>,
}

impl AgentRecord {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: Some(name.into()),
            status: Some("active".to_string()),
            ..Default::default()
        }
    }

    pub fn with_status(mut self, status: &str) -> Self {
        self.status = Some(status.to_string());
        self
    }

    pub fn with_capabilities(mut self, capabilities: &[&str]) -> Self {
        self.capabilities = capabilities.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn with_performance(mut self, efficiency: f64, accuracy: f64, responsiveness: f64) -> Self {
        self.performance = Some(RecordMetrics { efficiency, accuracy, responsiveness });
        self
    }
}

/// Raw performance numbers on the wire
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct RecordMetrics {
    pub efficiency: f64,
    pub accuracy: f64,
    pub responsiveness: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_percent() {
        assert_eq!(clamp_percent(-5.0), 0);
        assert_eq!(clamp_percent(150.0), 100);
        assert_eq!(clamp_percent(42.4), 42);
        assert_eq!(clamp_percent(f64::NAN), 0);
    }

    #[test]
    fn test_apply_keeps_unset_fields() {
        let record = AgentRecord::new("alden", "Alden")
            .with_capabilities(&["memory", "planning"])
            .with_performance(90.0, 95.0, 120.0);
        let mut descriptor = AgentDescriptor::from_record(&record, Classification::LocalPersona);
        assert_eq!(descriptor.metrics.responsiveness, 100);

        let update = AgentRecord {
            id: "alden".to_string(),
            status: Some("learning".to_string()),
            ..Default::default()
        };
        descriptor.apply(&update);
        assert_eq!(descriptor.status, AgentStatus::Learning);
        assert_eq!(descriptor.display_name, "Alden");
        assert!(descriptor.capabilities.contains("planning"));
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!(AgentStatus::from_str_lossy("ONLINE"), Some(AgentStatus::Active));
        assert_eq!(AgentStatus::from_str_lossy("monitoring"), Some(AgentStatus::Monitoring));
        assert_eq!(AgentStatus::from_str_lossy("sleeping"), None);
    }
}
