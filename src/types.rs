//! Shared types used across modules
//!
//! This module contains types that are used by multiple modules
//! to avoid circular dependencies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Sender id used for messages generated by the coordinator itself
pub const SYSTEM_SENDER: &str = "system";

/// A single message routed between agents or posted in a conference
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub id: String,
    pub sender_id: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    /// Where the message came from, when it was not typed by a participant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provenance: Option<Provenance>,
}

impl Message {
    pub fn new(sender_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            sender_id: sender_id.into(),
            content: content.into(),
            timestamp: Utc::now(),
            provenance: None,
        }
    }

    /// A coordinator-generated message
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(SYSTEM_SENDER, content).with_provenance(Provenance::System)
    }

    pub fn with_provenance(mut self, provenance: Provenance) -> Self {
        self.provenance = Some(provenance);
        self
    }
}

/// Provenance tag attached to generated messages
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// Welcome and housekeeping notices
    System,
    /// Reply generated because the agent was mentioned
    MentionReply,
    /// The mentioned agent failed to reply
    MentionError,
}

/// Role of a conference participant
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Agent,
    System,
}
