//! Transcript entries and run outcomes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::definitions::{Aggregation, TeamStrategy};

/// Role tag of a transcript entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    Agent,
    User,
    System,
    Handoff,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::Agent => "agent",
            MessageRole::User => "user",
            MessageRole::System => "system",
            MessageRole::Handoff => "handoff",
        }
    }
}

/// One message in a run's transcript
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub agent_id: String,
    pub agent_name: String,
    pub role: MessageRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl TranscriptEntry {
    pub fn agent(
        agent_id: impl Into<String>,
        agent_name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            agent_name: agent_name.into(),
            role: MessageRole::Agent,
            content: content.into(),
            created_at: Utc::now(),
        }
    }

    pub fn with_role(mut self, role: MessageRole) -> Self {
        self.role = role;
        self
    }
}

/// Per-agent result of a swarm run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentResult {
    pub agent_id: String,
    pub agent_name: String,
    pub output: String,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AgentResult {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Result of a team run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamOutcome {
    pub team_id: String,
    pub strategy: TeamStrategy,
    pub transcript: Vec<TranscriptEntry>,
    pub final_output: String,
    pub duration_ms: u64,
}

/// Result of a swarm run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwarmOutcome {
    pub swarm_id: String,
    pub aggregation: Aggregation,
    /// One entry per agent, in launch order
    pub results: Vec<AgentResult>,
    pub succeeded: usize,
    /// False when too few agents succeeded to aggregate
    pub aggregated: bool,
    pub final_output: String,
    pub duration_ms: u64,
}

/// Which agent a router picked, and why
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub agent_id: String,
    pub reason: String,
}

/// Result of routing and running a message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteOutcome {
    pub decision: RoutingDecision,
    pub output: String,
    pub duration_ms: u64,
}
