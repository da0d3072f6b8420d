//! # Agent Events
//!
//! Lifecycle and output events emitted by units and coordinators, both over
//! streams and over the optional event channel of non-streaming runs.

use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;

use super::definitions::{Aggregation, TeamStrategy};

/// Stream of events from a unit or coordinator
pub type EventStream = Pin<Box<dyn Stream<Item = AgentEvent> + Send>>;

/// Pseudo-agent id used when team synthesis fails in a stream
pub const SYNTHESIZER_AGENT: &str = "synthesizer";

/// Pseudo-agent id used when swarm aggregation fails in a stream
pub const AGGREGATOR_AGENT: &str = "aggregator";

/// An orchestration event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// Team run started
    TeamStart {
        team_id: String,
        team_name: String,
        strategy: TeamStrategy,
        agent_count: usize,
    },
    /// Swarm run started
    SwarmStart {
        swarm_id: String,
        swarm_name: String,
        aggregation: Aggregation,
        agent_count: usize,
    },
    /// Agent began working
    AgentStart { agent_id: String, agent_name: String },
    /// Fragment of agent output
    AgentOutput { agent_id: String, chunk: String },
    /// Agent finished
    AgentDone {
        agent_id: String,
        agent_name: String,
        output: String,
        duration_ms: u64,
    },
    /// Agent failed
    AgentError {
        agent_id: String,
        agent_name: String,
        error: String,
    },
    /// Work handed to another agent
    Handoff {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from_agent: Option<String>,
        to_agent: String,
        reason: String,
    },
    /// Team round started
    RoundStart { round: u32, max_rounds: u32 },
    /// Synthesis or aggregation call started
    SynthesisStart {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        agent_id: Option<String>,
    },
    /// Run finished
    Complete { output: String, duration_ms: u64 },
    /// Any tag this version does not know
    #[serde(other)]
    Unknown,
}

impl AgentEvent {
    /// The `type` tag, also used as the SSE event name
    pub fn kind(&self) -> &'static str {
        match self {
            AgentEvent::TeamStart { .. } => "team_start",
            AgentEvent::SwarmStart { .. } => "swarm_start",
            AgentEvent::AgentStart { .. } => "agent_start",
            AgentEvent::AgentOutput { .. } => "agent_output",
            AgentEvent::AgentDone { .. } => "agent_done",
            AgentEvent::AgentError { .. } => "agent_error",
            AgentEvent::Handoff { .. } => "handoff",
            AgentEvent::RoundStart { .. } => "round_start",
            AgentEvent::SynthesisStart { .. } => "synthesis_start",
            AgentEvent::Complete { .. } => "complete",
            AgentEvent::Unknown => "unknown",
        }
    }

    /// Agent the event belongs to, if any
    pub fn agent_id(&self) -> Option<&str> {
        match self {
            AgentEvent::AgentStart { agent_id, .. }
            | AgentEvent::AgentOutput { agent_id, .. }
            | AgentEvent::AgentDone { agent_id, .. }
            | AgentEvent::AgentError { agent_id, .. } => Some(agent_id),
            _ => None,
        }
    }

    pub fn agent_error(
        agent_id: impl Into<String>,
        agent_name: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        AgentEvent::AgentError {
            agent_id: agent_id.into(),
            agent_name: agent_name.into(),
            error: error.into(),
        }
    }
}
