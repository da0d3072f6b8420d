//! # Definitions
//!
//! Static team, swarm and router configuration. Definitions are plain serde
//! data; `validate()` checks the invariants every coordinator relies on.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use crate::agents::AgentPersona;
use crate::error::ConfigError;

/// How a team's agents take turns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TeamStrategy {
    Sequential,
    RoundRobin,
    Debate,
    Chain,
    Supervisor,
}

impl TeamStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            TeamStrategy::Sequential => "sequential",
            TeamStrategy::RoundRobin => "round-robin",
            TeamStrategy::Debate => "debate",
            TeamStrategy::Chain => "chain",
            TeamStrategy::Supervisor => "supervisor",
        }
    }

    /// Rounds used when the definition does not set `max_rounds`
    pub fn default_rounds(&self) -> u32 {
        match self {
            TeamStrategy::RoundRobin => 3,
            TeamStrategy::Debate => 2,
            TeamStrategy::Sequential | TeamStrategy::Chain | TeamStrategy::Supervisor => 1,
        }
    }
}

impl fmt::Display for TeamStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a swarm combines its agents' outputs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    Concatenate,
    Vote,
    Synthesize,
    Best,
    Merge,
}

impl Aggregation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Aggregation::Concatenate => "concatenate",
            Aggregation::Vote => "vote",
            Aggregation::Synthesize => "synthesize",
            Aggregation::Best => "best",
            Aggregation::Merge => "merge",
        }
    }
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A team of agents collaborating across turns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamDefinition {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub strategy: TeamStrategy,
    pub agents: Vec<AgentPersona>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supervisor_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_rounds: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synthesizer_id: Option<String>,
}

impl TeamDefinition {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        strategy: TeamStrategy,
        agents: Vec<AgentPersona>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            strategy,
            agents,
            supervisor_id: None,
            max_rounds: None,
            synthesizer_id: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_supervisor(mut self, agent_id: impl Into<String>) -> Self {
        self.supervisor_id = Some(agent_id.into());
        self
    }

    pub fn with_max_rounds(mut self, rounds: u32) -> Self {
        self.max_rounds = Some(rounds);
        self
    }

    pub fn with_synthesizer(mut self, agent_id: impl Into<String>) -> Self {
        self.synthesizer_id = Some(agent_id.into());
        self
    }

    /// Configured rounds, or the strategy default
    pub fn rounds(&self) -> u32 {
        self.max_rounds
            .unwrap_or_else(|| self.strategy.default_rounds())
            .max(1)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_roster("team", &self.id, &self.agents)?;
        check_reference(
            "team",
            &self.id,
            "supervisor_id",
            self.supervisor_id.as_deref(),
            &self.agents,
        )?;
        check_reference(
            "team",
            &self.id,
            "synthesizer_id",
            self.synthesizer_id.as_deref(),
            &self.agents,
        )
    }
}

/// A swarm of agents working the same task in parallel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwarmDefinition {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub agents: Vec<AgentPersona>,
    pub aggregation: Aggregation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synthesizer_id: Option<String>,
    /// Per-agent timeout in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_completions: Option<usize>,
}

impl SwarmDefinition {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        aggregation: Aggregation,
        agents: Vec<AgentPersona>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            agents,
            aggregation,
            synthesizer_id: None,
            timeout_ms: None,
            min_completions: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_synthesizer(mut self, agent_id: impl Into<String>) -> Self {
        self.synthesizer_id = Some(agent_id.into());
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn with_min_completions(mut self, min: usize) -> Self {
        self.min_completions = Some(min);
        self
    }

    /// Successes required before aggregating (default 1)
    pub fn required_completions(&self) -> usize {
        self.min_completions.unwrap_or(1)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_roster("swarm", &self.id, &self.agents)?;
        check_reference(
            "swarm",
            &self.id,
            "synthesizer_id",
            self.synthesizer_id.as_deref(),
            &self.agents,
        )
    }
}

/// A router that sends each message to one agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouterDefinition {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub agents: Vec<AgentPersona>,
    pub default_agent_id: String,
    /// LLM classification when true, keyword overlap otherwise
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_ai_routing: Option<bool>,
}

impl RouterDefinition {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        default_agent_id: impl Into<String>,
        agents: Vec<AgentPersona>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            agents,
            default_agent_id: default_agent_id.into(),
            use_ai_routing: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_ai_routing(mut self, enabled: bool) -> Self {
        self.use_ai_routing = Some(enabled);
        self
    }

    pub fn uses_ai_routing(&self) -> bool {
        self.use_ai_routing.unwrap_or(false)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_roster("router", &self.id, &self.agents)?;
        check_reference(
            "router",
            &self.id,
            "default_agent_id",
            Some(&self.default_agent_id),
            &self.agents,
        )
    }
}

fn validate_roster(
    kind: &'static str,
    id: &str,
    agents: &[AgentPersona],
) -> Result<(), ConfigError> {
    if agents.is_empty() {
        return Err(ConfigError::EmptyAgentList {
            kind,
            id: id.to_string(),
        });
    }

    let mut seen = HashSet::new();
    for agent in agents {
        if !seen.insert(agent.id.as_str()) {
            return Err(ConfigError::DuplicateAgentId {
                kind,
                id: id.to_string(),
                agent_id: agent.id.clone(),
            });
        }
    }
    Ok(())
}

fn check_reference(
    kind: &'static str,
    id: &str,
    field: &'static str,
    reference: Option<&str>,
    agents: &[AgentPersona],
) -> Result<(), ConfigError> {
    match reference {
        Some(agent_id) if !agents.iter().any(|a| a.id == agent_id) => {
            Err(ConfigError::UnknownAgentReference {
                kind,
                id: id.to_string(),
                field,
                agent_id: agent_id.to_string(),
            })
        }
        _ => Ok(()),
    }
}
