//! # Definition Presets
//!
//! Built-in teams, swarms and routers, plus loading extra definitions from a
//! JSON file of the form `{"teams": [...], "swarms": [...], "routers": [...]}`.

use serde::{Deserialize, Serialize};
use std::path::Path;

use super::{Aggregation, RouterDefinition, SwarmDefinition, TeamDefinition, TeamStrategy};
use crate::agents::presets as personas;
use crate::agents::AgentPersona;
use crate::error::ConfigError;

/// A named collection of definitions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DefinitionSet {
    #[serde(default)]
    pub teams: Vec<TeamDefinition>,
    #[serde(default)]
    pub swarms: Vec<SwarmDefinition>,
    #[serde(default)]
    pub routers: Vec<RouterDefinition>,
}

impl DefinitionSet {
    /// The bundled presets
    pub fn builtin() -> Self {
        Self {
            teams: builtin_teams(),
            swarms: builtin_swarms(),
            routers: builtin_routers(),
        }
    }

    /// Load and validate a definitions file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let load_error = |reason: String| ConfigError::Load {
            path: path.display().to_string(),
            reason,
        };

        let data = std::fs::read_to_string(path).map_err(|e| load_error(e.to_string()))?;
        let set: DefinitionSet =
            serde_json::from_str(&data).map_err(|e| load_error(e.to_string()))?;
        set.validate()?;

        tracing::info!(
            path = %path.display(),
            teams = set.teams.len(),
            swarms = set.swarms.len(),
            routers = set.routers.len(),
            "Loaded definitions"
        );
        Ok(set)
    }

    /// Add `other`'s definitions; same ids replace existing ones
    pub fn merge(mut self, other: DefinitionSet) -> Self {
        fn upsert<T>(into: &mut Vec<T>, items: Vec<T>, id: impl Fn(&T) -> &str) {
            for item in items {
                match into.iter().position(|existing| id(existing) == id(&item)) {
                    Some(index) => into[index] = item,
                    None => into.push(item),
                }
            }
        }

        upsert(&mut self.teams, other.teams, |t| t.id.as_str());
        upsert(&mut self.swarms, other.swarms, |s| s.id.as_str());
        upsert(&mut self.routers, other.routers, |r| r.id.as_str());
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.teams.iter().try_for_each(TeamDefinition::validate)?;
        self.swarms.iter().try_for_each(SwarmDefinition::validate)?;
        self.routers.iter().try_for_each(RouterDefinition::validate)
    }

    pub fn team(&self, id: &str) -> Result<&TeamDefinition, ConfigError> {
        self.teams
            .iter()
            .find(|t| t.id == id)
            .ok_or_else(|| unknown("team", id))
    }

    pub fn swarm(&self, id: &str) -> Result<&SwarmDefinition, ConfigError> {
        self.swarms
            .iter()
            .find(|s| s.id == id)
            .ok_or_else(|| unknown("swarm", id))
    }

    pub fn router(&self, id: &str) -> Result<&RouterDefinition, ConfigError> {
        self.routers
            .iter()
            .find(|r| r.id == id)
            .ok_or_else(|| unknown("router", id))
    }
}

fn unknown(kind: &'static str, id: &str) -> ConfigError {
    ConfigError::UnknownPreset {
        kind,
        id: id.to_string(),
    }
}

/// Persona that answers with a single JSON object
fn json_only(persona: AgentPersona) -> AgentPersona {
    let prompt = format!(
        "{}\n\nAnswer with one JSON object only. Use short snake_case keys.",
        persona.system_prompt
    );
    AgentPersona {
        system_prompt: prompt,
        ..persona
    }
}

fn builtin_teams() -> Vec<TeamDefinition> {
    vec![
        TeamDefinition::new(
            "research-brief",
            "Research Brief",
            TeamStrategy::Sequential,
            vec![personas::researcher(), personas::analyst(), personas::writer()],
        )
        .with_description("Research a topic, analyse it, and write a brief."),
        TeamDefinition::new(
            "design-review",
            "Design Review",
            TeamStrategy::Debate,
            vec![personas::coder(), personas::critic(), personas::analyst()],
        )
        .with_description("Argue a technical design from several angles.")
        .with_synthesizer("analyst"),
        TeamDefinition::new(
            "brainstorm",
            "Brainstorm",
            TeamStrategy::RoundRobin,
            vec![personas::researcher(), personas::writer(), personas::critic()],
        )
        .with_description("Build ideas in turns, then summarise.")
        .with_max_rounds(2),
        TeamDefinition::new(
            "draft-pipeline",
            "Draft Pipeline",
            TeamStrategy::Chain,
            vec![personas::planner(), personas::researcher(), personas::writer()],
        )
        .with_description("Outline, fill in facts, then write the final draft."),
        TeamDefinition::new(
            "project-lead",
            "Project Lead",
            TeamStrategy::Supervisor,
            vec![
                personas::planner(),
                personas::researcher(),
                personas::coder(),
                personas::writer(),
            ],
        )
        .with_description("A planner splits the work and reviews the results.")
        .with_supervisor("planner"),
    ]
}

fn builtin_swarms() -> Vec<SwarmDefinition> {
    vec![
        SwarmDefinition::new(
            "panel",
            "Expert Panel",
            Aggregation::Synthesize,
            vec![personas::researcher(), personas::analyst(), personas::critic()],
        )
        .with_description("Independent expert answers merged into one."),
        SwarmDefinition::new(
            "quick-poll",
            "Quick Poll",
            Aggregation::Vote,
            vec![personas::analyst(), personas::critic(), personas::researcher()],
        )
        .with_description("Short answers; the majority wins.")
        .with_timeout_ms(30_000)
        .with_min_completions(2),
        SwarmDefinition::new(
            "judge",
            "Best Of",
            Aggregation::Best,
            vec![personas::coder(), personas::analyst(), personas::writer()],
        )
        .with_description("Several attempts; a judge keeps the best one."),
        SwarmDefinition::new(
            "facts",
            "Fact Sheet",
            Aggregation::Merge,
            vec![json_only(personas::researcher()), json_only(personas::analyst())],
        )
        .with_description("Structured facts from each agent merged into one JSON object."),
        SwarmDefinition::new(
            "digest",
            "Digest",
            Aggregation::Concatenate,
            vec![personas::researcher(), personas::analyst(), personas::critic()],
        )
        .with_description("Every perspective, one after another."),
    ]
}

fn builtin_routers() -> Vec<RouterDefinition> {
    let desk = || {
        vec![
            personas::writer(),
            personas::coder(),
            personas::analyst(),
            personas::researcher(),
        ]
    };

    vec![
        RouterDefinition::new("helpdesk", "Help Desk", "writer", desk())
            .with_description("Keyword routing to the best-fit agent."),
        RouterDefinition::new("smart-desk", "Smart Desk", "writer", desk())
            .with_description("Model-classified routing to the best-fit agent.")
            .with_ai_routing(true),
    ]
}
