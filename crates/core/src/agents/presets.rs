//! # Persona Presets
//!
//! Ready-made personas built from the bundled prompts. Role labels double as
//! keyword-routing vocabulary, so they list the words a matching request
//! would contain.

use super::prompts;
use super::AgentPersona;

/// The Researcher
///
/// Gathers and checks facts before anyone writes.
pub fn researcher() -> AgentPersona {
    AgentPersona::new(
        "researcher",
        "Researcher",
        "research facts sources evidence history",
        prompts::RESEARCHER,
    )
    .with_temperature(0.3)
}

/// The Coder
pub fn coder() -> AgentPersona {
    AgentPersona::new(
        "coder",
        "Coder",
        "code programming software bug debug function rust python javascript",
        prompts::CODER,
    )
    .with_temperature(0.2)
}

/// The Critic
///
/// Reviews work and argues the opposing side in debates.
pub fn critic() -> AgentPersona {
    AgentPersona::new(
        "critic",
        "Critic",
        "review critique risk security flaws quality",
        prompts::CRITIC,
    )
    .with_skills(vec![])
}

/// The Writer
pub fn writer() -> AgentPersona {
    AgentPersona::new(
        "writer",
        "Writer",
        "write writing draft essay email summary document",
        prompts::WRITER,
    )
}

/// The Analyst
pub fn analyst() -> AgentPersona {
    AgentPersona::new(
        "analyst",
        "Analyst",
        "analysis data numbers cost compare metrics estimate",
        prompts::ANALYST,
    )
    .with_temperature(0.2)
}

/// The Planner
///
/// Decomposes goals; the default supervisor.
pub fn planner() -> AgentPersona {
    AgentPersona::new(
        "planner",
        "Planner",
        "plan planning project schedule steps roadmap",
        prompts::PLANNER,
    )
    .with_temperature(0.3)
}

/// Every preset persona
pub fn all() -> Vec<AgentPersona> {
    vec![researcher(), coder(), critic(), writer(), analyst(), planner()]
}
