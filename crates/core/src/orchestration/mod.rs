//! # Orchestration
//!
//! Team, swarm and router coordinators over [`crate::agents::AgentExecutionUnit`].
//!
//! ## Composition patterns
//!
//! - **Team** - agents collaborate across turns, sharing a transcript
//! - **Swarm** - agents work in parallel; outputs are aggregated
//! - **Router** - one best-fit agent per message
//!
//! Every coordinator validates its definition on construction, runs either to
//! completion or as an [`EventStream`], and reaches the backend only through
//! its units (plus tool-less synthesis, judging and routing calls).

mod aggregate;
pub mod definitions;
pub mod events;
pub mod extract;
pub mod presets;
pub mod router;
mod synthesis;
pub mod swarm;
pub mod team;
pub mod transcript;

pub use definitions::{Aggregation, RouterDefinition, SwarmDefinition, TeamDefinition, TeamStrategy};
pub use events::{AgentEvent, EventStream};
pub use presets::DefinitionSet;
pub use router::Router;
pub use swarm::SwarmCoordinator;
pub use team::TeamCoordinator;
pub use transcript::{
    AgentResult, MessageRole, RouteOutcome, RoutingDecision, SwarmOutcome, TeamOutcome,
    TranscriptEntry,
};
