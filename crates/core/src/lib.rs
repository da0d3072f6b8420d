//! # Conclave Core
//!
//! Multi-agent orchestration over LLM-backed agents: teams that take turns,
//! swarms that work in parallel, and routers that pick one agent per message.
//!
//! ## Architecture
//!
//! - `agents/` - Personas and the execution unit that runs them
//! - `orchestration/` - Team, swarm and router coordinators, events, presets
//! - `backend/` - Generation backend contract and an OpenAI-compatible client
//! - `skills/` - Skill and integration catalogs, per-run tool binding
//! - `models` - Provider and model selection
//! - `config` - Orchestration tunables
//!
//! ## Usage
//!
//! ```rust,ignore
//! use conclave_core::agents::{AgentServices, RunContext};
//! use conclave_core::models::ModelConfig;
//! use conclave_core::orchestration::{DefinitionSet, TeamCoordinator};
//!
//! let services = AgentServices::new(ModelConfig::default().create_backend()?);
//! let team = DefinitionSet::builtin().team("research-brief")?.clone();
//! let coordinator = TeamCoordinator::new(team, services)?;
//! let outcome = coordinator
//!     .run("Summarise the state of WebAssembly", None, &RunContext::default())
//!     .await?;
//! ```

pub mod agents;
pub mod backend;
pub mod config;
pub mod error;
pub mod models;
pub mod orchestration;
pub mod skills;

#[cfg(test)]
pub(crate) mod testing;

pub use error::ConfigError;
