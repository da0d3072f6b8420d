//! # Agents
//!
//! Personas, the execution unit that runs them, and the bundled persona
//! presets.

pub mod persona;
pub mod presets;
pub mod prompts;
pub mod unit;

pub use persona::AgentPersona;
pub use unit::{AgentExecutionUnit, AgentRun, AgentServices, CapabilityScore, RunContext};
