//! # Configuration Errors
//!
//! Run paths use `anyhow`; definition problems are a closed set and get
//! their own type so callers can tell a bad preset from a failed backend call.

use thiserror::Error;

/// A team, swarm or router definition that cannot be run as written
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Definition has no agents
    #[error("{kind} '{id}' has no agents")]
    EmptyAgentList { kind: &'static str, id: String },

    /// Two personas share an id
    #[error("{kind} '{id}' lists agent '{agent_id}' more than once")]
    DuplicateAgentId {
        kind: &'static str,
        id: String,
        agent_id: String,
    },

    /// Supervisor, synthesizer or default agent is not in the roster
    #[error("{kind} '{id}': {field} '{agent_id}' is not one of its agents")]
    UnknownAgentReference {
        kind: &'static str,
        id: String,
        field: &'static str,
        agent_id: String,
    },

    /// No preset with that id
    #[error("no {kind} preset named '{id}'")]
    UnknownPreset { kind: &'static str, id: String },

    /// Definitions file could not be read or parsed
    #[error("failed to load definitions from {path}: {reason}")]
    Load { path: String, reason: String },
}
