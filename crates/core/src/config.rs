//! Numeric defaults shared by units and coordinators.

use serde::{Deserialize, Serialize};

/// Orchestration tunables; every field falls back to its default when omitted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestrationSettings {
    /// Agent max tokens when the persona sets none
    pub default_max_tokens: u32,
    /// Agent temperature when the persona sets none
    pub default_temperature: f32,
    /// Characters of each transcript entry replayed as history
    pub history_entry_chars: usize,
    pub synthesis_max_tokens: u32,
    pub synthesis_temperature: f32,
    pub routing_temperature: f32,
    pub routing_max_tokens: u32,
    /// Per-agent swarm timeout when the definition sets none
    pub swarm_timeout_ms: u64,
}

impl Default for OrchestrationSettings {
    fn default() -> Self {
        Self {
            default_max_tokens: 4096,
            default_temperature: 0.7,
            history_entry_chars: 2000,
            synthesis_max_tokens: 4096,
            synthesis_temperature: 0.5,
            routing_temperature: 0.0,
            routing_max_tokens: 256,
            swarm_timeout_ms: 60_000,
        }
    }
}
