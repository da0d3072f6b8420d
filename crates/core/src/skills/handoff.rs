//! The synthetic `handoff` tool bound to every agent that has peers.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::ToolSpec;

pub const HANDOFF_TOOL: &str = "handoff";

/// Arguments the model supplies when calling `handoff`
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct HandoffArgs {
    /// Id of the peer agent that should take over
    pub agent_id: String,
    /// Why that agent is better suited for the task
    pub reason: String,
}

/// A recorded request to pass work to another agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandoffIntent {
    pub from_agent: String,
    pub to_agent: String,
    pub reason: String,
}

/// Another agent in the same team, swarm or router
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerAgent {
    pub id: String,
    pub name: String,
    pub role: String,
}

/// Tool spec for `handoff`, with `agent_id` restricted to the peer ids
pub fn handoff_spec(peers: &[PeerAgent]) -> ToolSpec {
    let mut parameters = serde_json::to_value(schemars::schema_for!(HandoffArgs))
        .unwrap_or_else(|_| json!({ "type": "object" }));

    let ids: Vec<&str> = peers.iter().map(|p| p.id.as_str()).collect();
    if let Some(agent_id) = parameters
        .pointer_mut("/properties/agent_id")
        .and_then(|v| v.as_object_mut())
    {
        agent_id.insert("enum".to_string(), json!(ids));
    }

    let roster = peers
        .iter()
        .map(|p| format!("{} ({}: {})", p.id, p.name, p.role))
        .collect::<Vec<_>>()
        .join(", ");

    ToolSpec {
        name: HANDOFF_TOOL.to_string(),
        description: format!(
            "Hand this task to a better-suited agent. Available agents: {}",
            if roster.is_empty() { "none" } else { &roster }
        ),
        parameters,
    }
}
