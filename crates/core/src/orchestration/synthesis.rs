//! Combining several agents' outputs into one answer.

use anyhow::{Context, Result};

use super::TranscriptEntry;
use crate::agents::{AgentExecutionUnit, AgentServices, RunContext};

const COMBINE_SYSTEM: &str = "Combine the outputs of several agents \
into one coherent final answer. \
Keep every important point, resolve contradictions and remove repetition. \
Answer the original task directly; do not describe the agents.";

const SYNTHESIZER_TASK: &str =
    "Synthesize the conversation so far into one final answer to the original task.";

/// Whether [`synthesize`] will call the backend for these inputs
pub(crate) fn needs_backend(has_synthesizer: bool, entries: usize) -> bool {
    entries > 0 && (has_synthesizer || entries > 1)
}

/// Synthesizer agent if configured, else passthrough of a single entry,
/// else one tool-less combine call. Empty input yields an empty string.
pub(crate) async fn synthesize(
    services: &AgentServices,
    synthesizer: Option<&AgentExecutionUnit>,
    task: &str,
    entries: &[TranscriptEntry],
    ctx: &RunContext,
) -> Result<String> {
    if entries.is_empty() {
        return Ok(String::new());
    }

    if let Some(unit) = synthesizer {
        tracing::debug!(synthesizer = unit.id(), "Synthesizing with agent");
        let instruction = format!("{}\n\nOriginal task: {}", SYNTHESIZER_TASK, task);
        let run = unit.run(&instruction, None, entries, ctx).await?;
        return Ok(run.output);
    }

    if entries.len() == 1 {
        return Ok(entries[0].content.clone());
    }

    let blocks = entries
        .iter()
        .map(|entry| format!("**{}:**\n{}", entry.agent_name, entry.content))
        .collect::<Vec<_>>()
        .join("\n\n");

    let settings = &services.settings;
    services
        .complete(
            COMBINE_SYSTEM,
            format!("Original task: {}\n\n{}", task, blocks),
            settings.synthesis_max_tokens,
            settings.synthesis_temperature,
        )
        .await
        .context("Synthesis failed")
}
