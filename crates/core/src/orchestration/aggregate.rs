//! Swarm aggregation algorithms.

use anyhow::{Context, Result};
use serde_json::{Map, Value};

use super::synthesis::synthesize;
use super::{AgentResult, Aggregation, TranscriptEntry};
use crate::agents::{AgentExecutionUnit, AgentServices, RunContext};

const JUDGE_SYSTEM: &str = "Judge the candidate answers below and pick the single best one \
for the task. Name the winning option, then reproduce it in full, improved only where it is \
clearly wrong.";

/// Whether aggregating `successes` results will call the backend
pub(crate) fn needs_backend(aggregation: Aggregation, successes: usize) -> bool {
    successes > 1 && matches!(aggregation, Aggregation::Synthesize | Aggregation::Best)
}

/// Combine successful results; a single success is returned verbatim
pub(crate) async fn aggregate(
    aggregation: Aggregation,
    services: &AgentServices,
    synthesizer: Option<&AgentExecutionUnit>,
    task: &str,
    successes: &[&AgentResult],
    ctx: &RunContext,
) -> Result<String> {
    match successes {
        [] => return Ok(String::new()),
        [only] => return Ok(only.output.clone()),
        _ => {}
    }

    match aggregation {
        Aggregation::Concatenate => Ok(concatenate(successes)),
        Aggregation::Vote => Ok(vote(successes)),
        Aggregation::Synthesize => {
            let entries: Vec<TranscriptEntry> = successes
                .iter()
                .map(|r| {
                    TranscriptEntry::agent(
                        r.agent_id.as_str(),
                        r.agent_name.as_str(),
                        r.output.as_str(),
                    )
                })
                .collect();
            synthesize(services, synthesizer, task, &entries, ctx).await
        }
        Aggregation::Best => judge(services, task, successes).await,
        Aggregation::Merge => merge(successes),
    }
}

fn concatenate(successes: &[&AgentResult]) -> String {
    successes
        .iter()
        .map(|r| format!("## {}\n\n{}", r.agent_name, r.output))
        .collect::<Vec<_>>()
        .join("\n\n---\n\n")
}

/// Majority on trimmed lowercase output; the first ballot to reach the top count wins
fn vote(successes: &[&AgentResult]) -> String {
    // (ballot, count, first original output)
    let mut tallies: Vec<(String, usize, &str)> = Vec::new();
    let mut leader: Option<usize> = None;

    for result in successes {
        let ballot = result.output.trim().to_lowercase();
        let index = match tallies.iter().position(|(b, _, _)| *b == ballot) {
            Some(index) => index,
            None => {
                tallies.push((ballot, 0, result.output.as_str()));
                tallies.len() - 1
            }
        };
        tallies[index].1 += 1;

        let leads = match leader {
            Some(current) => tallies[index].1 > tallies[current].1,
            None => true,
        };
        if leads {
            leader = Some(index);
        }
    }

    match leader {
        Some(index) => {
            let (_, count, output) = &tallies[index];
            format!(
                "{}\n\n(Consensus: {}/{} agents agreed)",
                output,
                count,
                successes.len()
            )
        }
        None => String::new(),
    }
}

async fn judge(services: &AgentServices, task: &str, successes: &[&AgentResult]) -> Result<String> {
    let options = successes
        .iter()
        .enumerate()
        .map(|(i, r)| format!("Option {} ({}):\n{}", i + 1, r.agent_name, r.output))
        .collect::<Vec<_>>()
        .join("\n\n");

    let settings = &services.settings;
    services
        .complete(
            JUDGE_SYSTEM,
            format!("Task: {}\n\n{}", task, options),
            settings.synthesis_max_tokens,
            settings.synthesis_temperature,
        )
        .await
        .context("Judging failed")
}

/// Shallow merge of JSON objects in result order; anything else lands under the agent's name
fn merge(successes: &[&AgentResult]) -> Result<String> {
    let mut merged = Map::new();

    for result in successes {
        match serde_json::from_str::<Value>(result.output.trim()) {
            Ok(Value::Object(fields)) => merged.extend(fields),
            Ok(other) => {
                merged.insert(result.agent_name.clone(), other);
            }
            Err(_) => {
                merged.insert(result.agent_name.clone(), Value::String(result.output.clone()));
            }
        }
    }

    Ok(serde_json::to_string_pretty(&Value::Object(merged))?)
}
