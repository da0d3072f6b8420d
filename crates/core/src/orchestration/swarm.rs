//! # Swarm Coordinator
//!
//! Fans one task out to every agent at once, isolates per-agent failures and
//! timeouts, then aggregates whatever succeeded.
//!
//! ```text
//!            ┌─▶ agent A ─┐
//! task ──────┼─▶ agent B ─┼──▶ gate (min completions) ──▶ aggregate
//!            └─▶ agent C ─┘
//!   each member runs on its own task and races the per-agent timeout
//! ```

use anyhow::Result;
use futures::future::join_all;
use futures::StreamExt;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use super::aggregate::{aggregate, needs_backend};
use super::events::{AgentEvent, EventStream, AGGREGATOR_AGENT};
use super::{AgentResult, Aggregation, SwarmDefinition, SwarmOutcome};
use crate::agents::unit::elapsed_ms;
use crate::agents::{AgentExecutionUnit, AgentServices, RunContext};
use crate::error::ConfigError;

const TIMEOUT_ERROR: &str = "Agent timeout";

/// Coordinates a swarm run
#[derive(Clone)]
pub struct SwarmCoordinator {
    definition: SwarmDefinition,
    services: AgentServices,
    units: Vec<AgentExecutionUnit>,
    event_tx: Option<mpsc::Sender<AgentEvent>>,
}

impl SwarmCoordinator {
    /// Validate `definition` and create one unit per agent
    pub fn new(definition: SwarmDefinition, services: AgentServices) -> Result<Self, ConfigError> {
        definition.validate()?;
        let units = services.units_for(&definition.agents);
        Ok(Self {
            definition,
            services,
            units,
            event_tx: None,
        })
    }

    /// Set event channel for lifecycle events of non-streaming runs
    pub fn with_event_channel(mut self, tx: mpsc::Sender<AgentEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    pub fn definition(&self) -> &SwarmDefinition {
        &self.definition
    }

    /// Per-agent timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(
            self.definition
                .timeout_ms
                .unwrap_or(self.services.settings.swarm_timeout_ms),
        )
    }

    fn synthesizer(&self) -> Option<&AgentExecutionUnit> {
        self.definition
            .synthesizer_id
            .as_deref()
            .and_then(|id| self.units.iter().find(|u| u.id() == id))
    }

    async fn emit(&self, event: AgentEvent) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(event).await;
        }
    }

    fn start_event(&self) -> AgentEvent {
        AgentEvent::SwarmStart {
            swarm_id: self.definition.id.clone(),
            swarm_name: self.definition.name.clone(),
            aggregation: self.definition.aggregation,
            agent_count: self.units.len(),
        }
    }

    /// Failure message when too few agents succeeded
    fn gate(&self, succeeded: usize) -> Option<String> {
        let required = self.definition.required_completions();
        (succeeded < required).then(|| {
            format!(
                "Only {}/{} agents completed successfully",
                succeeded, required
            )
        })
    }

    fn synthesis_start(&self, successes: usize) -> Option<AgentEvent> {
        let aggregation = self.definition.aggregation;
        needs_backend(aggregation, successes).then(|| AgentEvent::SynthesisStart {
            agent_id: match aggregation {
                Aggregation::Synthesize => self.synthesizer().map(|u| u.id().to_string()),
                _ => None,
            },
        })
    }

    async fn aggregate(
        &self,
        task: &str,
        results: &[AgentResult],
        ctx: &RunContext,
    ) -> Result<String> {
        let successes: Vec<&AgentResult> = results.iter().filter(|r| r.succeeded()).collect();
        aggregate(
            self.definition.aggregation,
            &self.services,
            self.synthesizer(),
            task,
            &successes,
            ctx,
        )
        .await
    }

    /// Run every agent concurrently and aggregate
    ///
    /// `overrides` maps agent ids to a replacement task.
    #[tracing::instrument(
        skip(self, overrides, ctx),
        fields(swarm = %self.definition.id, aggregation = %self.definition.aggregation)
    )]
    pub async fn run(
        &self,
        task: &str,
        overrides: &HashMap<String, String>,
        ctx: &RunContext,
    ) -> Result<SwarmOutcome> {
        let started = Instant::now();
        tracing::info!(agents = self.units.len(), "Swarm run started");
        self.emit(self.start_event()).await;

        let launches = self.units.iter().map(|unit| {
            let member_task = overrides
                .get(unit.id())
                .cloned()
                .unwrap_or_else(|| task.to_string());
            self.run_member(unit, member_task, ctx)
        });
        let results: Vec<AgentResult> = join_all(launches).await;

        let succeeded = results.iter().filter(|r| r.succeeded()).count();
        let (aggregated, final_output) = match self.gate(succeeded) {
            Some(message) => {
                tracing::warn!(succeeded, "Too few agents succeeded, skipping aggregation");
                (false, message)
            }
            None => {
                if let Some(event) = self.synthesis_start(succeeded) {
                    self.emit(event).await;
                }
                (true, self.aggregate(task, &results, ctx).await?)
            }
        };

        let duration_ms = elapsed_ms(started);
        self.emit(AgentEvent::Complete {
            output: final_output.clone(),
            duration_ms,
        })
        .await;
        tracing::info!(duration_ms, succeeded, "Swarm run finished");

        Ok(SwarmOutcome {
            swarm_id: self.definition.id.clone(),
            aggregation: self.definition.aggregation,
            results,
            succeeded,
            aggregated,
            final_output,
            duration_ms,
        })
    }

    /// One member on its own task, racing the timeout; never fails
    async fn run_member(
        &self,
        unit: &AgentExecutionUnit,
        task: String,
        ctx: &RunContext,
    ) -> AgentResult {
        let started = Instant::now();
        self.emit(AgentEvent::AgentStart {
            agent_id: unit.id().to_string(),
            agent_name: unit.name().to_string(),
        })
        .await;

        let member = unit.clone();
        let member_ctx = ctx.clone();
        let handle = tokio::spawn(async move { member.run(&task, None, &[], &member_ctx).await });

        // On timeout the handle is dropped; the task keeps running detached
        let outcome = match tokio::time::timeout(self.timeout(), handle).await {
            Ok(Ok(Ok(run))) => Ok(run),
            Ok(Ok(Err(e))) => Err(format!("{:#}", e)),
            Ok(Err(e)) => Err(format!("Agent task panicked: {}", e)),
            Err(_) => Err(TIMEOUT_ERROR.to_string()),
        };

        match outcome {
            Ok(run) => {
                for intent in &run.handoffs {
                    self.emit(AgentEvent::Handoff {
                        from_agent: Some(intent.from_agent.clone()),
                        to_agent: intent.to_agent.clone(),
                        reason: intent.reason.clone(),
                    })
                    .await;
                }
                self.emit(AgentEvent::AgentDone {
                    agent_id: unit.id().to_string(),
                    agent_name: unit.name().to_string(),
                    output: run.output.clone(),
                    duration_ms: run.duration_ms,
                })
                .await;

                AgentResult {
                    agent_id: unit.id().to_string(),
                    agent_name: unit.name().to_string(),
                    output: run.output,
                    duration_ms: run.duration_ms,
                    error: None,
                }
            }
            Err(error) => {
                tracing::warn!(agent = unit.id(), %error, "Swarm member failed");
                self.emit(AgentEvent::agent_error(unit.id(), unit.name(), error.as_str()))
                    .await;

                AgentResult {
                    agent_id: unit.id().to_string(),
                    agent_name: unit.name().to_string(),
                    output: String::new(),
                    duration_ms: elapsed_ms(started),
                    error: Some(error),
                }
            }
        }
    }

    /// Run as an event stream; events interleave in completion order
    pub fn run_stream(
        &self,
        task: String,
        overrides: HashMap<String, String>,
        ctx: RunContext,
    ) -> EventStream {
        let (tx, rx) = mpsc::channel(64);
        let coordinator = self.clone();

        tokio::spawn(async move {
            coordinator.drive_stream(task, overrides, ctx, tx).await;
        });

        Box::pin(ReceiverStream::new(rx))
    }

    async fn drive_stream(
        self,
        task: String,
        overrides: HashMap<String, String>,
        ctx: RunContext,
        tx: mpsc::Sender<AgentEvent>,
    ) {
        let started = Instant::now();
        tracing::info!(swarm = %self.definition.id, "Swarm stream started");

        if tx.send(self.start_event()).await.is_err() {
            return;
        }

        // Unbounded so a slow consumer never stalls a forwarder
        let (shared_tx, mut shared_rx) = mpsc::unbounded_channel::<(usize, AgentEvent)>();
        let deadline = tokio::time::Instant::now() + self.timeout();

        // One forwarder per member
        for (index, unit) in self.units.iter().enumerate() {
            let member_task = overrides
                .get(unit.id())
                .cloned()
                .unwrap_or_else(|| task.clone());
            let mut events = unit.run_stream(member_task, None, Vec::new(), ctx.clone());
            let shared = shared_tx.clone();
            let agent_id = unit.id().to_string();
            let agent_name = unit.name().to_string();

            // The deadline covers waiting on the member only
            tokio::spawn(async move {
                loop {
                    match tokio::time::timeout_at(deadline, events.next()).await {
                        Ok(Some(event)) => {
                            if shared.send((index, event)).is_err() {
                                return;
                            }
                        }
                        Ok(None) => return,
                        Err(_) => {
                            let timeout =
                                AgentEvent::agent_error(agent_id, agent_name, TIMEOUT_ERROR);
                            let _ = shared.send((index, timeout));
                            return;
                        }
                    }
                }
            });
        }
        drop(shared_tx);

        let mut slots: Vec<Option<AgentResult>> = vec![None; self.units.len()];

        while let Some((index, event)) = shared_rx.recv().await {
            if slots[index].is_none() {
                match &event {
                    AgentEvent::AgentDone {
                        agent_id,
                        agent_name,
                        output,
                        duration_ms,
                    } => {
                        slots[index] = Some(AgentResult {
                            agent_id: agent_id.clone(),
                            agent_name: agent_name.clone(),
                            output: output.clone(),
                            duration_ms: *duration_ms,
                            error: None,
                        });
                    }
                    AgentEvent::AgentError {
                        agent_id,
                        agent_name,
                        error,
                    } => {
                        tracing::warn!(agent = %agent_id, %error, "Swarm member failed");
                        slots[index] = Some(AgentResult {
                            agent_id: agent_id.clone(),
                            agent_name: agent_name.clone(),
                            output: String::new(),
                            duration_ms: elapsed_ms(started),
                            error: Some(error.clone()),
                        });
                    }
                    _ => {}
                }
            }

            if tx.send(event).await.is_err() {
                return;
            }
        }

        let results: Vec<AgentResult> = slots
            .into_iter()
            .zip(&self.units)
            .map(|(slot, unit)| {
                slot.unwrap_or_else(|| AgentResult {
                    agent_id: unit.id().to_string(),
                    agent_name: unit.name().to_string(),
                    output: String::new(),
                    duration_ms: elapsed_ms(started),
                    error: Some("Agent stream ended without a result".to_string()),
                })
            })
            .collect();

        let succeeded = results.iter().filter(|r| r.succeeded()).count();
        let output = match self.gate(succeeded) {
            Some(message) => message,
            None => {
                if let Some(event) = self.synthesis_start(succeeded) {
                    if tx.send(event).await.is_err() {
                        return;
                    }
                }
                match self.aggregate(&task, &results, &ctx).await {
                    Ok(output) => output,
                    Err(e) => {
                        tracing::warn!(
                            swarm = %self.definition.id,
                            error = %e,
                            "Swarm aggregation failed"
                        );
                        let error =
                            AgentEvent::agent_error(AGGREGATOR_AGENT, "Aggregator", e.to_string());
                        let _ = tx.send(error).await;
                        return;
                    }
                }
            }
        };

        let _ = tx
            .send(AgentEvent::Complete {
                output,
                duration_ms: elapsed_ms(started),
            })
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{agent_of, full_text, persona, services, user_turn, ScriptedBackend};
    use std::sync::Arc;

    fn swarm(aggregation: Aggregation, ids: &[&str]) -> SwarmDefinition {
        SwarmDefinition::new(
            "swarm",
            "Swarm",
            aggregation,
            ids.iter().map(|id| persona(id, "helper")).collect(),
        )
    }

    #[tokio::test]
    async fn test_gate_skips_aggregation() {
        let backend = Arc::new(ScriptedBackend::new(|req| match agent_of(req) {
            Some("a") => Ok("only me".to_string()),
            _ => anyhow::bail!("down"),
        }));
        let definition = swarm(Aggregation::Synthesize, &["a", "b", "c"]).with_min_completions(2);
        let coordinator = SwarmCoordinator::new(definition, services(&backend)).unwrap();

        let outcome = coordinator
            .run("task", &HashMap::new(), &RunContext::default())
            .await
            .unwrap();

        assert!(!outcome.aggregated);
        assert_eq!(outcome.succeeded, 1);
        assert_eq!(outcome.final_output, "Only 1/2 agents completed successfully");
        assert_eq!(backend.call_count(), 3);
        assert_eq!(outcome.results[1].error.as_deref().map(|e| e.contains("down")), Some(true));
    }

    #[tokio::test]
    async fn test_vote_across_members() {
        let backend = Arc::new(ScriptedBackend::new(|req| match agent_of(req) {
            Some("a") => Ok("Yes.".to_string()),
            Some("b") => Ok("yes.".to_string()),
            _ => Ok("No.".to_string()),
        }));
        let definition = swarm(Aggregation::Vote, &["a", "b", "c"]);
        let coordinator = SwarmCoordinator::new(definition, services(&backend)).unwrap();

        let outcome = coordinator
            .run("Is Rust fast?", &HashMap::new(), &RunContext::default())
            .await
            .unwrap();
        assert!(outcome.aggregated);
        assert_eq!(outcome.final_output, "Yes.\n\n(Consensus: 2/3 agents agreed)");
    }

    #[tokio::test(start_paused = true)]
    async fn test_overrides_and_launch_order() {
        let backend = Arc::new(
            ScriptedBackend::new(|req| {
                Ok(format!("{}:{}", agent_of(req).unwrap_or("?"), user_turn(req)))
            })
            .with_delay(|req| (agent_of(req) == Some("a")).then(|| Duration::from_millis(500))),
        );
        let definition = swarm(Aggregation::Concatenate, &["a", "b"]);
        let coordinator = SwarmCoordinator::new(definition, services(&backend)).unwrap();

        let overrides = HashMap::from([("b".to_string(), "special".to_string())]);
        let outcome = coordinator
            .run("common", &overrides, &RunContext::default())
            .await
            .unwrap();

        let ids: Vec<&str> = outcome.results.iter().map(|r| r.agent_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(outcome.results[0].output, "a:common");
        assert_eq!(outcome.results[1].output, "b:special");
        assert_eq!(outcome.final_output, "## A\n\na:common\n\n---\n\n## B\n\nb:special");
    }

    #[tokio::test(start_paused = true)]
    async fn test_member_timeout() {
        let backend = Arc::new(
            ScriptedBackend::new(|req| Ok(format!("{} answer", agent_of(req).unwrap_or("?"))))
                .with_delay(|req| (agent_of(req) == Some("slow")).then(|| Duration::from_secs(10))),
        );
        let definition = swarm(Aggregation::Concatenate, &["fast", "slow"]).with_timeout_ms(1_000);
        let coordinator = SwarmCoordinator::new(definition, services(&backend)).unwrap();

        let outcome = coordinator
            .run("task", &HashMap::new(), &RunContext::default())
            .await
            .unwrap();

        assert_eq!(outcome.succeeded, 1);
        assert_eq!(outcome.results[1].error.as_deref(), Some("Agent timeout"));
        assert_eq!(outcome.final_output, "fast answer");
    }

    #[tokio::test]
    async fn test_event_channel() {
        let backend = Arc::new(ScriptedBackend::fixed("same"));
        let (tx, mut rx) = mpsc::channel(64);
        let definition = swarm(Aggregation::Best, &["a", "b"]);
        let coordinator = SwarmCoordinator::new(definition, services(&backend))
            .unwrap()
            .with_event_channel(tx);

        coordinator
            .run("task", &HashMap::new(), &RunContext::default())
            .await
            .unwrap();
        drop(coordinator);

        let mut kinds = Vec::new();
        while let Some(event) = rx.recv().await {
            kinds.push(event.kind());
        }
        assert_eq!(kinds.first(), Some(&"swarm_start"));
        assert_eq!(kinds.iter().filter(|k| **k == "agent_done").count(), 2);
        assert_eq!(&kinds[kinds.len() - 2..], &["synthesis_start", "complete"]);
    }

    #[tokio::test]
    async fn test_stream_captures_results() {
        let backend = Arc::new(ScriptedBackend::new(|req| match agent_of(req) {
            Some("b") => anyhow::bail!("b is down"),
            Some(agent) => Ok(format!("{{\"{}\": true}}", agent)),
            None => Ok("unexpected".to_string()),
        }));
        let definition = swarm(Aggregation::Merge, &["a", "b", "c"]);
        let coordinator = SwarmCoordinator::new(definition, services(&backend)).unwrap();

        let events: Vec<AgentEvent> = coordinator
            .run_stream("task".into(), HashMap::new(), RunContext::default())
            .collect()
            .await;

        assert!(matches!(events[0], AgentEvent::SwarmStart { agent_count: 3, .. }));
        assert!(events
            .iter()
            .any(|e| matches!(e, AgentEvent::AgentError { agent_id, .. } if agent_id == "b")));
        match events.last().unwrap() {
            AgentEvent::Complete { output, .. } => {
                let merged: serde_json::Value = serde_json::from_str(output).unwrap();
                assert_eq!(merged, serde_json::json!({"a": true, "c": true}));
            }
            other => panic!("expected complete, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_timeout_emits_error() {
        let backend = Arc::new(
            ScriptedBackend::fixed("done")
                .with_delay(|req| (agent_of(req) == Some("slow")).then(|| Duration::from_secs(30))),
        );
        let definition = swarm(Aggregation::Concatenate, &["quick", "slow"]).with_timeout_ms(2_000);
        let coordinator = SwarmCoordinator::new(definition, services(&backend)).unwrap();

        let events: Vec<AgentEvent> = coordinator
            .run_stream("task".into(), HashMap::new(), RunContext::default())
            .collect()
            .await;

        assert!(events.iter().any(|e| matches!(
            e,
            AgentEvent::AgentError { agent_id, error, .. }
                if agent_id == "slow" && error == "Agent timeout"
        )));
        assert!(matches!(
            events.last(),
            Some(AgentEvent::Complete { output, .. }) if output == "done"
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_consumer_does_not_time_out_members() {
        let text = vec!["word"; 1000].join(" ");
        let backend = Arc::new(ScriptedBackend::fixed(&text));
        let definition = swarm(Aggregation::Concatenate, &["chatty"]).with_timeout_ms(1_000);
        let coordinator = SwarmCoordinator::new(definition, services(&backend)).unwrap();

        let mut events =
            coordinator.run_stream("task".into(), HashMap::new(), RunContext::default());
        let mut last = None;
        while let Some(event) = events.next().await {
            assert!(!matches!(event, AgentEvent::AgentError { .. }), "unexpected {:?}", event);
            tokio::time::sleep(Duration::from_millis(10)).await;
            last = Some(event);
        }

        match last {
            Some(AgentEvent::Complete { output, .. }) => assert_eq!(output, text),
            other => panic!("expected complete, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_interleaves_in_completion_order() {
        let backend = Arc::new(
            ScriptedBackend::new(|req| Ok(format!("{} one two", agent_of(req).unwrap_or("?"))))
                .with_delay(|req| {
                    (agent_of(req) == Some("slow")).then(|| Duration::from_millis(500))
                }),
        );
        let definition = swarm(Aggregation::Concatenate, &["slow", "fast"]);
        let coordinator = SwarmCoordinator::new(definition, services(&backend)).unwrap();

        let events: Vec<AgentEvent> = coordinator
            .run_stream("task".into(), HashMap::new(), RunContext::default())
            .collect()
            .await;

        let owners: Vec<&str> = events
            .iter()
            .filter(|e| matches!(e, AgentEvent::AgentOutput { .. } | AgentEvent::AgentDone { .. }))
            .filter_map(|e| e.agent_id())
            .collect();
        let last_fast = owners.iter().rposition(|id| *id == "fast").unwrap();
        let first_slow = owners.iter().position(|id| *id == "slow").unwrap();
        assert!(last_fast < first_slow, "fast agent should finish streaming first: {:?}", owners);

        // Results stay in launch order
        assert!(matches!(
            events.last(),
            Some(AgentEvent::Complete { output, .. })
                if output == "## Slow\n\nslow one two\n\n---\n\n## Fast\n\nfast one two"
        ));
    }

    #[tokio::test]
    async fn test_configured_synthesizer_aggregates() {
        let backend = Arc::new(ScriptedBackend::new(|req| match agent_of(req) {
            Some("editor") if user_turn(req).starts_with("Synthesize the conversation") => {
                Ok("edited".to_string())
            }
            Some(agent) => Ok(format!("{} draft", agent)),
            None => Ok("generic combine".to_string()),
        }));
        let definition =
            swarm(Aggregation::Synthesize, &["a", "b", "editor"]).with_synthesizer("editor");
        let coordinator = SwarmCoordinator::new(definition, services(&backend)).unwrap();

        let outcome = coordinator
            .run("task", &HashMap::new(), &RunContext::default())
            .await
            .unwrap();
        assert_eq!(outcome.final_output, "edited");

        let requests = backend.requests();
        assert_eq!(requests.len(), 4);
        assert!(requests.iter().all(|r| agent_of(r).is_some()));
        assert!(full_text(&requests[3]).contains("[A (agent)]: a draft"));
    }

    #[tokio::test]
    async fn test_stream_aggregation_failure() {
        let backend = Arc::new(ScriptedBackend::new(|req| match agent_of(req) {
            Some(agent) => Ok(agent.to_string()),
            None => anyhow::bail!("judge unavailable"),
        }));
        let definition = swarm(Aggregation::Best, &["a", "b"]);
        let coordinator = SwarmCoordinator::new(definition, services(&backend)).unwrap();

        let events: Vec<AgentEvent> = coordinator
            .run_stream("task".into(), HashMap::new(), RunContext::default())
            .collect()
            .await;

        assert!(matches!(&events[events.len() - 2], AgentEvent::SynthesisStart { .. }));
        assert!(matches!(
            events.last(),
            Some(AgentEvent::AgentError { agent_id, .. }) if agent_id == "aggregator"
        ));
    }
}
