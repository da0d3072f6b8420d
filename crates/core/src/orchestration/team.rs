//! # Team Coordinator
//!
//! Runs a fixed roster of agents under one of five turn-taking strategies and
//! produces a transcript plus a final output.
//!
//! ```text
//! sequential   A ─▶ B ─▶ C            (context = previous output)   ─▶ synthesis
//! round-robin  (A B C) × rounds       (history = whole transcript)  ─▶ synthesis
//! debate       positions, rebuttals                                 ─▶ synthesis
//! chain        task ─▶ A ─▶ B ─▶ C    (output becomes next task)    ─▶ last output
//! supervisor   plan ─▶ workers (parallel) ─▶ supervisor review      ─▶ review output
//! ```

use anyhow::Result;
use futures::future::join_all;
use futures::StreamExt;
use serde::Deserialize;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use super::events::{AgentEvent, EventStream, SYNTHESIZER_AGENT};
use super::extract::extract_json_array;
use super::synthesis::{needs_backend, synthesize};
use super::{TeamDefinition, TeamOutcome, TeamStrategy, TranscriptEntry};
use crate::agents::unit::elapsed_ms;
use crate::agents::{AgentExecutionUnit, AgentRun, AgentServices, RunContext};
use crate::error::ConfigError;

/// One supervisor assignment as planned by the model
#[derive(Debug, Clone, Deserialize)]
struct Assignment {
    agent_id: String,
    subtask: String,
}

/// Coordinates a team run
#[derive(Clone)]
pub struct TeamCoordinator {
    definition: TeamDefinition,
    services: AgentServices,
    units: Vec<AgentExecutionUnit>,
    event_tx: Option<mpsc::Sender<AgentEvent>>,
}

impl TeamCoordinator {
    /// Validate `definition` and create one unit per agent
    pub fn new(definition: TeamDefinition, services: AgentServices) -> Result<Self, ConfigError> {
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

    pub fn definition(&self) -> &TeamDefinition {
        &self.definition
    }

    fn unit(&self, agent_id: &str) -> Option<&AgentExecutionUnit> {
        self.units.iter().find(|u| u.id() == agent_id)
    }

    fn synthesizer(&self) -> Option<&AgentExecutionUnit> {
        self.definition
            .synthesizer_id
            .as_deref()
            .and_then(|id| self.unit(id))
    }

    /// Configured supervisor, else the first agent
    fn supervisor(&self) -> &AgentExecutionUnit {
        self.definition
            .supervisor_id
            .as_deref()
            .and_then(|id| self.unit(id))
            .unwrap_or(&self.units[0])
    }

    /// Emit an event
    async fn emit(&self, event: AgentEvent) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(event).await;
        }
    }

    /// Run to completion
    #[tracing::instrument(
        skip(self, context, ctx),
        fields(
            team = %self.definition.id,
            strategy = %self.definition.strategy,
            task_preview = %task.chars().take(50).collect::<String>()
        )
    )]
    pub async fn run(
        &self,
        task: &str,
        context: Option<&str>,
        ctx: &RunContext,
    ) -> Result<TeamOutcome> {
        let started = Instant::now();
        tracing::info!(agents = self.units.len(), "Team run started");

        self.emit(AgentEvent::TeamStart {
            team_id: self.definition.id.clone(),
            team_name: self.definition.name.clone(),
            strategy: self.definition.strategy,
            agent_count: self.units.len(),
        })
        .await;

        let mut transcript = Vec::new();
        let final_output = match self.definition.strategy {
            TeamStrategy::Sequential => {
                self.run_sequential(task, context, ctx, &mut transcript).await?;
                self.synthesize(task, &transcript, ctx).await?
            }
            TeamStrategy::RoundRobin => {
                self.run_round_robin(task, context, ctx, &mut transcript).await?;
                self.synthesize(task, &transcript, ctx).await?
            }
            TeamStrategy::Debate => {
                self.run_debate(task, context, ctx, &mut transcript).await?;
                self.synthesize(task, &transcript, ctx).await?
            }
            TeamStrategy::Chain => self.run_chain(task, ctx, &mut transcript).await?,
            TeamStrategy::Supervisor => {
                self.run_supervisor(task, context, ctx, &mut transcript).await?
            }
        };

        let duration_ms = elapsed_ms(started);
        self.emit(AgentEvent::Complete {
            output: final_output.clone(),
            duration_ms,
        })
        .await;
        tracing::info!(duration_ms, entries = transcript.len(), "Team run finished");

        Ok(TeamOutcome {
            team_id: self.definition.id.clone(),
            strategy: self.definition.strategy,
            transcript,
            final_output,
            duration_ms,
        })
    }

    /// One agent invocation with lifecycle events
    async fn step(
        &self,
        unit: &AgentExecutionUnit,
        task: &str,
        context: Option<&str>,
        history: &[TranscriptEntry],
        ctx: &RunContext,
    ) -> Result<AgentRun> {
        tracing::debug!(agent = unit.id(), history = history.len(), "Agent step");
        self.emit(AgentEvent::AgentStart {
            agent_id: unit.id().to_string(),
            agent_name: unit.name().to_string(),
        })
        .await;

        let run = match unit.run(task, context, history, ctx).await {
            Ok(run) => run,
            Err(e) => {
                self.emit(AgentEvent::agent_error(unit.id(), unit.name(), e.to_string()))
                    .await;
                return Err(e);
            }
        };

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

        Ok(run)
    }

    async fn run_sequential(
        &self,
        task: &str,
        context: Option<&str>,
        ctx: &RunContext,
        transcript: &mut Vec<TranscriptEntry>,
    ) -> Result<()> {
        let mut previous = context.map(str::to_string);
        for unit in &self.units {
            let run = self
                .step(unit, task, previous.as_deref(), transcript, ctx)
                .await?;
            transcript.push(TranscriptEntry::agent(unit.id(), unit.name(), run.output.as_str()));
            previous = Some(run.output);
        }
        Ok(())
    }

    async fn run_round_robin(
        &self,
        task: &str,
        context: Option<&str>,
        ctx: &RunContext,
        transcript: &mut Vec<TranscriptEntry>,
    ) -> Result<()> {
        let max_rounds = self.definition.rounds();
        for round in 1..=max_rounds {
            self.emit(AgentEvent::RoundStart { round, max_rounds }).await;

            let round_task = if round == 1 {
                task.to_string()
            } else {
                format!(
                    "Continue the discussion (round {}/{}). \
                     Build on what the others said.\n\nOriginal task: {}",
                    round, max_rounds, task
                )
            };

            for unit in &self.units {
                let run = self.step(unit, &round_task, context, transcript, ctx).await?;
                transcript.push(TranscriptEntry::agent(unit.id(), unit.name(), run.output));
            }
        }
        Ok(())
    }

    async fn run_debate(
        &self,
        task: &str,
        context: Option<&str>,
        ctx: &RunContext,
        transcript: &mut Vec<TranscriptEntry>,
    ) -> Result<()> {
        let max_rounds = self.definition.rounds();

        self.emit(AgentEvent::RoundStart { round: 1, max_rounds }).await;
        let opening = format!(
            "State your initial position on the following, with supporting evidence.\n\nTopic: {}",
            task
        );
        for unit in &self.units {
            let run = self.step(unit, &opening, context, transcript, ctx).await?;
            transcript.push(TranscriptEntry::agent(unit.id(), unit.name(), run.output));
        }

        for round in 2..=max_rounds {
            self.emit(AgentEvent::RoundStart { round, max_rounds }).await;
            let rebuttal = format!(
                "Rebuttal round {}/{}. Respond to the other participants: \
                 challenge weak arguments, defend or revise your position with evidence.\n\nTopic: {}",
                round, max_rounds, task
            );
            for unit in &self.units {
                let run = self.step(unit, &rebuttal, context, transcript, ctx).await?;
                transcript.push(TranscriptEntry::agent(unit.id(), unit.name(), run.output));
            }
        }
        Ok(())
    }

    async fn run_chain(
        &self,
        task: &str,
        ctx: &RunContext,
        transcript: &mut Vec<TranscriptEntry>,
    ) -> Result<String> {
        let mut current = task.to_string();
        for unit in &self.units {
            let run = self.step(unit, &current, None, &[], ctx).await?;
            transcript.push(TranscriptEntry::agent(unit.id(), unit.name(), run.output.as_str()));
            current = run.output;
        }
        Ok(current)
    }

    async fn run_supervisor(
        &self,
        task: &str,
        context: Option<&str>,
        ctx: &RunContext,
        transcript: &mut Vec<TranscriptEntry>,
    ) -> Result<String> {
        let supervisor = self.supervisor();
        let workers: Vec<&AgentExecutionUnit> = self
            .units
            .iter()
            .filter(|u| u.id() != supervisor.id())
            .collect();

        let roster = workers
            .iter()
            .map(|w| format!("- {}: {} ({})", w.id(), w.name(), w.persona().role))
            .collect::<Vec<_>>()
            .join("\n");
        let plan_prompt = format!(
            "Break the following task into subtasks for your team.\n\n\
             Task: {}\n\nAvailable agents:\n{}\n\n\
             Respond with a JSON array only, one entry per assignment:\n\
             [{{\"agent_id\": \"...\", \"subtask\": \"...\"}}]",
            task, roster
        );

        let plan = self.step(supervisor, &plan_prompt, context, &[], ctx).await?;
        transcript.push(TranscriptEntry::agent(
            supervisor.id(),
            supervisor.name(),
            plan.output.as_str(),
        ));

        let mut assignments: Vec<(&AgentExecutionUnit, String)> = extract_json_array(&plan.output)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|item| serde_json::from_value::<Assignment>(item).ok())
            .filter_map(|a| {
                workers
                    .iter()
                    .find(|w| w.id() == a.agent_id)
                    .map(|w| (*w, a.subtask))
            })
            .collect();

        if assignments.is_empty() {
            tracing::warn!(
                supervisor = supervisor.id(),
                "No usable assignments in plan, giving every worker the whole task"
            );
            assignments = workers.iter().map(|w| (*w, task.to_string())).collect();
        }

        let runs = join_all(
            assignments
                .iter()
                .map(|(worker, subtask)| self.step(worker, subtask, context, &[], ctx)),
        )
        .await;

        for ((worker, subtask), run) in assignments.iter().zip(runs) {
            let run = run?;
            transcript.push(TranscriptEntry::agent(
                worker.id(),
                worker.name(),
                format!("[Subtask: {}]\n{}", subtask, run.output),
            ));
        }

        let review = format!(
            "Your team has finished. \
             Review their results and produce the final answer.\n\nOriginal task: {}",
            task
        );
        let run = self.step(supervisor, &review, context, transcript, ctx).await?;
        transcript.push(TranscriptEntry::agent(
            supervisor.id(),
            supervisor.name(),
            run.output.as_str(),
        ));
        Ok(run.output)
    }

    async fn synthesize(
        &self,
        task: &str,
        transcript: &[TranscriptEntry],
        ctx: &RunContext,
    ) -> Result<String> {
        let synthesizer = self.synthesizer();
        if needs_backend(synthesizer.is_some(), transcript.len()) {
            self.emit(AgentEvent::SynthesisStart {
                agent_id: synthesizer.map(|u| u.id().to_string()),
            })
            .await;
        }
        synthesize(&self.services, synthesizer, task, transcript, ctx).await
    }

    /// Run as an event stream; agents always take sequential turns
    pub fn run_stream(
        &self,
        task: String,
        context: Option<String>,
        ctx: RunContext,
    ) -> EventStream {
        let (tx, rx) = mpsc::channel(64);
        let coordinator = self.clone();

        tokio::spawn(async move {
            coordinator.drive_stream(task, context, ctx, tx).await;
        });

        Box::pin(ReceiverStream::new(rx))
    }

    async fn drive_stream(
        self,
        task: String,
        context: Option<String>,
        ctx: RunContext,
        tx: mpsc::Sender<AgentEvent>,
    ) {
        let started = Instant::now();
        tracing::info!(team = %self.definition.id, "Team stream started");

        let start = AgentEvent::TeamStart {
            team_id: self.definition.id.clone(),
            team_name: self.definition.name.clone(),
            strategy: self.definition.strategy,
            agent_count: self.units.len(),
        };
        if tx.send(start).await.is_err() {
            return;
        }

        let mut transcript: Vec<TranscriptEntry> = Vec::new();
        let mut previous = context;

        for unit in &self.units {
            let mut events =
                unit.run_stream(task.clone(), previous.clone(), transcript.clone(), ctx.clone());

            while let Some(event) = events.next().await {
                if let AgentEvent::AgentDone { output, .. } = &event {
                    transcript.push(TranscriptEntry::agent(
                        unit.id(),
                        unit.name(),
                        output.as_str(),
                    ));
                    previous = Some(output.clone());
                }
                if tx.send(event).await.is_err() {
                    return;
                }
            }
        }

        let synthesizer = self.synthesizer();
        if needs_backend(synthesizer.is_some(), transcript.len()) {
            let event = AgentEvent::SynthesisStart {
                agent_id: synthesizer.map(|u| u.id().to_string()),
            };
            if tx.send(event).await.is_err() {
                return;
            }
        }

        match synthesize(&self.services, synthesizer, &task, &transcript, &ctx).await {
            Ok(output) => {
                let _ = tx
                    .send(AgentEvent::Complete {
                        output,
                        duration_ms: elapsed_ms(started),
                    })
                    .await;
            }
            Err(e) => {
                tracing::warn!(team = %self.definition.id, error = %e, "Team synthesis failed");
                let _ = tx
                    .send(AgentEvent::agent_error(SYNTHESIZER_AGENT, "Synthesizer", e.to_string()))
                    .await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{agent_of, full_text, persona, services, user_turn, ScriptedBackend};
    use std::sync::Arc;

    fn team(strategy: TeamStrategy, ids: &[&str]) -> TeamDefinition {
        TeamDefinition::new(
            "team",
            "Team",
            strategy,
            ids.iter().map(|id| persona(id, "helper")).collect(),
        )
    }

    /// Replies `{agent}-{n}` where n counts that agent's calls; other calls get "SYNTH"
    fn counting_backend() -> Arc<ScriptedBackend> {
        let counts = std::sync::Mutex::new(std::collections::HashMap::<String, usize>::new());
        Arc::new(ScriptedBackend::new(move |req| match agent_of(req) {
            Some(agent) => {
                let mut counts = counts.lock().unwrap();
                let n = counts.entry(agent.to_string()).or_default();
                *n += 1;
                Ok(format!("{}-{}", agent, n))
            }
            None => Ok("SYNTH".to_string()),
        }))
    }

    fn context_of(request: &crate::backend::GenerationRequest) -> Option<String> {
        request
            .messages
            .iter()
            .find_map(|m| m.content.strip_prefix("Context from previous agents/user:\n"))
            .map(str::to_string)
    }

    #[test]
    fn test_invalid_definition_rejected() {
        let backend = counting_backend();
        let definition = team(TeamStrategy::Supervisor, &["a", "b"]).with_supervisor("ghost");
        assert!(TeamCoordinator::new(definition, services(&backend)).is_err());
    }

    #[tokio::test]
    async fn test_sequential_passes_previous_output() {
        let backend = counting_backend();
        let definition = team(TeamStrategy::Sequential, &["a", "b", "c"]);
        let coordinator = TeamCoordinator::new(definition, services(&backend)).unwrap();

        let outcome = coordinator
            .run("task", Some("caller ctx"), &RunContext::default())
            .await
            .unwrap();

        let requests = backend.requests();
        assert_eq!(requests.len(), 4);
        assert_eq!(context_of(&requests[0]).as_deref(), Some("caller ctx"));
        assert_eq!(context_of(&requests[1]).as_deref(), Some("a-1"));
        assert_eq!(context_of(&requests[2]).as_deref(), Some("b-1"));
        assert!(full_text(&requests[2]).contains("[A (agent)]: a-1"));

        assert_eq!(outcome.transcript.len(), 3);
        assert_eq!(outcome.final_output, "SYNTH");
    }

    #[tokio::test]
    async fn test_single_agent_passthrough() {
        let backend = counting_backend();
        let definition = team(TeamStrategy::Sequential, &["a"]);
        let coordinator = TeamCoordinator::new(definition, services(&backend)).unwrap();
        let outcome = coordinator.run("task", None, &RunContext::default()).await.unwrap();
        assert_eq!(outcome.final_output, "a-1");
        assert_eq!(backend.call_count(), 1);
    }

    #[tokio::test]
    async fn test_chain_returns_last_output_without_synthesis() {
        let backend = counting_backend();
        let definition = team(TeamStrategy::Chain, &["a", "b", "c"]);
        let coordinator = TeamCoordinator::new(definition, services(&backend)).unwrap();

        let outcome = coordinator
            .run("task", Some("ignored"), &RunContext::default())
            .await
            .unwrap();
        assert_eq!(outcome.final_output, "c-1");

        let requests = backend.requests();
        assert_eq!(requests.len(), 3);
        assert_eq!(user_turn(&requests[1]), "a-1");
        assert_eq!(user_turn(&requests[2]), "b-1");
        // Only system prompt and task
        assert!(requests.iter().all(|r| r.messages.len() == 2));
    }

    #[tokio::test]
    async fn test_round_robin_order() {
        let backend = counting_backend();
        let definition = team(TeamStrategy::RoundRobin, &["a", "b"]).with_max_rounds(3);
        let coordinator = TeamCoordinator::new(definition, services(&backend)).unwrap();

        let outcome = coordinator.run("task", None, &RunContext::default()).await.unwrap();

        let order: Vec<String> = backend
            .requests()
            .iter()
            .filter_map(|r| agent_of(r).map(str::to_string))
            .collect();
        assert_eq!(order, vec!["a", "b", "a", "b", "a", "b"]);
        assert_eq!(outcome.transcript.len(), 6);

        let requests = backend.requests();
        assert_eq!(user_turn(&requests[0]), "task");
        assert!(user_turn(&requests[2]).starts_with("Continue the discussion (round 2/3)"));
        assert!(user_turn(&requests[5]).contains("round 3/3"));
    }

    #[tokio::test]
    async fn test_debate_default_rounds() {
        let backend = counting_backend();
        let definition = team(TeamStrategy::Debate, &["pro", "con"]);
        let coordinator = TeamCoordinator::new(definition, services(&backend)).unwrap();

        let outcome = coordinator
            .run("tabs vs spaces", None, &RunContext::default())
            .await
            .unwrap();
        assert_eq!(outcome.transcript.len(), 4);

        let requests = backend.requests();
        assert!(user_turn(&requests[0]).starts_with("State your initial position"));
        assert!(user_turn(&requests[2]).starts_with("Rebuttal round 2/2"));
        assert!(full_text(&requests[3]).contains("[Pro (agent)]: pro-2"));
        assert_eq!(outcome.final_output, "SYNTH");
    }

    #[tokio::test]
    async fn test_agent_failure_propagates() {
        let backend = Arc::new(ScriptedBackend::new(|req| match agent_of(req) {
            Some("b") => anyhow::bail!("b is down"),
            _ => Ok("fine".to_string()),
        }));
        let definition = team(TeamStrategy::Sequential, &["a", "b", "c"]);
        let coordinator = TeamCoordinator::new(definition, services(&backend)).unwrap();

        let err = coordinator.run("task", None, &RunContext::default()).await.unwrap_err();
        assert_eq!(err.to_string(), "Agent 'b' failed");
        assert_eq!(backend.call_count(), 2);
    }

    #[tokio::test]
    async fn test_supervisor_plan_and_review() {
        let backend = Arc::new(ScriptedBackend::new(|req| {
            let task = user_turn(req);
            match agent_of(req) {
                Some("boss") if task.starts_with("Break the following") => Ok(
                    r#"Plan: [{"agent_id": "a", "subtask": "part one"}, {"agent_id": "ghost", "subtask": "x"}]"#
                        .to_string(),
                ),
                Some("boss") => Ok("final answer".to_string()),
                Some(agent) => Ok(format!("{} did {}", agent, task)),
                None => Ok("unexpected".to_string()),
            }
        }));
        let definition =
            team(TeamStrategy::Supervisor, &["a", "boss", "b"]).with_supervisor("boss");
        let coordinator = TeamCoordinator::new(definition, services(&backend)).unwrap();

        let outcome = coordinator.run("big task", None, &RunContext::default()).await.unwrap();
        assert_eq!(outcome.final_output, "final answer");

        let requests = backend.requests();
        assert_eq!(requests.len(), 3);
        assert!(full_text(&requests[0]).contains("- a: A (helper)"));
        assert!(!full_text(&requests[0]).contains("- boss"));
        assert_eq!(user_turn(&requests[1]), "part one");
        assert!(full_text(&requests[2]).contains("[Subtask: part one]\na did part one"));
    }

    #[tokio::test]
    async fn test_supervisor_fails_open() {
        let backend = Arc::new(ScriptedBackend::new(|req| {
            let task = user_turn(req).to_string();
            match agent_of(req) {
                Some("a") if task.starts_with("Break the following") => {
                    Ok("I refuse to plan".to_string())
                }
                Some("a") => Ok("merged".to_string()),
                Some(agent) => Ok(format!("{}:{}", agent, task)),
                None => Ok("unexpected".to_string()),
            }
        }));
        let definition = team(TeamStrategy::Supervisor, &["a", "b", "c"]);
        let coordinator = TeamCoordinator::new(definition, services(&backend)).unwrap();

        let outcome = coordinator.run("whole task", None, &RunContext::default()).await.unwrap();
        assert_eq!(outcome.final_output, "merged");

        let worker_tasks: Vec<String> = backend
            .requests()
            .iter()
            .filter(|r| matches!(agent_of(r), Some("b") | Some("c")))
            .map(|r| user_turn(r).to_string())
            .collect();
        assert_eq!(worker_tasks, vec!["whole task", "whole task"]);
        // plan, two workers, review
        assert_eq!(outcome.transcript.len(), 4);
    }

    #[tokio::test]
    async fn test_supervisor_worker_failure_propagates() {
        let backend = Arc::new(ScriptedBackend::new(|req| {
            let task = user_turn(req);
            match agent_of(req) {
                Some("boss") if task.starts_with("Break the following") => Ok(
                    r#"[{"agent_id": "a", "subtask": "one"}, {"agent_id": "b", "subtask": "two"}]"#
                        .to_string(),
                ),
                Some("b") => anyhow::bail!("b is down"),
                Some(agent) => Ok(format!("{} ok", agent)),
                None => Ok("unexpected".to_string()),
            }
        }));
        let definition =
            team(TeamStrategy::Supervisor, &["boss", "a", "b"]).with_supervisor("boss");
        let coordinator = TeamCoordinator::new(definition, services(&backend)).unwrap();

        let err = coordinator.run("task", None, &RunContext::default()).await.unwrap_err();
        assert_eq!(err.to_string(), "Agent 'b' failed");
        // No review after a failed worker
        assert!(!backend
            .requests()
            .iter()
            .any(|r| user_turn(r).starts_with("Your team has finished")));
    }

    #[tokio::test]
    async fn test_configured_synthesizer_runs_as_agent() {
        let backend = counting_backend();
        let definition = team(TeamStrategy::Sequential, &["a", "b"]).with_synthesizer("b");
        let coordinator = TeamCoordinator::new(definition, services(&backend)).unwrap();

        let outcome = coordinator.run("task", None, &RunContext::default()).await.unwrap();
        assert_eq!(outcome.final_output, "b-2");

        let requests = backend.requests();
        assert_eq!(requests.len(), 3);
        assert!(requests.iter().all(|r| agent_of(r).is_some()));
        assert!(user_turn(&requests[2]).starts_with("Synthesize the conversation so far"));
        assert!(full_text(&requests[2]).contains("[A (agent)]: a-1"));
    }

    #[tokio::test]
    async fn test_event_channel_receives_lifecycle() {
        let backend = counting_backend();
        let (tx, mut rx) = mpsc::channel(64);
        let definition = team(TeamStrategy::Sequential, &["a", "b"]);
        let coordinator = TeamCoordinator::new(definition, services(&backend))
            .unwrap()
            .with_event_channel(tx);

        coordinator.run("task", None, &RunContext::default()).await.unwrap();
        drop(coordinator);

        let mut kinds = Vec::new();
        while let Some(event) = rx.recv().await {
            kinds.push(event.kind());
        }
        assert_eq!(
            kinds,
            vec![
                "team_start",
                "agent_start",
                "agent_done",
                "agent_start",
                "agent_done",
                "synthesis_start",
                "complete"
            ]
        );
    }

    #[tokio::test]
    async fn test_stream_continues_after_agent_error() {
        let backend = Arc::new(ScriptedBackend::new(|req| match agent_of(req) {
            Some("b") => anyhow::bail!("b is down"),
            Some(agent) => Ok(format!("{} says hi", agent)),
            None => Ok("SYNTH".to_string()),
        }));
        let definition = team(TeamStrategy::Debate, &["a", "b", "c"]);
        let coordinator = TeamCoordinator::new(definition, services(&backend)).unwrap();

        let events: Vec<AgentEvent> = coordinator
            .run_stream("task".into(), None, RunContext::default())
            .collect()
            .await;

        assert!(matches!(events[0], AgentEvent::TeamStart { strategy: TeamStrategy::Debate, .. }));
        assert!(events
            .iter()
            .any(|e| matches!(e, AgentEvent::AgentError { agent_id, .. } if agent_id == "b")));
        assert!(matches!(events[events.len() - 2], AgentEvent::SynthesisStart { agent_id: None }));
        assert!(matches!(
            &events[events.len() - 1],
            AgentEvent::Complete { output, .. } if output == "SYNTH"
        ));

        // Sequential semantics: c sees a's output as context
        let c_request = backend
            .requests()
            .into_iter()
            .find(|r| agent_of(r) == Some("c"))
            .unwrap();
        assert_eq!(context_of(&c_request).as_deref(), Some("a says hi"));
    }

    #[tokio::test]
    async fn test_stream_synthesis_failure() {
        let backend = Arc::new(ScriptedBackend::new(|req| match agent_of(req) {
            Some(agent) => Ok(agent.to_string()),
            None => anyhow::bail!("synth down"),
        }));
        let definition = team(TeamStrategy::Sequential, &["a", "b"]);
        let coordinator = TeamCoordinator::new(definition, services(&backend)).unwrap();

        let events: Vec<AgentEvent> = coordinator
            .run_stream("task".into(), None, RunContext::default())
            .collect()
            .await;

        match events.last().unwrap() {
            AgentEvent::AgentError { agent_id, .. } => assert_eq!(agent_id, "synthesizer"),
            other => panic!("expected synthesizer error, got {:?}", other),
        }
        assert!(!events.iter().any(|e| matches!(e, AgentEvent::Complete { .. })));
    }

    #[tokio::test]
    async fn test_stream_all_failed_completes_empty() {
        let backend = Arc::new(ScriptedBackend::new(|_| anyhow::bail!("down")));
        let definition = team(TeamStrategy::Sequential, &["a", "b"]);
        let coordinator = TeamCoordinator::new(definition, services(&backend)).unwrap();

        let events: Vec<AgentEvent> = coordinator
            .run_stream("task".into(), None, RunContext::default())
            .collect()
            .await;
        assert!(matches!(
            &events[events.len() - 1],
            AgentEvent::Complete { output, .. } if output.is_empty()
        ));
        assert!(!events.iter().any(|e| matches!(e, AgentEvent::SynthesisStart { .. })));
    }
}
