//! # Agent Execution Unit
//!
//! The only component that talks to the generation backend on behalf of a
//! persona. Turns a task into a prompt, binds the agent's tools and returns
//! either the finished output or a live event stream.
//!
//! ```text
//! run_stream:  agent_start ─▶ agent_output* ─▶ handoff* ─▶ agent_done
//!                                    └─────────────────▶ agent_error
//! ```

use anyhow::{Context, Result};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use super::AgentPersona;
use crate::backend::{ChatMessage, GenerationBackend, GenerationChunk, GenerationRequest};
use crate::config::OrchestrationSettings;
use crate::orchestration::{AgentEvent, EventStream, TranscriptEntry};
use crate::skills::{
    ExecutionContext, HandoffIntent, IntegrationCatalog, NoIntegrations, PeerAgent,
    SkillCatalog, SkillRegistry, ToolSet,
};

/// Backend, catalogs and settings injected into every unit
#[derive(Clone)]
pub struct AgentServices {
    pub backend: Arc<dyn GenerationBackend>,
    pub skills: Arc<dyn SkillCatalog>,
    pub integrations: Arc<dyn IntegrationCatalog>,
    pub settings: OrchestrationSettings,
}

impl AgentServices {
    /// Services with the builtin skills and no integrations
    pub fn new(backend: Arc<dyn GenerationBackend>) -> Self {
        Self {
            backend,
            skills: Arc::new(SkillRegistry::with_builtins()),
            integrations: Arc::new(NoIntegrations),
            settings: OrchestrationSettings::default(),
        }
    }

    pub fn with_skills(mut self, skills: Arc<dyn SkillCatalog>) -> Self {
        self.skills = skills;
        self
    }

    pub fn with_integrations(mut self, integrations: Arc<dyn IntegrationCatalog>) -> Self {
        self.integrations = integrations;
        self
    }

    pub fn with_settings(mut self, settings: OrchestrationSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Create a unit for `persona`
    pub fn unit(&self, persona: AgentPersona, peers: Vec<PeerAgent>) -> AgentExecutionUnit {
        AgentExecutionUnit {
            persona,
            peers,
            services: self.clone(),
        }
    }

    /// One unit per persona, each seeing the others as handoff peers
    pub fn units_for(&self, agents: &[AgentPersona]) -> Vec<AgentExecutionUnit> {
        agents
            .iter()
            .map(|persona| {
                let peers = agents
                    .iter()
                    .filter(|other| other.id != persona.id)
                    .map(AgentPersona::as_peer)
                    .collect();
                self.unit(persona.clone(), peers)
            })
            .collect()
    }

    /// Tool-less backend call used for synthesis, judging and routing
    pub(crate) async fn complete(
        &self,
        system: &str,
        user: String,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<String> {
        let request = GenerationRequest::new(
            vec![ChatMessage::system(system), ChatMessage::user(user)],
            max_tokens,
            temperature,
        );
        Ok(self.backend.generate(request).await?.text)
    }
}

/// Caller identity for a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunContext {
    pub user_id: String,
    pub conversation_id: String,
}

impl RunContext {
    pub fn new(user_id: impl Into<String>, conversation_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            conversation_id: conversation_id.into(),
        }
    }
}

/// Result of one unit run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRun {
    pub output: String,
    pub duration_ms: u64,
    /// Handoff intents declared during the run
    pub handoffs: Vec<HandoffIntent>,
}

/// How well a persona's role fits a task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityScore {
    /// In `[0, 1]`
    pub score: f64,
    pub rationale: String,
}

/// One persona bound to the injected services
#[derive(Clone)]
pub struct AgentExecutionUnit {
    persona: AgentPersona,
    peers: Vec<PeerAgent>,
    services: AgentServices,
}

impl AgentExecutionUnit {
    pub fn id(&self) -> &str {
        &self.persona.id
    }

    pub fn name(&self) -> &str {
        &self.persona.name
    }

    pub fn persona(&self) -> &AgentPersona {
        &self.persona
    }

    pub fn peers(&self) -> &[PeerAgent] {
        &self.peers
    }

    /// Prompt for `task`: system prompt, optional context and history blocks, then the task
    pub fn build_messages(
        &self,
        task: &str,
        context: Option<&str>,
        history: &[TranscriptEntry],
    ) -> Vec<ChatMessage> {
        let mut messages = vec![ChatMessage::system(self.persona.system_prompt.as_str())];

        if let Some(context) = context.filter(|c| !c.is_empty()) {
            messages.push(ChatMessage::system(format!(
                "Context from previous agents/user:\n{}",
                context
            )));
        }

        if !history.is_empty() {
            let limit = self.services.settings.history_entry_chars;
            let lines: Vec<String> = history
                .iter()
                .map(|entry| {
                    let content: String = entry.content.chars().take(limit).collect();
                    format!("[{} ({})]: {}", entry.agent_name, entry.role.as_str(), content)
                })
                .collect();
            messages.push(ChatMessage::system(format!(
                "Conversation between agents so far:\n{}",
                lines.join("\n")
            )));
        }

        messages.push(ChatMessage::user(task));
        messages
    }

    /// Allowed skills, allowed active integrations and `handoff`
    pub async fn bind_tools(&self, ctx: &RunContext) -> ToolSet {
        let mut tools = ToolSet::new(ExecutionContext {
            user_id: ctx.user_id.clone(),
            conversation_id: ctx.conversation_id.clone(),
            agent_id: self.persona.id.clone(),
        });

        for descriptor in self.services.skills.skills() {
            if self.persona.allows_skill(&descriptor.id) {
                tools = tools.with_skill(descriptor, self.services.skills.clone());
            }
        }

        match self.services.integrations.active_tools(&ctx.user_id).await {
            Ok(active) => {
                for tool in active {
                    if self.persona.allows_integration(&tool.integration_id) {
                        tools = tools.with_integration(tool, self.services.integrations.clone());
                    }
                }
            }
            Err(e) => {
                tracing::warn!(
                    agent = %self.persona.id,
                    error = %e,
                    "Integration discovery failed, continuing without integrations"
                );
            }
        }

        if !self.peers.is_empty() {
            tools = tools.with_handoff(&self.peers);
        }

        tools
    }

    fn request(&self, messages: Vec<ChatMessage>, tools: ToolSet) -> GenerationRequest {
        let settings = &self.services.settings;
        GenerationRequest::new(
            messages,
            self.persona.max_tokens.unwrap_or(settings.default_max_tokens),
            self.persona.temperature.unwrap_or(settings.default_temperature),
        )
        .with_model(self.persona.model.clone())
        .with_tools(tools)
    }

    /// Run to completion
    #[tracing::instrument(
        skip(self, task, context, history, ctx),
        fields(agent = %self.persona.id)
    )]
    pub async fn run(
        &self,
        task: &str,
        context: Option<&str>,
        history: &[TranscriptEntry],
        ctx: &RunContext,
    ) -> Result<AgentRun> {
        let started = Instant::now();
        let messages = self.build_messages(task, context, history);
        let tools = self.bind_tools(ctx).await;
        let request = self.request(messages, tools.clone());

        let generation = self
            .services
            .backend
            .generate(request)
            .await
            .with_context(|| format!("Agent '{}' failed", self.persona.id))?;

        let duration_ms = elapsed_ms(started);
        tracing::debug!(duration_ms, steps = generation.step_count, "Agent finished");

        Ok(AgentRun {
            output: generation.text,
            duration_ms,
            handoffs: tools.handoffs(),
        })
    }

    /// Run as a live event stream
    pub fn run_stream(
        &self,
        task: String,
        context: Option<String>,
        history: Vec<TranscriptEntry>,
        ctx: RunContext,
    ) -> EventStream {
        let (tx, rx) = mpsc::channel(64);
        let unit = self.clone();

        tokio::spawn(async move {
            unit.drive_stream(task, context, history, ctx, tx).await;
        });

        Box::pin(ReceiverStream::new(rx))
    }

    async fn drive_stream(
        self,
        task: String,
        context: Option<String>,
        history: Vec<TranscriptEntry>,
        ctx: RunContext,
        tx: mpsc::Sender<AgentEvent>,
    ) {
        let started = Instant::now();
        let agent_id = self.persona.id.clone();
        let agent_name = self.persona.name.clone();

        let start = AgentEvent::AgentStart {
            agent_id: agent_id.clone(),
            agent_name: agent_name.clone(),
        };
        if tx.send(start).await.is_err() {
            return;
        }

        let messages = self.build_messages(&task, context.as_deref(), &history);
        let tools = self.bind_tools(&ctx).await;
        let request = self.request(messages, tools.clone());

        match self.forward_output(request, &tx).await {
            Ok(Some(output)) => {
                for intent in tools.handoffs() {
                    let handoff = AgentEvent::Handoff {
                        from_agent: Some(intent.from_agent),
                        to_agent: intent.to_agent,
                        reason: intent.reason,
                    };
                    if tx.send(handoff).await.is_err() {
                        return;
                    }
                }
                let _ = tx
                    .send(AgentEvent::AgentDone {
                        agent_id,
                        agent_name,
                        output,
                        duration_ms: elapsed_ms(started),
                    })
                    .await;
            }
            // Receiver dropped
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(agent = %agent_id, error = %e, "Agent stream failed");
                let _ = tx
                    .send(AgentEvent::agent_error(agent_id, agent_name, e.to_string()))
                    .await;
            }
        }
    }

    /// Forward text fragments as `agent_output`; returns the full text
    async fn forward_output(
        &self,
        request: GenerationRequest,
        tx: &mpsc::Sender<AgentEvent>,
    ) -> Result<Option<String>> {
        let mut stream = self.services.backend.stream(request).await?;
        let mut output = String::new();

        while let Some(chunk) = stream.next().await {
            match chunk? {
                GenerationChunk::Text(fragment) => {
                    output.push_str(&fragment);
                    let event = AgentEvent::AgentOutput {
                        agent_id: self.persona.id.clone(),
                        chunk: fragment,
                    };
                    if tx.send(event).await.is_err() {
                        return Ok(None);
                    }
                }
                GenerationChunk::Finished { .. } => break,
            }
        }

        Ok(Some(output))
    }

    /// Share of the persona's role keywords that appear in `task`
    pub fn can_handle(&self, task: &str) -> CapabilityScore {
        let role_words = keywords(&self.persona.role);
        if role_words.is_empty() {
            return CapabilityScore {
                score: 0.0,
                rationale: "Role has no keywords".to_string(),
            };
        }

        let task_words = keywords(task);
        let matched: Vec<&str> = role_words
            .iter()
            .filter(|word| task_words.contains(*word))
            .map(String::as_str)
            .collect();

        let score = matched.len() as f64 / role_words.len() as f64;
        let rationale = if matched.is_empty() {
            "No role keywords found in task".to_string()
        } else {
            format!("Matched role keywords: {}", matched.join(", "))
        };

        CapabilityScore { score, rationale }
    }
}

/// Lowercase alphanumeric words of at least three characters
fn keywords(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|word| word.chars().count() >= 3)
        .map(str::to_lowercase)
        .collect()
}

pub(crate) fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}
