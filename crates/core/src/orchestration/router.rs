//! # Router
//!
//! Sends each message to exactly one agent, picked by keyword overlap or by
//! a tool-less classification call. Classification never fails: anything
//! unexpected falls back to the default agent.

use anyhow::Result;
use futures::StreamExt;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use super::events::{AgentEvent, EventStream};
use super::extract::extract_json_object;
use super::{RouteOutcome, RouterDefinition, RoutingDecision};
use crate::agents::unit::elapsed_ms;
use crate::agents::{AgentExecutionUnit, AgentServices, RunContext};
use crate::error::ConfigError;

const ROUTING_SYSTEM: &str = "Route the user's message to exactly one of the listed agents. \
Reply with strict JSON only, no prose: {\"agent_id\": \"<id>\", \"reason\": \"<short reason>\"}";

const AI_FALLBACK_REASON: &str = "AI routing fallback to default agent";

/// Routes messages to one agent each
#[derive(Clone)]
pub struct Router {
    definition: RouterDefinition,
    services: AgentServices,
    units: Vec<AgentExecutionUnit>,
}

impl Router {
    /// Validate `definition` and create one unit per agent
    pub fn new(definition: RouterDefinition, services: AgentServices) -> Result<Self, ConfigError> {
        definition.validate()?;
        let units = services.units_for(&definition.agents);
        Ok(Self {
            definition,
            services,
            units,
        })
    }

    pub fn definition(&self) -> &RouterDefinition {
        &self.definition
    }

    fn unit(&self, agent_id: &str) -> Option<&AgentExecutionUnit> {
        self.units.iter().find(|u| u.id() == agent_id)
    }

    fn default_unit(&self) -> &AgentExecutionUnit {
        self.unit(&self.definition.default_agent_id)
            .unwrap_or(&self.units[0])
    }

    /// Pick the agent for `message`
    #[tracing::instrument(
        skip(self, message),
        fields(router = %self.definition.id, ai = self.definition.uses_ai_routing())
    )]
    pub async fn classify(&self, message: &str) -> RoutingDecision {
        let decision = if self.definition.uses_ai_routing() {
            self.classify_with_model(message).await
        } else {
            self.classify_by_keywords(message)
        };
        tracing::debug!(agent = %decision.agent_id, reason = %decision.reason, "Message routed");
        decision
    }

    async fn classify_with_model(&self, message: &str) -> RoutingDecision {
        let fallback = || RoutingDecision {
            agent_id: self.default_unit().id().to_string(),
            reason: AI_FALLBACK_REASON.to_string(),
        };

        let candidates = self
            .units
            .iter()
            .map(|u| format!("- {}: {} ({})", u.id(), u.name(), u.persona().role))
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = format!(
            "Agents:\n{}\n\nDefault agent: {}\n\nMessage: {}",
            candidates,
            self.default_unit().id(),
            message
        );

        let settings = &self.services.settings;
        let reply = match self
            .services
            .complete(
                ROUTING_SYSTEM,
                prompt,
                settings.routing_max_tokens,
                settings.routing_temperature,
            )
            .await
        {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(error = %e, "Routing call failed, using default agent");
                return fallback();
            }
        };

        let Some(choice) = extract_json_object(&reply) else {
            tracing::warn!("Routing reply had no JSON object, using default agent");
            return fallback();
        };

        match choice.get("agent_id").and_then(|v| v.as_str()) {
            Some(agent_id) if self.unit(agent_id).is_some() => RoutingDecision {
                agent_id: agent_id.to_string(),
                reason: choice
                    .get("reason")
                    .and_then(|v| v.as_str())
                    .unwrap_or("Selected by AI routing")
                    .to_string(),
            },
            other => {
                tracing::warn!(
                    agent = ?other,
                    "Routing reply named no known agent, using default agent"
                );
                fallback()
            }
        }
    }

    fn classify_by_keywords(&self, message: &str) -> RoutingDecision {
        let mut best: Option<(&AgentExecutionUnit, f64)> = None;

        for unit in &self.units {
            let score = unit.can_handle(message).score;
            let beats = match best {
                Some((_, top)) => score > top,
                None => score > 0.0,
            };
            if beats {
                best = Some((unit, score));
            }
        }

        match best {
            Some((unit, score)) => RoutingDecision {
                agent_id: unit.id().to_string(),
                reason: format!("Best keyword match: {} (score: {:.2})", unit.name(), score),
            },
            None => {
                let unit = self.default_unit();
                RoutingDecision {
                    agent_id: unit.id().to_string(),
                    reason: format!("Default agent: {}", unit.name()),
                }
            }
        }
    }

    /// Classify and run the chosen agent
    pub async fn route(&self, message: &str, ctx: &RunContext) -> Result<RouteOutcome> {
        let started = Instant::now();
        let decision = self.classify(message).await;
        let unit = self.unit(&decision.agent_id).unwrap_or_else(|| self.default_unit());

        let run = unit.run(message, None, &[], ctx).await?;

        Ok(RouteOutcome {
            decision,
            output: run.output,
            duration_ms: elapsed_ms(started),
        })
    }

    /// Classify, emit one `handoff`, then forward the agent's stream
    pub fn route_stream(&self, message: String, ctx: RunContext) -> EventStream {
        let (tx, rx) = mpsc::channel(64);
        let router = self.clone();

        tokio::spawn(async move {
            let decision = router.classify(&message).await;
            let unit = router
                .unit(&decision.agent_id)
                .unwrap_or_else(|| router.default_unit());

            let handoff = AgentEvent::Handoff {
                from_agent: None,
                to_agent: decision.agent_id.clone(),
                reason: decision.reason,
            };
            if tx.send(handoff).await.is_err() {
                return;
            }

            let mut events = unit.run_stream(message, None, Vec::new(), ctx);
            while let Some(event) = events.next().await {
                if tx.send(event).await.is_err() {
                    return;
                }
            }
        });

        Box::pin(ReceiverStream::new(rx))
    }
}
