//! # Skills and Integrations
//!
//! Contracts for the two tool sources an agent can draw from, plus the
//! per-run [`ToolSet`] handed to the generation backend.
//!
//! ## Architecture
//!
//! ```text
//! AgentExecutionUnit
//!   └── ToolSet (bound per run)
//!         ├── SkillCatalog       (allow-listed skills)
//!         ├── IntegrationCatalog (active per-user tools, allow-listed)
//!         └── handoff            (records intent, never re-routes)
//! ```
//!
//! Catalogs are injected through [`crate::agents::AgentServices`]; nothing in
//! this module is global.

pub mod builtin;
pub mod handoff;

pub use builtin::CurrentTimeSkill;
pub use handoff::{handoff_spec, HandoffArgs, HandoffIntent, PeerAgent, HANDOFF_TOOL};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::{Arc, Mutex};

/// Tool description as the model sees it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON schema of the arguments
    pub parameters: Value,
}

/// Catalog entry of a skill
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillDescriptor {
    pub id: String,
    pub description: String,
    pub parameters: Value,
}

impl From<SkillDescriptor> for ToolSpec {
    fn from(descriptor: SkillDescriptor) -> Self {
        Self {
            name: descriptor.id,
            description: descriptor.description,
            parameters: descriptor.parameters,
        }
    }
}

/// Result of executing a skill or integration tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillOutcome {
    pub success: bool,
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl SkillOutcome {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            data: None,
        }
    }

    pub fn failed(output: impl Into<String>) -> Self {
        Self {
            success: false,
            output: output.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// Who is calling a tool
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionContext {
    pub user_id: String,
    pub conversation_id: String,
    pub agent_id: String,
}

/// A single executable skill
#[async_trait]
pub trait Skill: Send + Sync {
    fn descriptor(&self) -> SkillDescriptor;

    async fn execute(&self, args: Value, context: &ExecutionContext) -> Result<SkillOutcome>;
}

/// Source of skills available to agents
#[async_trait]
pub trait SkillCatalog: Send + Sync {
    fn skills(&self) -> Vec<SkillDescriptor>;

    async fn execute(
        &self,
        id: &str,
        args: Value,
        context: &ExecutionContext,
    ) -> Result<SkillOutcome>;
}

/// In-memory skill catalog
#[derive(Clone, Default)]
pub struct SkillRegistry {
    skills: Vec<Arc<dyn Skill>>,
}

impl SkillRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the builtin skills
    pub fn with_builtins() -> Self {
        Self::new().register(CurrentTimeSkill)
    }

    pub fn register(mut self, skill: impl Skill + 'static) -> Self {
        self.skills.push(Arc::new(skill));
        self
    }

    pub fn len(&self) -> usize {
        self.skills.len()
    }

    pub fn is_empty(&self) -> bool {
        self.skills.is_empty()
    }
}

#[async_trait]
impl SkillCatalog for SkillRegistry {
    fn skills(&self) -> Vec<SkillDescriptor> {
        self.skills.iter().map(|s| s.descriptor()).collect()
    }

    async fn execute(
        &self,
        id: &str,
        args: Value,
        context: &ExecutionContext,
    ) -> Result<SkillOutcome> {
        let skill = self
            .skills
            .iter()
            .find(|s| s.descriptor().id == id)
            .ok_or_else(|| anyhow!("Unknown skill: {}", id))?;
        skill.execute(args, context).await
    }
}

/// Tool exposed by a connected third-party integration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrationTool {
    pub integration_id: String,
    pub spec: ToolSpec,
}

/// Source of per-user integration tools
#[async_trait]
pub trait IntegrationCatalog: Send + Sync {
    async fn active_tools(&self, user_id: &str) -> Result<Vec<IntegrationTool>>;

    async fn execute(
        &self,
        tool: &str,
        args: Value,
        context: &ExecutionContext,
    ) -> Result<SkillOutcome>;
}

/// Integration catalog with nothing connected
#[derive(Debug, Clone, Copy, Default)]
pub struct NoIntegrations;

#[async_trait]
impl IntegrationCatalog for NoIntegrations {
    async fn active_tools(&self, _user_id: &str) -> Result<Vec<IntegrationTool>> {
        Ok(Vec::new())
    }

    async fn execute(
        &self,
        tool: &str,
        _args: Value,
        _context: &ExecutionContext,
    ) -> Result<SkillOutcome> {
        bail!("No integration provides tool '{}'", tool)
    }
}

#[derive(Clone)]
enum ToolRoute {
    Skill(Arc<dyn SkillCatalog>),
    Integration(Arc<dyn IntegrationCatalog>),
    Handoff(Vec<String>),
}

#[derive(Clone)]
struct BoundTool {
    spec: ToolSpec,
    route: ToolRoute,
}

/// Tools bound to one agent run
///
/// Cloning shares the handoff log, so the copy inside a
/// [`crate::backend::GenerationRequest`] records into the same run.
#[derive(Clone, Default)]
pub struct ToolSet {
    tools: Vec<BoundTool>,
    context: ExecutionContext,
    handoffs: Arc<Mutex<Vec<HandoffIntent>>>,
}

impl ToolSet {
    pub fn new(context: ExecutionContext) -> Self {
        Self {
            tools: Vec::new(),
            context,
            handoffs: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Bind a skill from `catalog`
    pub fn with_skill(
        mut self,
        descriptor: SkillDescriptor,
        catalog: Arc<dyn SkillCatalog>,
    ) -> Self {
        self.tools.push(BoundTool {
            spec: descriptor.into(),
            route: ToolRoute::Skill(catalog),
        });
        self
    }

    /// Bind an integration tool from `catalog`
    pub fn with_integration(
        mut self,
        tool: IntegrationTool,
        catalog: Arc<dyn IntegrationCatalog>,
    ) -> Self {
        self.tools.push(BoundTool {
            spec: tool.spec,
            route: ToolRoute::Integration(catalog),
        });
        self
    }

    /// Bind the `handoff` tool naming `peers`
    pub fn with_handoff(mut self, peers: &[PeerAgent]) -> Self {
        self.tools.push(BoundTool {
            spec: handoff_spec(peers),
            route: ToolRoute::Handoff(peers.iter().map(|p| p.id.clone()).collect()),
        });
        self
    }

    pub fn specs(&self) -> impl Iterator<Item = &ToolSpec> {
        self.tools.iter().map(|t| &t.spec)
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.spec.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    /// Execute the tool called `name`
    pub async fn invoke(&self, name: &str, args: Value) -> Result<SkillOutcome> {
        let tool = self
            .tools
            .iter()
            .find(|t| t.spec.name == name)
            .ok_or_else(|| {
                anyhow!(
                    "Tool '{}' is not bound to agent '{}'",
                    name,
                    self.context.agent_id
                )
            })?;

        tracing::debug!(tool = name, agent = %self.context.agent_id, "Invoking tool");

        match &tool.route {
            ToolRoute::Skill(catalog) => catalog.execute(name, args, &self.context).await,
            ToolRoute::Integration(catalog) => catalog.execute(name, args, &self.context).await,
            ToolRoute::Handoff(peers) => self.record_handoff(peers, args),
        }
    }

    fn record_handoff(&self, peers: &[String], args: Value) -> Result<SkillOutcome> {
        let args: HandoffArgs = serde_json::from_value(args)
            .map_err(|e| anyhow!("Invalid handoff arguments: {}", e))?;

        if !peers.iter().any(|p| p == &args.agent_id) {
            return Ok(SkillOutcome::failed(format!(
                "Unknown agent '{}'. Available: {}",
                args.agent_id,
                peers.join(", ")
            )));
        }

        let intent = HandoffIntent {
            from_agent: self.context.agent_id.clone(),
            to_agent: args.agent_id,
            reason: args.reason,
        };
        tracing::info!(from = %intent.from_agent, to = %intent.to_agent, "Handoff requested");

        let message = format!("Handoff to '{}' noted", intent.to_agent);
        self.handoffs
            .lock()
            .map_err(|e| anyhow!("Lock error: {}", e))?
            .push(intent);

        Ok(SkillOutcome::ok(message))
    }

    /// Handoff intents recorded so far, in call order
    pub fn handoffs(&self) -> Vec<HandoffIntent> {
        self.handoffs
            .lock()
            .map(|log| log.clone())
            .unwrap_or_default()
    }
}

impl fmt::Debug for ToolSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolSet")
            .field("tools", &self.names())
            .field("context", &self.context)
            .finish()
    }
}
