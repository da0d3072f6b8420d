//! # Generation Backend
//!
//! The contract every text-generation service must satisfy. The orchestration
//! layer never talks to a vendor directly; it builds a [`GenerationRequest`]
//! and hands it to whatever backend was injected.
//!
//! ```text
//! AgentExecutionUnit ──▶ GenerationBackend::generate / stream
//!                              │
//!                              ├── tool loop (ToolSet::invoke) stays inside the backend
//!                              └── returns final text, or Text fragments then Finished
//! ```

pub mod openai;

pub use openai::OpenAiCompatibleBackend;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::pin::Pin;

use crate::skills::ToolSet;

/// Speaker of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::System => "system",
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        }
    }
}

/// One message of the prompt sent to the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// Everything the backend needs for one generation
#[derive(Clone)]
pub struct GenerationRequest {
    /// Ordered prompt
    pub messages: Vec<ChatMessage>,
    /// Tools the backend may call during its own loop
    pub tools: Option<ToolSet>,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Model override; `None` means the backend's configured model
    pub model: Option<String>,
}

impl GenerationRequest {
    pub fn new(messages: Vec<ChatMessage>, max_tokens: u32, temperature: f32) -> Self {
        Self {
            messages,
            tools: None,
            max_tokens,
            temperature,
            model: None,
        }
    }

    pub fn with_tools(mut self, tools: ToolSet) -> Self {
        self.tools = Some(tools);
        self
    }

    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }
}

impl fmt::Debug for GenerationRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenerationRequest")
            .field("messages", &self.messages.len())
            .field("tools", &self.tools.as_ref().map(|t| t.names()))
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .field("model", &self.model)
            .finish()
    }
}

/// Final result of a non-streaming generation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Generation {
    pub text: String,
    pub finish_reason: Option<String>,
    /// Number of model round-trips, including tool steps
    pub step_count: u32,
}

/// Item of a generation stream: text fragments in order, then one `Finished`
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationChunk {
    Text(String),
    Finished {
        finish_reason: Option<String>,
        step_count: u32,
    },
}

/// Stream returned by [`GenerationBackend::stream`]
pub type GenerationStream = Pin<Box<dyn Stream<Item = anyhow::Result<GenerationChunk>> + Send>>;

/// A text-generation service
///
/// Implementations own model selection, authentication and retries. Tool calls
/// requested by the model are executed by the implementation through
/// [`ToolSet::invoke`] and fed back into its own loop.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Generate a complete response
    async fn generate(&self, request: GenerationRequest) -> anyhow::Result<Generation>;

    /// Generate a response as ordered fragments followed by `Finished`
    async fn stream(&self, request: GenerationRequest) -> anyhow::Result<GenerationStream>;

    /// Short name for logs
    fn name(&self) -> &str {
        "backend"
    }
}
