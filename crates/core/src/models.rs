//! # Conclave Models
//!
//! Provider and model selection for the generation backend. Every provider
//! is reached through its OpenAI-compatible chat-completions endpoint, so a
//! single [`OpenAiCompatibleBackend`] serves all of them.
//!
//! API keys come from the environment:
//! - Anthropic - `ANTHROPIC_API_KEY`
//! - OpenAI - `OPENAI_API_KEY`
//! - Gemini - `GEMINI_API_KEY`
//! - OpenRouter - `OPENROUTER_API_KEY`
//! - Grok (xAI) - `XAI_API_KEY`
//! - DeepSeek - `DEEPSEEK_API_KEY`

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::backend::{GenerationBackend, OpenAiCompatibleBackend};

/// Supported LLM providers
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    Anthropic,
    #[default]
    #[serde(rename = "openai")]
    OpenAI,
    Gemini,
    OpenRouter,
    Grok,
    DeepSeek,
}

impl LlmProvider {
    /// Get all available providers
    pub fn all() -> Vec<LlmProvider> {
        vec![
            LlmProvider::Anthropic,
            LlmProvider::OpenAI,
            LlmProvider::Gemini,
            LlmProvider::OpenRouter,
            LlmProvider::Grok,
            LlmProvider::DeepSeek,
        ]
    }

    /// Serialized identifier, as used in config files
    pub fn id(&self) -> &'static str {
        match self {
            LlmProvider::Anthropic => "anthropic",
            LlmProvider::OpenAI => "openai",
            LlmProvider::Gemini => "gemini",
            LlmProvider::OpenRouter => "openrouter",
            LlmProvider::Grok => "grok",
            LlmProvider::DeepSeek => "deepseek",
        }
    }

    /// Parse an identifier case-insensitively
    pub fn from_id(id: &str) -> Option<LlmProvider> {
        let id = id.to_ascii_lowercase();
        Self::all().into_iter().find(|p| p.id() == id)
    }

    /// Display name for UI
    pub fn display_name(&self) -> &'static str {
        match self {
            LlmProvider::Anthropic => "Anthropic",
            LlmProvider::OpenAI => "OpenAI",
            LlmProvider::Gemini => "Gemini",
            LlmProvider::OpenRouter => "OpenRouter",
            LlmProvider::Grok => "Grok",
            LlmProvider::DeepSeek => "DeepSeek",
        }
    }

    /// Whether this provider honours a custom base URL (self-hosted compatible servers)
    pub fn supports_base_url(&self) -> bool {
        matches!(self, LlmProvider::OpenAI)
    }

    /// OpenAI-compatible endpoint root
    pub fn default_base_url(&self) -> &'static str {
        match self {
            LlmProvider::Anthropic => "https://api.anthropic.com/v1",
            LlmProvider::OpenAI => "https://api.openai.com/v1",
            LlmProvider::Gemini => "https://generativelanguage.googleapis.com/v1beta/openai",
            LlmProvider::OpenRouter => "https://openrouter.ai/api/v1",
            LlmProvider::Grok => "https://api.x.ai/v1",
            LlmProvider::DeepSeek => "https://api.deepseek.com/v1",
        }
    }

    /// Environment variable holding the API key
    pub fn api_key_env(&self) -> &'static str {
        match self {
            LlmProvider::Anthropic => "ANTHROPIC_API_KEY",
            LlmProvider::OpenAI => "OPENAI_API_KEY",
            LlmProvider::Gemini => "GEMINI_API_KEY",
            LlmProvider::OpenRouter => "OPENROUTER_API_KEY",
            LlmProvider::Grok => "XAI_API_KEY",
            LlmProvider::DeepSeek => "DEEPSEEK_API_KEY",
        }
    }
}

/// Configuration for LLM model selection
///
/// ## Example
/// ```rust,ignore
/// use conclave_core::models::{ModelConfig, LlmProvider};
///
/// let config = ModelConfig::with_provider(LlmProvider::OpenRouter, "anthropic/claude-sonnet-4");
/// let backend = config.create_backend()?;
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelConfig {
    /// LLM provider to use
    #[serde(default)]
    pub provider: LlmProvider,
    /// Default model name; personas may override it per call
    pub model: String,
    /// Optional base URL override for OpenAI-compatible APIs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::OpenAI,
            model: "gpt-4o-mini".to_string(),
            base_url: None,
        }
    }
}

impl ModelConfig {
    /// Create a new model config with default provider (OpenAI)
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            provider: LlmProvider::OpenAI,
            model: model.into(),
            base_url: None,
        }
    }

    /// Create config for a specific provider
    pub fn with_provider(provider: LlmProvider, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            base_url: None,
        }
    }

    /// Set base URL (for OpenAI-compatible endpoints)
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Endpoint root actually used
    pub fn resolved_base_url(&self) -> &str {
        match &self.base_url {
            Some(url) if self.provider.supports_base_url() => url,
            _ => self.provider.default_base_url(),
        }
    }

    /// Create a backend, reading the API key from the provider's env var
    pub fn create_backend(&self) -> anyhow::Result<Arc<dyn GenerationBackend>> {
        let env = self.provider.api_key_env();
        let api_key = std::env::var(env)
            .with_context(|| format!("{} is not set", env))?;
        self.create_backend_with_key(api_key)
    }

    /// Create a backend with an explicit API key
    pub fn create_backend_with_key(
        &self,
        api_key: impl Into<String>,
    ) -> anyhow::Result<Arc<dyn GenerationBackend>> {
        let backend =
            OpenAiCompatibleBackend::new(api_key, self.resolved_base_url(), &self.model)?;
        tracing::debug!(
            provider = self.provider.display_name(),
            model = %self.model,
            "Created generation backend"
        );
        Ok(Arc::new(backend))
    }
}
