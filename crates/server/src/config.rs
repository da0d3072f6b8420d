//! Server configuration persisted under `.conclave/`.

use anyhow::{Context, Result};
use conclave_core::config::OrchestrationSettings;
use conclave_core::models::{LlmProvider, ModelConfig};
use conclave_core::orchestration::DefinitionSet;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CONFIG_DIR: &str = ".conclave";

/// Settings read from `.conclave/config.json`; CLI flags override them
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistedConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<LlmProvider>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settings: Option<OrchestrationSettings>,
    /// Extra definitions merged over the built-in presets
    #[serde(skip_serializing_if = "Option::is_none")]
    pub definitions: Option<PathBuf>,
}

impl PersistedConfig {
    pub fn path() -> PathBuf {
        Path::new(CONFIG_DIR).join("config.json")
    }

    /// Missing file yields the defaults; an unreadable one is an error
    pub async fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Invalid config in {}", path.display()))
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))
    }

    /// Fields set in `other` win
    pub fn merge(&mut self, other: PersistedConfig) {
        if other.provider.is_some() {
            self.provider = other.provider;
        }
        if other.model.is_some() {
            self.model = other.model;
        }
        if other.base_url.is_some() {
            self.base_url = other.base_url;
        }
        if other.settings.is_some() {
            self.settings = other.settings;
        }
        if other.definitions.is_some() {
            self.definitions = other.definitions;
        }
    }

    pub fn model_config(&self) -> ModelConfig {
        let defaults = ModelConfig::default();
        let mut config = ModelConfig::with_provider(
            self.provider.unwrap_or(defaults.provider),
            self.model.clone().unwrap_or(defaults.model),
        );
        config.base_url = self.base_url.clone();
        config
    }

    pub fn settings(&self) -> OrchestrationSettings {
        self.settings.clone().unwrap_or_default()
    }

    /// Built-in presets plus the configured definitions file, if any
    pub fn definitions(&self) -> Result<DefinitionSet> {
        let builtin = DefinitionSet::builtin();
        match &self.definitions {
            Some(path) => Ok(builtin.merge(DefinitionSet::load(path)?)),
            None => Ok(builtin),
        }
    }
}

/// Parse a `--provider` flag value
pub fn parse_provider(value: &str) -> Result<LlmProvider, String> {
    LlmProvider::from_id(value).ok_or_else(|| {
        let known: Vec<&str> = LlmProvider::all().iter().map(|p| p.id()).collect();
        format!("unknown provider '{}' (expected one of: {})", value, known.join(", "))
    })
}
