use serde::{Deserialize, Serialize};

use crate::skills::PeerAgent;

/// Static description of one agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentPersona {
    pub id: String,
    pub name: String,
    /// Short role label, also used for keyword routing
    pub role: String,
    pub system_prompt: String,
    /// Model override forwarded to the backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Skill ids this agent may call; absent or empty means all
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_skills: Option<Vec<String>>,
    /// Integration ids this agent may call; absent or empty means all
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_integrations: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl AgentPersona {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        role: impl Into<String>,
        system_prompt: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            role: role.into(),
            system_prompt: system_prompt.into(),
            model: None,
            allowed_skills: None,
            allowed_integrations: None,
            max_tokens: None,
            temperature: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_skills(mut self, skills: Vec<String>) -> Self {
        self.allowed_skills = Some(skills);
        self
    }

    pub fn with_integrations(mut self, integrations: Vec<String>) -> Self {
        self.allowed_integrations = Some(integrations);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Whether the skill allow-list admits `skill_id`
    pub fn allows_skill(&self, skill_id: &str) -> bool {
        allow_list_admits(self.allowed_skills.as_deref(), skill_id)
    }

    /// Whether the integration allow-list admits `integration_id`
    pub fn allows_integration(&self, integration_id: &str) -> bool {
        allow_list_admits(self.allowed_integrations.as_deref(), integration_id)
    }

    pub fn as_peer(&self) -> PeerAgent {
        PeerAgent {
            id: self.id.clone(),
            name: self.name.clone(),
            role: self.role.clone(),
        }
    }
}

fn allow_list_admits(list: Option<&[String]>, id: &str) -> bool {
    match list {
        None | Some([]) => true,
        Some(ids) => ids.iter().any(|allowed| allowed == id),
    }
}
