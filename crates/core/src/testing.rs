//! Scripted backend and fixtures shared by the unit tests.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::agents::{AgentPersona, AgentServices};
use crate::backend::{
    Generation, GenerationBackend, GenerationChunk, GenerationRequest, GenerationStream,
};

type Responder = dyn Fn(&GenerationRequest) -> Result<String> + Send + Sync;
type Delay = dyn Fn(&GenerationRequest) -> Option<Duration> + Send + Sync;

/// Backend whose replies come from a closure; records every request
pub struct ScriptedBackend {
    responder: Box<Responder>,
    delay: Option<Box<Delay>>,
    tool_call: Option<(String, Value)>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedBackend {
    pub fn new(
        responder: impl Fn(&GenerationRequest) -> Result<String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            responder: Box::new(responder),
            delay: None,
            tool_call: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn fixed(text: &str) -> Self {
        let text = text.to_string();
        Self::new(move |_| Ok(text.clone()))
    }

    /// Sleep before replying (use with a paused clock)
    pub fn with_delay(
        mut self,
        delay: impl Fn(&GenerationRequest) -> Option<Duration> + Send + Sync + 'static,
    ) -> Self {
        self.delay = Some(Box::new(delay));
        self
    }

    /// Invoke this tool before replying, whenever it is bound
    pub fn with_tool_call(mut self, name: &str, args: Value) -> Self {
        self.tool_call = Some((name.to_string(), args));
        self
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    async fn respond(&self, request: &GenerationRequest) -> Result<String> {
        self.requests.lock().unwrap().push(request.clone());

        if let Some(delay) = self.delay.as_ref().and_then(|d| d(request)) {
            tokio::time::sleep(delay).await;
        }

        if let (Some((name, args)), Some(tools)) = (&self.tool_call, &request.tools) {
            if tools.names().contains(&name.as_str()) {
                tools.invoke(name, args.clone()).await?;
            }
        }

        (self.responder)(request)
    }
}

#[async_trait]
impl GenerationBackend for ScriptedBackend {
    async fn generate(&self, request: GenerationRequest) -> Result<Generation> {
        let text = self.respond(&request).await?;
        Ok(Generation {
            text,
            finish_reason: Some("stop".to_string()),
            step_count: 1,
        })
    }

    async fn stream(&self, request: GenerationRequest) -> Result<GenerationStream> {
        let text = self.respond(&request).await?;
        let mut chunks: Vec<Result<GenerationChunk>> = text
            .split_inclusive(' ')
            .map(|piece| Ok(GenerationChunk::Text(piece.to_string())))
            .collect();
        chunks.push(Ok(GenerationChunk::Finished {
            finish_reason: Some("stop".to_string()),
            step_count: 1,
        }));
        Ok(Box::pin(futures::stream::iter(chunks)))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// System prompt of a request
pub fn system_prompt(request: &GenerationRequest) -> &str {
    request
        .messages
        .first()
        .map(|m| m.content.as_str())
        .unwrap_or_default()
}

/// Final user turn of a request
pub fn user_turn(request: &GenerationRequest) -> &str {
    request
        .messages
        .last()
        .map(|m| m.content.as_str())
        .unwrap_or_default()
}

/// All message contents joined, for containment checks
pub fn full_text(request: &GenerationRequest) -> String {
    request
        .messages
        .iter()
        .map(|m| m.content.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Persona whose system prompt is `You are {id}.`
pub fn persona(id: &str, role: &str) -> AgentPersona {
    let mut name = id.to_string();
    if let Some(first) = name.get_mut(0..1) {
        first.make_ascii_uppercase();
    }
    AgentPersona::new(id, name, role, format!("You are {}.", id))
}

/// Id of the persona a request was sent for, if it came from a unit
pub fn agent_of(request: &GenerationRequest) -> Option<&str> {
    system_prompt(request)
        .strip_prefix("You are ")
        .and_then(|rest| rest.strip_suffix('.'))
}

pub fn services(backend: &Arc<ScriptedBackend>) -> AgentServices {
    let backend: Arc<dyn GenerationBackend> = backend.clone();
    AgentServices::new(backend)
}
