//! # OpenAI-Compatible Backend
//!
//! Chat-completions client usable with any provider that speaks the OpenAI
//! wire format (OpenAI, OpenRouter, DeepSeek, Grok, and the compatibility
//! endpoints of Anthropic and Gemini). Runs the tool loop itself: tool calls
//! returned by the model are executed through the request's [`ToolSet`] and
//! the results are sent back until the model answers in plain text.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use super::{
    ChatMessage, Generation, GenerationBackend, GenerationChunk, GenerationRequest,
    GenerationStream,
};
use crate::skills::ToolSet;

const DEFAULT_MAX_TOOL_STEPS: u32 = 8;

/// Parallel tool calls accepted in one streamed step
const MAX_STREAMED_TOOL_CALLS: usize = 64;

/// HTTP backend for OpenAI-compatible chat-completions endpoints
#[derive(Clone)]
pub struct OpenAiCompatibleBackend {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    timeout: Duration,
    max_tool_steps: u32,
}

impl OpenAiCompatibleBackend {
    /// Create a backend for `base_url` (e.g. `https://api.openai.com/v1`)
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            bail!("API key cannot be empty");
        }

        Ok(Self {
            client: Client::new(),
            api_key,
            base_url: base_url.into(),
            model: model.into(),
            timeout: Duration::from_secs(120),
            max_tool_steps: DEFAULT_MAX_TOOL_STEPS,
        })
    }

    /// Set request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Cap on model round-trips per generation when tools are in play
    pub fn with_max_tool_steps(mut self, steps: u32) -> Self {
        self.max_tool_steps = steps.max(1);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    fn build_body(&self, request: &GenerationRequest, messages: &[Value], stream: bool) -> Value {
        let mut body = json!({
            "model": request.model.as_deref().unwrap_or(&self.model),
            "messages": messages,
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
            "stream": stream,
        });

        if let Some(tools) = request.tools.as_ref().filter(|t| !t.is_empty()) {
            let functions: Vec<Value> = tools
                .specs()
                .map(|spec| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": spec.name,
                            "description": spec.description,
                            "parameters": spec.parameters,
                        }
                    })
                })
                .collect();
            body["tools"] = Value::Array(functions);
        }

        body
    }

    async fn post(&self, body: &Value) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .timeout(self.timeout)
            .json(body)
            .send()
            .await
            .context("Generation request failed")?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            bail!("Generation API error ({}): {}", status, error_text);
        }

        Ok(response)
    }

    async fn drive_stream(
        &self,
        request: GenerationRequest,
        tx: &mpsc::Sender<Result<GenerationChunk>>,
    ) -> Result<()> {
        let mut messages = format_messages(&request.messages);
        let mut steps = 0;

        loop {
            steps += 1;
            let body = self.build_body(&request, &messages, true);
            let mut events = self.post(&body).await?.bytes_stream().eventsource();

            let mut calls: Vec<PendingToolCall> = Vec::new();
            let mut finish_reason = None;

            while let Some(event) = events.next().await {
                let event = event.map_err(|e| anyhow!("Generation stream error: {}", e))?;
                if event.data == "[DONE]" {
                    break;
                }
                if let Some(fragment) =
                    decode_stream_event(&event.data, &mut calls, &mut finish_reason)?
                {
                    if tx.send(Ok(GenerationChunk::Text(fragment))).await.is_err() {
                        // Consumer went away
                        return Ok(());
                    }
                }
            }

            if !calls.is_empty() && steps < self.max_tool_steps {
                run_tool_calls(request.tools.as_ref(), &calls, &mut messages).await;
                continue;
            }

            let _ = tx
                .send(Ok(GenerationChunk::Finished {
                    finish_reason,
                    step_count: steps,
                }))
                .await;
            return Ok(());
        }
    }
}

#[async_trait]
impl GenerationBackend for OpenAiCompatibleBackend {
    async fn generate(&self, request: GenerationRequest) -> Result<Generation> {
        let mut messages = format_messages(&request.messages);
        let mut steps = 0;

        loop {
            steps += 1;
            let body = self.build_body(&request, &messages, false);
            let completion: ChatCompletion = self
                .post(&body)
                .await?
                .json()
                .await
                .context("Malformed generation response")?;

            let choice = completion
                .choices
                .into_iter()
                .next()
                .ok_or_else(|| anyhow!("Generation response had no choices"))?;

            let calls: Vec<PendingToolCall> = choice
                .message
                .tool_calls
                .unwrap_or_default()
                .into_iter()
                .map(|call| PendingToolCall {
                    id: call.id,
                    name: call.function.name,
                    arguments: call.function.arguments,
                })
                .collect();

            if !calls.is_empty() && steps < self.max_tool_steps {
                tracing::debug!(steps, calls = calls.len(), "Executing tool calls");
                run_tool_calls(request.tools.as_ref(), &calls, &mut messages).await;
                continue;
            }

            return Ok(Generation {
                text: choice.message.content.unwrap_or_default(),
                finish_reason: choice.finish_reason,
                step_count: steps,
            });
        }
    }

    async fn stream(&self, request: GenerationRequest) -> Result<GenerationStream> {
        let (tx, rx) = mpsc::channel(64);
        let backend = self.clone();

        tokio::spawn(async move {
            if let Err(e) = backend.drive_stream(request, &tx).await {
                let _ = tx.send(Err(e)).await;
            }
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }

    fn name(&self) -> &str {
        "openai-compatible"
    }
}

/// Convert our messages to the wire format
fn format_messages(messages: &[ChatMessage]) -> Vec<Value> {
    messages
        .iter()
        .map(|msg| json!({ "role": msg.role.as_str(), "content": msg.content }))
        .collect()
}

/// Tool call being assembled (streaming deltas arrive in pieces)
#[derive(Debug, Clone, Default, PartialEq)]
struct PendingToolCall {
    id: String,
    name: String,
    arguments: String,
}

/// Execute tool calls and append the assistant turn plus one `tool` message per call
async fn run_tool_calls(
    tools: Option<&ToolSet>,
    calls: &[PendingToolCall],
    messages: &mut Vec<Value>,
) {
    let tool_calls: Vec<Value> = calls
        .iter()
        .map(|call| {
            json!({
                "id": call.id,
                "type": "function",
                "function": { "name": call.name, "arguments": call.arguments },
            })
        })
        .collect();
    messages.push(json!({ "role": "assistant", "content": Value::Null, "tool_calls": tool_calls }));

    for call in calls {
        let content = match tools {
            Some(tools) => {
                let args = serde_json::from_str(&call.arguments).unwrap_or_else(|_| json!({}));
                match tools.invoke(&call.name, args).await {
                    Ok(outcome) => outcome.output,
                    Err(e) => format!("Tool error: {}", e),
                }
            }
            None => format!("Tool '{}' is not available", call.name),
        };
        messages.push(json!({ "role": "tool", "tool_call_id": call.id, "content": content }));
    }
}

/// Decode one SSE `data:` payload; returns the text fragment, if any
fn decode_stream_event(
    data: &str,
    calls: &mut Vec<PendingToolCall>,
    finish_reason: &mut Option<String>,
) -> Result<Option<String>> {
    let chunk: StreamChunkPayload =
        serde_json::from_str(data).context("Malformed generation stream chunk")?;

    let Some(choice) = chunk.choices.into_iter().next() else {
        return Ok(None);
    };

    if choice.finish_reason.is_some() {
        *finish_reason = choice.finish_reason;
    }

    for delta in choice.delta.tool_calls.unwrap_or_default() {
        if delta.index >= MAX_STREAMED_TOOL_CALLS {
            bail!(
                "Tool call index {} exceeds the limit of {}",
                delta.index,
                MAX_STREAMED_TOOL_CALLS
            );
        }
        if calls.len() <= delta.index {
            calls.resize(delta.index + 1, PendingToolCall::default());
        }
        let call = &mut calls[delta.index];
        if let Some(id) = delta.id {
            call.id = id;
        }
        if let Some(function) = delta.function {
            if let Some(name) = function.name {
                call.name.push_str(&name);
            }
            if let Some(arguments) = function.arguments {
                call.arguments.push_str(&arguments);
            }
        }
    }

    Ok(choice.delta.content.filter(|c| !c.is_empty()))
}

// Wire types

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCallPayload>>,
}

#[derive(Debug, Deserialize)]
struct ToolCallPayload {
    id: String,
    function: FunctionPayload,
}

#[derive(Debug, Deserialize)]
struct FunctionPayload {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct StreamChunkPayload {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCallDelta>>,
}

#[derive(Debug, Deserialize)]
struct ToolCallDelta {
    index: usize,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<FunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct FunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skills::{ExecutionContext, ToolSet};

    fn backend() -> OpenAiCompatibleBackend {
        OpenAiCompatibleBackend::new("test-key", "https://api.example.com/v1/", "gpt-4o").unwrap()
    }

    #[test]
    fn test_empty_api_key() {
        assert!(OpenAiCompatibleBackend::new("", "https://api.example.com/v1", "m").is_err());
    }

    #[test]
    fn test_endpoint_trims_slash() {
        assert_eq!(
            backend().endpoint(),
            "https://api.example.com/v1/chat/completions"
        );
    }

    #[test]
    fn test_message_formatting() {
        let formatted = format_messages(&[
            ChatMessage::system("You are helpful"),
            ChatMessage::user("Hello"),
        ]);
        assert_eq!(formatted.len(), 2);
        assert_eq!(formatted[0]["role"], "system");
        assert_eq!(formatted[1]["content"], "Hello");
    }

    #[test]
    fn test_body_uses_model_override_and_tools() {
        let tools = ToolSet::new(ExecutionContext::default()).with_handoff(&[]);
        let request = GenerationRequest::new(vec![ChatMessage::user("hi")], 100, 0.3)
            .with_model(Some("gpt-4o-mini".to_string()))
            .with_tools(tools);

        let body = backend().build_body(&request, &format_messages(&request.messages), true);
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["stream"], true);
        assert_eq!(body["max_tokens"], 100);
        assert_eq!(body["tools"][0]["function"]["name"], "handoff");
    }

    #[test]
    fn test_body_omits_empty_tools() {
        let request = GenerationRequest::new(vec![ChatMessage::user("hi")], 100, 0.3)
            .with_tools(ToolSet::new(ExecutionContext::default()));
        let body = backend().build_body(&request, &[], false);
        assert_eq!(body["model"], "gpt-4o");
        assert!(body.get("tools").is_none());
    }

    #[test]
    fn test_decode_text_fragment() {
        let mut calls = Vec::new();
        let mut finish = None;
        let data = r#"{"choices":[{"delta":{"content":"Hel"},"finish_reason":null}]}"#;
        let fragment = decode_stream_event(data, &mut calls, &mut finish).unwrap();
        assert_eq!(fragment.as_deref(), Some("Hel"));
        assert!(calls.is_empty());
        assert!(finish.is_none());
    }

    #[test]
    fn test_decode_tool_call_deltas() {
        let mut calls = Vec::new();
        let mut finish = None;
        let first = r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_1","function":{"name":"hand","arguments":"{\"agent"}}]}}]}"#;
        let second = r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"name":"off","arguments":"_id\":\"coder\"}"}}]},"finish_reason":"tool_calls"}]}"#;

        assert!(decode_stream_event(first, &mut calls, &mut finish).unwrap().is_none());
        assert!(decode_stream_event(second, &mut calls, &mut finish).unwrap().is_none());

        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "call_1");
        assert_eq!(calls[0].name, "handoff");
        assert_eq!(calls[0].arguments, r#"{"agent_id":"coder"}"#);
        assert_eq!(finish.as_deref(), Some("tool_calls"));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let mut calls = Vec::new();
        let mut finish = None;
        assert!(decode_stream_event("not json", &mut calls, &mut finish).is_err());
    }

    #[test]
    fn test_decode_rejects_huge_tool_index() {
        let mut calls = Vec::new();
        let mut finish = None;
        let data = r#"{"choices":[{"delta":{"tool_calls":[{"index":4000000000,"function":{"name":"x"}}]}}]}"#;
        let err = decode_stream_event(data, &mut calls, &mut finish).unwrap_err();
        assert!(err.to_string().contains("exceeds the limit of 64"));
        assert!(calls.is_empty());
    }

    #[tokio::test]
    async fn test_tool_results_appended() {
        let tools = ToolSet::new(ExecutionContext {
            user_id: "u1".to_string(),
            conversation_id: "c1".to_string(),
            agent_id: "writer".to_string(),
        });
        let calls = vec![PendingToolCall {
            id: "call_9".to_string(),
            name: "missing".to_string(),
            arguments: "{}".to_string(),
        }];
        let mut messages = Vec::new();

        run_tool_calls(Some(&tools), &calls, &mut messages).await;

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["tool_calls"][0]["id"], "call_9");
        assert_eq!(messages[1]["role"], "tool");
        assert!(messages[1]["content"]
            .as_str()
            .unwrap()
            .starts_with("Tool error:"));
    }
}
