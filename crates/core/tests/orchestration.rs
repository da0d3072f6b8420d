//! End-to-end runs through the public API with a canned backend.

use anyhow::{bail, Result};
use async_trait::async_trait;
use conclave_core::agents::{AgentPersona, AgentServices, RunContext};
use conclave_core::backend::{
    Generation, GenerationBackend, GenerationChunk, GenerationRequest, GenerationStream,
};
use conclave_core::orchestration::{
    AgentEvent, Aggregation, DefinitionSet, Router, RouterDefinition, SwarmCoordinator,
    SwarmDefinition, TeamCoordinator, TeamDefinition, TeamStrategy,
};
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio_test::assert_ok;

/// Replies by persona: the system prompt is the persona id
struct CannedBackend {
    replies: HashMap<String, Result<String, String>>,
    fallback: String,
    log: Mutex<Vec<String>>,
}

impl CannedBackend {
    fn new(fallback: &str) -> Self {
        Self {
            replies: HashMap::new(),
            fallback: fallback.to_string(),
            log: Mutex::new(Vec::new()),
        }
    }

    fn reply(mut self, agent: &str, text: &str) -> Self {
        self.replies.insert(agent.to_string(), Ok(text.to_string()));
        self
    }

    fn fail(mut self, agent: &str, error: &str) -> Self {
        self.replies.insert(agent.to_string(), Err(error.to_string()));
        self
    }

    fn calls(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    fn answer(&self, request: &GenerationRequest) -> Result<String> {
        let system = request.messages[0].content.clone();
        self.log.lock().unwrap().push(system.clone());
        match self.replies.get(&system) {
            Some(Ok(text)) => Ok(text.clone()),
            Some(Err(error)) => bail!("{}", error),
            None => Ok(self.fallback.clone()),
        }
    }
}

#[async_trait]
impl GenerationBackend for CannedBackend {
    async fn generate(&self, request: GenerationRequest) -> Result<Generation> {
        Ok(Generation {
            text: self.answer(&request)?,
            finish_reason: Some("stop".to_string()),
            step_count: 1,
        })
    }

    async fn stream(&self, request: GenerationRequest) -> Result<GenerationStream> {
        let text = self.answer(&request)?;
        let chunks = vec![
            Ok(GenerationChunk::Text(text)),
            Ok(GenerationChunk::Finished {
                finish_reason: Some("stop".to_string()),
                step_count: 1,
            }),
        ];
        Ok(Box::pin(futures::stream::iter(chunks)))
    }
}

fn agent(id: &str, role: &str) -> AgentPersona {
    AgentPersona::new(id, id.to_uppercase(), role, id)
}

fn services(backend: &Arc<CannedBackend>) -> AgentServices {
    let backend: Arc<dyn GenerationBackend> = backend.clone();
    AgentServices::new(backend)
}

#[tokio::test]
async fn test_chain_output_is_last_agent_verbatim() {
    let backend = Arc::new(
        CannedBackend::new("unused")
            .reply("outline", "1. intro")
            .reply("draft", "  Final draft.\n"),
    );
    let definition = TeamDefinition::new(
        "pipeline",
        "Pipeline",
        TeamStrategy::Chain,
        vec![agent("outline", "plan"), agent("draft", "write")],
    );
    let coordinator = TeamCoordinator::new(definition, services(&backend)).unwrap();

    let outcome = assert_ok!(coordinator.run("Write a post", None, &RunContext::default()).await);
    assert_eq!(outcome.final_output, "  Final draft.\n");
    assert_eq!(backend.calls(), vec!["outline", "draft"]);
}

#[tokio::test]
async fn test_swarm_min_completions_gate() {
    let backend = Arc::new(
        CannedBackend::new("ok")
            .fail("b", "quota exceeded")
            .fail("c", "quota exceeded"),
    );
    let definition = SwarmDefinition::new(
        "poll",
        "Poll",
        Aggregation::Vote,
        vec![agent("a", "x"), agent("b", "x"), agent("c", "x")],
    )
    .with_min_completions(2);
    let coordinator = SwarmCoordinator::new(definition, services(&backend)).unwrap();

    let outcome = assert_ok!(
        coordinator
            .run("vote", &HashMap::new(), &RunContext::default())
            .await
    );
    assert_eq!(outcome.final_output, "Only 1/2 agents completed successfully");
    assert!(!outcome.aggregated);
    assert_eq!(outcome.results.len(), 3);
}

#[tokio::test]
async fn test_swarm_merge() {
    let backend = Arc::new(
        CannedBackend::new("unused")
            .reply("alice", r#"{"a": 1}"#)
            .reply("bob", "not json"),
    );
    let definition = SwarmDefinition::new(
        "facts",
        "Facts",
        Aggregation::Merge,
        vec![
            AgentPersona::new("alice", "Alice", "x", "alice"),
            AgentPersona::new("bob", "Bob", "x", "bob"),
        ],
    );
    let coordinator = SwarmCoordinator::new(definition, services(&backend)).unwrap();

    let outcome = assert_ok!(
        coordinator
            .run("facts", &HashMap::new(), &RunContext::default())
            .await
    );
    let merged: serde_json::Value = serde_json::from_str(&outcome.final_output).unwrap();
    assert_eq!(merged, serde_json::json!({"a": 1, "Bob": "not json"}));
}

#[tokio::test]
async fn test_ai_router_reads_json_from_prose() {
    let backend = Arc::new(CannedBackend::new(
        r#"The best fit is {"agent_id": "coder", "reason": "code question"}."#,
    ));
    let definition = RouterDefinition::new(
        "desk",
        "Desk",
        "general",
        vec![agent("general", "general"), agent("coder", "code")],
    )
    .with_ai_routing(true);
    let router = Router::new(definition, services(&backend)).unwrap();

    let decision = router.classify("my build fails").await;
    assert_eq!(decision.agent_id, "coder");
    assert_eq!(decision.reason, "code question");
}

#[tokio::test]
async fn test_router_stream_delegates() {
    let backend = Arc::new(CannedBackend::new("unused").reply("general", "Hello there"));
    let definition = RouterDefinition::new(
        "desk",
        "Desk",
        "general",
        vec![agent("general", "general"), agent("coder", "code")],
    );
    let router = Router::new(definition, services(&backend)).unwrap();

    let kinds: Vec<&'static str> = router
        .route_stream("hi".to_string(), RunContext::new("u1", "c1"))
        .map(|event| event.kind())
        .collect()
        .await;
    assert_eq!(kinds, vec!["handoff", "agent_start", "agent_output", "agent_done"]);
}

#[tokio::test]
async fn test_builtin_team_streams_to_completion() {
    let backend = Arc::new(CannedBackend::new("text"));
    let definition = DefinitionSet::builtin().team("research-brief").unwrap().clone();
    let coordinator = TeamCoordinator::new(definition, services(&backend)).unwrap();

    let events: Vec<AgentEvent> = coordinator
        .run_stream("topic".to_string(), None, RunContext::default())
        .collect()
        .await;

    let done = events
        .iter()
        .filter(|e| matches!(e, AgentEvent::AgentDone { .. }))
        .count();
    assert_eq!(done, 3);
    assert!(matches!(events.last(), Some(AgentEvent::Complete { output, .. }) if output == "text"));
}
