//! # HTTP API
//!
//! JSON endpoints for running presets plus SSE variants that stream
//! [`AgentEvent`]s. Each SSE message uses the event's `type` tag as its
//! `event:` name and the event JSON as its data.

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, Response, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Json,
    },
    routing::{get, post},
    Router,
};
use conclave_core::agents::{AgentServices, RunContext};
use conclave_core::models::LlmProvider;
use conclave_core::orchestration::{
    AgentEvent, DefinitionSet, EventStream, RouteOutcome, Router as AgentRouter, RoutingDecision,
    SwarmCoordinator, SwarmOutcome, TeamCoordinator, TeamOutcome,
};
use conclave_core::ConfigError;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use utoipa::{OpenApi, ToSchema};

/// Presets plus the services every coordinator is built from
pub struct AppState {
    pub definitions: DefinitionSet,
    pub services: AgentServices,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    fn team(&self, id: &str) -> Result<TeamCoordinator, ConfigError> {
        TeamCoordinator::new(self.definitions.team(id)?.clone(), self.services.clone())
    }

    fn swarm(&self, id: &str) -> Result<SwarmCoordinator, ConfigError> {
        SwarmCoordinator::new(self.definitions.swarm(id)?.clone(), self.services.clone())
    }

    fn router(&self, id: &str) -> Result<AgentRouter, ConfigError> {
        AgentRouter::new(self.definitions.router(id)?.clone(), self.services.clone())
    }
}

// === API Types ===

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Serialize, ToSchema)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Debug, Serialize, ToSchema)]
struct PresetSummary {
    id: String,
    name: String,
    description: String,
    agents: Vec<String>,
}

#[derive(Debug, Serialize, ToSchema)]
struct PresetsResponse {
    teams: Vec<PresetSummary>,
    swarms: Vec<PresetSummary>,
    routers: Vec<PresetSummary>,
}

#[derive(Debug, Serialize, ToSchema)]
struct ProviderInfo {
    id: String,
    name: String,
    supports_base_url: bool,
    env_var: String,
    configured: bool,
}

#[derive(Debug, Serialize, ToSchema)]
struct ProvidersResponse {
    providers: Vec<ProviderInfo>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct TeamRunRequest {
    pub task: String,
    pub context: Option<String>,
    pub user_id: Option<String>,
    pub conversation_id: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SwarmRunRequest {
    pub task: String,
    /// Per-agent task overrides keyed by agent id
    #[serde(default)]
    pub overrides: HashMap<String, String>,
    pub user_id: Option<String>,
    pub conversation_id: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ClassifyRequest {
    pub message: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RouteRequest {
    pub message: String,
    pub user_id: Option<String>,
    pub conversation_id: Option<String>,
}

fn run_context(user_id: Option<String>, conversation_id: Option<String>) -> RunContext {
    RunContext {
        user_id: user_id.unwrap_or_default(),
        conversation_id: conversation_id.unwrap_or_default(),
    }
}

// === Errors ===

/// Failure rendered as `{success: false, message}`
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<ConfigError> for ApiError {
    fn from(error: ConfigError) -> Self {
        let status = match error {
            ConfigError::UnknownPreset { .. } => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: error.to_string(),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(error: anyhow::Error) -> Self {
        tracing::error!(error = %format!("{:#}", error), "Run failed");
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: format!("{:#}", error),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let body = ApiResponse {
            success: false,
            message: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

// === OpenAPI Definition ===

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Conclave API",
        version = "1.0.0",
        description = "Run teams, swarms and routers of LLM agents"
    ),
    paths(
        health,
        list_presets,
        list_providers,
        run_team,
        stream_team,
        run_swarm,
        stream_swarm,
        classify_message,
        route_message,
        stream_route
    ),
    components(schemas(
        ApiResponse,
        HealthResponse,
        PresetSummary,
        PresetsResponse,
        ProviderInfo,
        ProvidersResponse,
        TeamRunRequest,
        SwarmRunRequest,
        ClassifyRequest,
        RouteRequest
    )),
    tags(
        (name = "meta", description = "Health, presets and providers"),
        (name = "teams", description = "Turn-taking teams"),
        (name = "swarms", description = "Parallel swarms"),
        (name = "routers", description = "Single-agent routing")
    )
)]
struct ApiDoc;

pub fn routes(state: SharedState) -> Router {
    Router::new()
        .route("/api/v1/health", get(health))
        .route("/api/v1/presets", get(list_presets))
        .route("/api/v1/providers", get(list_providers))
        .route("/api/v1/teams/:id/run", post(run_team))
        .route("/api/v1/teams/:id/stream", post(stream_team))
        .route("/api/v1/swarms/:id/run", post(run_swarm))
        .route("/api/v1/swarms/:id/stream", post(stream_swarm))
        .route("/api/v1/routers/:id/classify", post(classify_message))
        .route("/api/v1/routers/:id/route", post(route_message))
        .route("/api/v1/routers/:id/stream", post(stream_route))
        .route("/api/v1/openapi.json", get(serve_openapi))
        .with_state(state)
}

// === Handlers ===

/// Liveness check
#[utoipa::path(
    get,
    path = "/api/v1/health",
    tag = "meta",
    responses((status = 200, description = "Server is up", body = HealthResponse))
)]
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// List team, swarm and router presets
#[utoipa::path(
    get,
    path = "/api/v1/presets",
    tag = "meta",
    responses((status = 200, description = "Available presets", body = PresetsResponse))
)]
async fn list_presets(State(state): State<SharedState>) -> Json<PresetsResponse> {
    Json(presets_response(&state.definitions))
}

fn presets_response(set: &DefinitionSet) -> PresetsResponse {
    let agent_ids = |agents: &[conclave_core::agents::AgentPersona]| {
        agents.iter().map(|a| a.id.clone()).collect::<Vec<_>>()
    };

    PresetsResponse {
        teams: set
            .teams
            .iter()
            .map(|t| PresetSummary {
                id: t.id.clone(),
                name: t.name.clone(),
                description: t.description.clone(),
                agents: agent_ids(&t.agents),
            })
            .collect(),
        swarms: set
            .swarms
            .iter()
            .map(|s| PresetSummary {
                id: s.id.clone(),
                name: s.name.clone(),
                description: s.description.clone(),
                agents: agent_ids(&s.agents),
            })
            .collect(),
        routers: set
            .routers
            .iter()
            .map(|r| PresetSummary {
                id: r.id.clone(),
                name: r.name.clone(),
                description: r.description.clone(),
                agents: agent_ids(&r.agents),
            })
            .collect(),
    }
}

/// List supported providers and whether their API key is set
#[utoipa::path(
    get,
    path = "/api/v1/providers",
    tag = "meta",
    responses((status = 200, description = "Supported providers", body = ProvidersResponse))
)]
async fn list_providers() -> Json<ProvidersResponse> {
    let providers = LlmProvider::all()
        .into_iter()
        .map(|p| ProviderInfo {
            id: p.id().to_string(),
            name: p.display_name().to_string(),
            supports_base_url: p.supports_base_url(),
            env_var: p.api_key_env().to_string(),
            configured: std::env::var(p.api_key_env()).is_ok(),
        })
        .collect();
    Json(ProvidersResponse { providers })
}

/// Run a team to completion
#[utoipa::path(
    post,
    path = "/api/v1/teams/{id}/run",
    tag = "teams",
    params(("id" = String, Path, description = "Team preset id")),
    request_body = TeamRunRequest,
    responses(
        (status = 200, description = "Team outcome with transcript and final output"),
        (status = 404, description = "Unknown team", body = ApiResponse),
        (status = 500, description = "Run failed", body = ApiResponse)
    )
)]
async fn run_team(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(req): Json<TeamRunRequest>,
) -> Result<Json<TeamOutcome>, ApiError> {
    let coordinator = state.team(&id)?;
    let ctx = run_context(req.user_id, req.conversation_id);
    let outcome = coordinator.run(&req.task, req.context.as_deref(), &ctx).await?;
    Ok(Json(outcome))
}

/// Stream a team run as server-sent events
#[utoipa::path(
    post,
    path = "/api/v1/teams/{id}/stream",
    tag = "teams",
    params(("id" = String, Path, description = "Team preset id")),
    request_body = TeamRunRequest,
    responses(
        (status = 200, description = "Server-sent AgentEvent stream"),
        (status = 404, description = "Unknown team", body = ApiResponse)
    )
)]
async fn stream_team(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(req): Json<TeamRunRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let coordinator = state.team(&id)?;
    let ctx = run_context(req.user_id, req.conversation_id);
    Ok(event_sse(coordinator.run_stream(req.task, req.context, ctx)))
}

/// Run a swarm to completion
#[utoipa::path(
    post,
    path = "/api/v1/swarms/{id}/run",
    tag = "swarms",
    params(("id" = String, Path, description = "Swarm preset id")),
    request_body = SwarmRunRequest,
    responses(
        (status = 200, description = "Swarm outcome with per-agent results"),
        (status = 404, description = "Unknown swarm", body = ApiResponse),
        (status = 500, description = "Aggregation failed", body = ApiResponse)
    )
)]
async fn run_swarm(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(req): Json<SwarmRunRequest>,
) -> Result<Json<SwarmOutcome>, ApiError> {
    let coordinator = state.swarm(&id)?;
    let ctx = run_context(req.user_id, req.conversation_id);
    let outcome = coordinator.run(&req.task, &req.overrides, &ctx).await?;
    Ok(Json(outcome))
}

/// Stream a swarm run as server-sent events
#[utoipa::path(
    post,
    path = "/api/v1/swarms/{id}/stream",
    tag = "swarms",
    params(("id" = String, Path, description = "Swarm preset id")),
    request_body = SwarmRunRequest,
    responses(
        (status = 200, description = "Server-sent AgentEvent stream"),
        (status = 404, description = "Unknown swarm", body = ApiResponse)
    )
)]
async fn stream_swarm(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(req): Json<SwarmRunRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let coordinator = state.swarm(&id)?;
    let ctx = run_context(req.user_id, req.conversation_id);
    Ok(event_sse(coordinator.run_stream(req.task, req.overrides, ctx)))
}

/// Pick an agent without running it
#[utoipa::path(
    post,
    path = "/api/v1/routers/{id}/classify",
    tag = "routers",
    params(("id" = String, Path, description = "Router preset id")),
    request_body = ClassifyRequest,
    responses(
        (status = 200, description = "Chosen agent and reason"),
        (status = 404, description = "Unknown router", body = ApiResponse)
    )
)]
async fn classify_message(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(req): Json<ClassifyRequest>,
) -> Result<Json<RoutingDecision>, ApiError> {
    let router = state.router(&id)?;
    Ok(Json(router.classify(&req.message).await))
}

/// Route a message and run the chosen agent
#[utoipa::path(
    post,
    path = "/api/v1/routers/{id}/route",
    tag = "routers",
    params(("id" = String, Path, description = "Router preset id")),
    request_body = RouteRequest,
    responses(
        (status = 200, description = "Routing decision and agent output"),
        (status = 404, description = "Unknown router", body = ApiResponse),
        (status = 500, description = "Agent failed", body = ApiResponse)
    )
)]
async fn route_message(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(req): Json<RouteRequest>,
) -> Result<Json<RouteOutcome>, ApiError> {
    let router = state.router(&id)?;
    let ctx = run_context(req.user_id, req.conversation_id);
    Ok(Json(router.route(&req.message, &ctx).await?))
}

/// Route a message and stream the chosen agent's events
#[utoipa::path(
    post,
    path = "/api/v1/routers/{id}/stream",
    tag = "routers",
    params(("id" = String, Path, description = "Router preset id")),
    request_body = RouteRequest,
    responses(
        (status = 200, description = "Server-sent AgentEvent stream"),
        (status = 404, description = "Unknown router", body = ApiResponse)
    )
)]
async fn stream_route(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(req): Json<RouteRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let router = state.router(&id)?;
    let ctx = run_context(req.user_id, req.conversation_id);
    Ok(event_sse(router.route_stream(req.message, ctx)))
}

fn event_sse(events: EventStream) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    Sse::new(events.map(|event| Ok(sse_event(&event)))).keep_alive(KeepAlive::default())
}

fn sse_event(event: &AgentEvent) -> Event {
    Event::default()
        .event(event.kind())
        .json_data(event)
        .unwrap_or_else(|e| Event::default().comment(format!("unserializable event: {}", e)))
}

// === OpenAPI Handler ===

async fn serve_openapi() -> Result<impl IntoResponse, ApiError> {
    let spec = ApiDoc::openapi()
        .to_json()
        .map_err(|e| anyhow::anyhow!("Failed to render OpenAPI document: {}", e))?;
    let response = Response::builder()
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(spec))
        .map_err(anyhow::Error::from)?;
    Ok(response)
}
