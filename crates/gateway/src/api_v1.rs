//! HTTP API v1: tool runs, template admin, and session slots.
//!
//! Endpoints:
//!
//! - `GET    /v1/tools`             : List tools with their response schemas
//! - `POST   /v1/tools/{tool}`      : Run a tool, get the flattened result
//! - `POST   /v1/normalize/{tool}`  : Normalize supplied text (no model call)
//! - `GET    /v1/templates`         : List prompt templates
//! - `GET    /v1/templates/{tool}`  : Get one prompt template
//! - `PUT    /v1/templates/{tool}`  : Create or replace a prompt template
//! - `GET    /v1/session/{slot}`    : Read the caller's session slot
//! - `DELETE /v1/session/{slot}`    : Clear the caller's session slot

use axum::{
    Extension, Router,
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{error, info};

use ritualcraft_config::GatewayConfig;
use ritualcraft_core::error::StoreError;
use ritualcraft_core::provider::ModelParams;
use ritualcraft_core::session::SessionKey;
use ritualcraft_core::template::PromptTemplate;
use ritualcraft_normalizer::NormalizeTrace;
use ritualcraft_pipeline::{PipelineError, ToolRunner, ToolSpec};

// ── State ─────────────────────────────────────────────────────────────────

/// Shared state for the v1 API.
pub struct ApiV1State {
    pub runner: Arc<ToolRunner>,
    pub gateway: GatewayConfig,
}

pub type SharedApiState = Arc<ApiV1State>;

/// The user a request is acting for, resolved from its bearer token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller(pub String);

impl Caller {
    pub fn anonymous() -> Self {
        Self("anonymous".into())
    }
}

// ── Router ────────────────────────────────────────────────────────────────

/// Build the v1 API router. Nest this under "/v1" in the main router.
pub fn v1_router(state: SharedApiState) -> Router {
    Router::new()
        .route("/tools", get(list_tools_handler))
        .route("/tools/{tool}", post(run_tool_handler))
        .route("/normalize/{tool}", post(normalize_handler))
        .route("/templates", get(list_templates_handler))
        .route(
            "/templates/{tool}",
            get(get_template_handler).put(put_template_handler),
        )
        .route(
            "/session/{slot}",
            get(get_session_handler).delete(delete_session_handler),
        )
        .with_state(state)
}

// ── Request / Response types ──────────────────────────────────────────────

#[derive(Serialize)]
struct ToolListResponse {
    tools: Vec<ToolSpec>,
    count: usize,
}

#[derive(Deserialize, Default)]
struct RunToolRequest {
    #[serde(default)]
    fields: Map<String, Value>,
}

#[derive(Deserialize)]
struct NormalizeRequest {
    raw: String,
    /// Include the tier-by-tier trace in the response.
    #[serde(default)]
    trace: bool,
}

#[derive(Serialize)]
struct NormalizeResponse {
    #[serde(flatten)]
    result: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    trace: Option<NormalizeTrace>,
}

#[derive(Deserialize)]
struct UpsertTemplateRequest {
    prompt_text: String,
    #[serde(default)]
    model: String,
    #[serde(flatten)]
    params: ModelParams,
}

#[derive(Serialize)]
struct TemplateListResponse {
    templates: Vec<PromptTemplate>,
    count: usize,
}

#[derive(Serialize)]
struct SessionSlotResponse {
    slot: String,
    value: Value,
}

#[derive(Serialize)]
struct SessionDeleteResponse {
    removed: bool,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

fn pipeline_error(e: PipelineError) -> ApiError {
    let status = match &e {
        PipelineError::UnknownTool(_) => StatusCode::NOT_FOUND,
        PipelineError::Configuration(_) | PipelineError::Store(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
        PipelineError::UpstreamTimeout(_) | PipelineError::UpstreamService(_) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
    };
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        error!(error = %e, "Tool request failed");
    }
    api_error(status, e.to_string())
}

fn store_error(e: StoreError) -> ApiError {
    match e {
        StoreError::InvalidRecord(msg) => api_error(StatusCode::BAD_REQUEST, msg),
        other => {
            error!(error = %other, "Store request failed");
            api_error(StatusCode::INTERNAL_SERVER_ERROR, other.to_string())
        }
    }
}

// ── Tool handlers ─────────────────────────────────────────────────────────

async fn list_tools_handler(State(state): State<SharedApiState>) -> Json<ToolListResponse> {
    let tools: Vec<ToolSpec> = state.runner.catalog().list().into_iter().cloned().collect();
    let count = tools.len();
    Json(ToolListResponse { tools, count })
}

async fn run_tool_handler(
    State(state): State<SharedApiState>,
    Extension(caller): Extension<Caller>,
    Path(tool): Path<String>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    // An empty body runs the tool with no fields.
    let payload: RunToolRequest = if body.is_empty() {
        RunToolRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| api_error(StatusCode::BAD_REQUEST, format!("Invalid request body: {e}")))?
    };
    info!(tool = %tool, user = %caller.0, "v1/tools run request");

    let outcome = state
        .runner
        .run(&tool, &caller.0, payload.fields)
        .await
        .map_err(pipeline_error)?;

    Ok(Json(outcome.to_flat_json()))
}

async fn normalize_handler(
    State(state): State<SharedApiState>,
    Path(tool): Path<String>,
    Json(payload): Json<NormalizeRequest>,
) -> Result<Json<NormalizeResponse>, ApiError> {
    let result = state
        .runner
        .normalize_only(&tool, &payload.raw)
        .map_err(pipeline_error)?;

    Ok(Json(NormalizeResponse {
        result: result.to_flat_json(),
        trace: payload.trace.then_some(result.trace),
    }))
}

// ── Template handlers ─────────────────────────────────────────────────────

async fn list_templates_handler(
    State(state): State<SharedApiState>,
) -> Result<Json<TemplateListResponse>, ApiError> {
    let templates = state.runner.templates().list().await.map_err(store_error)?;
    let count = templates.len();
    Ok(Json(TemplateListResponse { templates, count }))
}

async fn get_template_handler(
    State(state): State<SharedApiState>,
    Path(tool): Path<String>,
) -> Result<Json<PromptTemplate>, ApiError> {
    state
        .runner
        .templates()
        .get(&tool)
        .await
        .map_err(store_error)?
        .map(Json)
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, format!("No template for '{tool}'")))
}

async fn put_template_handler(
    State(state): State<SharedApiState>,
    Path(tool): Path<String>,
    Json(payload): Json<UpsertTemplateRequest>,
) -> Result<Json<PromptTemplate>, ApiError> {
    if state.runner.catalog().get(&tool).is_none() {
        return Err(pipeline_error(PipelineError::UnknownTool(tool)));
    }

    let template = PromptTemplate::new(tool.as_str(), payload.prompt_text, payload.model)
        .with_params(payload.params);
    let templates = state.runner.templates();
    templates.upsert(template).await.map_err(store_error)?;
    info!(tool = %tool, "Template updated");

    templates
        .get(&tool)
        .await
        .map_err(store_error)?
        .map(Json)
        .ok_or_else(|| api_error(StatusCode::INTERNAL_SERVER_ERROR, "Template vanished after write"))
}

// ── Session handlers ──────────────────────────────────────────────────────

async fn get_session_handler(
    State(state): State<SharedApiState>,
    Extension(caller): Extension<Caller>,
    Path(slot): Path<String>,
) -> Result<Json<SessionSlotResponse>, ApiError> {
    let key = SessionKey::new(caller.0, slot.as_str());
    let value = state
        .runner
        .sessions()
        .get(&key)
        .await
        .map_err(store_error)?
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, format!("Session slot '{slot}' is empty")))?;
    Ok(Json(SessionSlotResponse { slot, value }))
}

async fn delete_session_handler(
    State(state): State<SharedApiState>,
    Extension(caller): Extension<Caller>,
    Path(slot): Path<String>,
) -> Result<Json<SessionDeleteResponse>, ApiError> {
    let removed = state
        .runner
        .sessions()
        .remove(&SessionKey::new(caller.0, slot))
        .await
        .map_err(store_error)?;
    Ok(Json(SessionDeleteResponse { removed }))
}

// ── Tests ─────────────────────────────────────────────────────────────────
