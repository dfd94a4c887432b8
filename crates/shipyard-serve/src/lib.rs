use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tower_http::cors::CorsLayer;

use shipyard_conductor::{
    Analysis, AnalyzeRequest, Answer, ApplyRequest, FetchRequest, Generated, Pipeline, RunReport,
    Validation,
};
use shipyard_core::PipelineError;

// ── Config ──

pub struct ServeConfig {
    pub bind: String,
    pub port: u16,
}

// ── App State ──

struct AppState {
    pipeline: Pipeline,
}

// ── Error Handling ──

/// Request body was well-formed JSON but semantically unusable.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
struct BadRequest(String);

struct AppError(anyhow::Error);

impl AppError {
    fn status(&self) -> StatusCode {
        if self.0.downcast_ref::<BadRequest>().is_some() {
            return StatusCode::BAD_REQUEST;
        }
        match self.0.downcast_ref::<PipelineError>() {
            Some(PipelineError::AmbiguousIntent(_)) => StatusCode::BAD_REQUEST,
            Some(PipelineError::NotFound(_)) => StatusCode::NOT_FOUND,
            Some(PipelineError::Retrieval(_)) | Some(PipelineError::Backend(_)) => {
                StatusCode::BAD_GATEWAY
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut body = serde_json::json!({ "error": self.0.to_string() });
        if let Some(err) = self.0.downcast_ref::<PipelineError>() {
            body["kind"] = err.kind().into();
        }
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self.0, "request failed");
        }
        (status, Json(body)).into_response()
    }
}

impl<E: Into<anyhow::Error>> From<E> for AppError {
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

// ── Entrypoint ──

pub async fn serve(pipeline: Pipeline, config: ServeConfig) -> anyhow::Result<()> {
    let app = router(pipeline);
    let addr = format!("{}:{}", config.bind, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "shipyard HTTP server listening");
    axum::serve(listener, app).await?;
    Ok(())
}

/// Build the router (for testing without binding to a port).
pub fn router(pipeline: Pipeline) -> Router {
    let state = Arc::new(AppState { pipeline });
    Router::new()
        .route("/api/health", get(health))
        .route("/api/git/yaml", post(post_git_yaml))
        .route("/api/git/apply", post(post_git_apply))
        .route("/api/git/ai", post(post_git_ai))
        .route("/api/git/analyze", post(post_git_analyze))
        .route("/api/ai/generate", post(post_ai_generate))
        .route("/api/ai/validate", post(post_ai_validate))
        .route("/api/ai/apply", post(post_ai_apply))
        .route("/api/ai/query", post(post_ai_query))
        .route("/api/git/cleanup", post(post_cleanup))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn required(value: &str, field: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(BadRequest(format!("{field} is required")).into());
    }
    Ok(())
}

// ── Health ──

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "ok": true }))
}

// ── POST /api/git/yaml, /api/git/apply ──

async fn post_git_yaml(
    State(state): State<Arc<AppState>>,
    Json(body): Json<FetchRequest>,
) -> Result<Json<RunReport>, AppError> {
    required(&body.repo_url, "repoUrl")?;
    Ok(Json(state.pipeline.fetch(body).await?))
}

async fn post_git_apply(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ApplyRequest>,
) -> Result<Json<RunReport>, AppError> {
    required(&body.repo_url, "repoUrl")?;
    Ok(Json(state.pipeline.fetch_and_apply(body).await?))
}

// ── POST /api/git/ai ──

#[derive(Deserialize)]
struct PromptBody {
    prompt: String,
}

async fn post_git_ai(
    State(state): State<Arc<AppState>>,
    Json(body): Json<PromptBody>,
) -> Result<Json<RunReport>, AppError> {
    required(&body.prompt, "prompt")?;
    Ok(Json(state.pipeline.run(&body.prompt).await?))
}

// ── POST /api/git/analyze ──

async fn post_git_analyze(
    State(state): State<Arc<AppState>>,
    Json(body): Json<AnalyzeRequest>,
) -> Result<Json<Analysis>, AppError> {
    required(&body.repo_url, "repoUrl")?;
    Ok(Json(state.pipeline.analyze(body).await?))
}

// ── POST /api/ai/generate, /api/ai/validate ──

async fn post_ai_generate(
    State(state): State<Arc<AppState>>,
    Json(body): Json<PromptBody>,
) -> Result<Json<Generated>, AppError> {
    required(&body.prompt, "prompt")?;
    Ok(Json(state.pipeline.generate(&body.prompt).await?))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ValidateBody {
    yaml_content: String,
}

async fn post_ai_validate(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ValidateBody>,
) -> Result<Json<Validation>, AppError> {
    required(&body.yaml_content, "yamlContent")?;
    Ok(Json(state.pipeline.validate(&body.yaml_content)))
}

// ── POST /api/ai/apply ──

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateBody {
    prompt: String,
    #[serde(default)]
    namespace: Option<String>,
    #[serde(default)]
    dry_run: bool,
}

async fn post_ai_apply(
    State(state): State<Arc<AppState>>,
    Json(body): Json<GenerateBody>,
) -> Result<Json<RunReport>, AppError> {
    required(&body.prompt, "prompt")?;
    let report = state
        .pipeline
        .generate_and_apply(&body.prompt, body.namespace, body.dry_run)
        .await?;
    Ok(Json(report))
}

// ── POST /api/ai/query ──

#[derive(Deserialize)]
struct QueryBody {
    question: String,
}

async fn post_ai_query(
    State(state): State<Arc<AppState>>,
    Json(body): Json<QueryBody>,
) -> Result<Json<Answer>, AppError> {
    required(&body.question, "question")?;
    Ok(Json(state.pipeline.answer(&body.question).await?))
}

// ── POST /api/git/cleanup ──

async fn post_cleanup(
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.pipeline.purge()?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

// ── Tests ──
