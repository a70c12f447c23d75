use crate::orchestrator::Orchestrator;
use crate::types::{NewsletterError, Result, RunResult};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

/// Shared state for the HTTP surface: the orchestrator plus the latest
/// terminal result per user, kept for the status route.
pub struct AppState {
    orchestrator: Arc<Orchestrator>,
    runs: RwLock<HashMap<String, RunResult>>,
}

impl AppState {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self {
            orchestrator,
            runs: RwLock::new(HashMap::new()),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    pub user_id: String,
    #[serde(default = "default_channel")]
    pub channel: String,
    pub language: Option<String>,
}

fn default_channel() -> String {
    "email".to_string()
}

#[derive(Debug, Serialize)]
pub struct ApiResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/api/newsletters/generate", post(generate))
        .route("/api/newsletters/generate/mock", post(generate_mock))
        .route("/api/newsletters/status/:user_id", get(run_status))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind and serve the API until the process is stopped.
pub async fn serve(state: Arc<AppState>, bind: &str) -> Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!("API listening on {}", bind);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn root() -> Json<serde_json::Value> {
    Json(json!({ "message": "Welcome to the newsletter pipeline API" }))
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "environment": std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
    }))
}

async fn generate(
    State(state): State<Arc<AppState>>,
    Json(request): Json<GenerateRequest>,
) -> (StatusCode, Json<ApiResponse>) {
    // Reject unknown users up front; everything later is reported through
    // the status route.
    if let Err(e) = state.orchestrator.verify_user(&request.user_id).await {
        let status = match e {
            NewsletterError::UserNotFound { .. } => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        return (
            status,
            Json(ApiResponse {
                success: false,
                message: e.to_string(),
                details: None,
            }),
        );
    }

    spawn_run(state, request, false).await
}

async fn generate_mock(
    State(state): State<Arc<AppState>>,
    Json(request): Json<GenerateRequest>,
) -> (StatusCode, Json<ApiResponse>) {
    spawn_run(state, request, true).await
}

/// Kick off a pipeline run in the background and answer 202 immediately.
async fn spawn_run(
    state: Arc<AppState>,
    request: GenerateRequest,
    mock: bool,
) -> (StatusCode, Json<ApiResponse>) {
    let language = request
        .language
        .unwrap_or_else(|| state.orchestrator.config().default_language.clone());
    let user_id = request.user_id.clone();
    let channel = request.channel.clone();

    let task_state = state.clone();
    tokio::spawn(async move {
        let result = task_state
            .orchestrator
            .run(&user_id, &channel, &language, mock)
            .await;

        if let Some(err) = &result.error {
            error!(
                "background run for user {} failed at {}: {}",
                user_id, err.stage, err.message
            );
        }

        task_state
            .runs
            .write()
            .await
            .insert(user_id.clone(), result);
    });

    (
        StatusCode::ACCEPTED,
        Json(ApiResponse {
            success: true,
            message: format!(
                "newsletter generation started for user {}",
                request.user_id
            ),
            details: Some(json!({
                "user_id": request.user_id,
                "channel": request.channel,
                "status": "processing",
                "mock": mock,
            })),
        }),
    )
}

async fn run_status(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> (StatusCode, Json<ApiResponse>) {
    let runs = state.runs.read().await;

    match runs.get(&user_id) {
        Some(result) => (
            StatusCode::OK,
            Json(ApiResponse {
                success: true,
                message: "latest run result".to_string(),
                details: serde_json::to_value(result).ok(),
            }),
        ),
        None => (
            StatusCode::OK,
            Json(ApiResponse {
                success: true,
                message: "no runs recorded for this user".to_string(),
                details: Some(json!({ "user_id": user_id, "status": "unknown" })),
            }),
        ),
    }
}
