//! HTTP surface for the matching backend.
//!
//! Thin plumbing around the pipeline: request parsing and validation live
//! here; everything interesting happens in [`Pipeline`].
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/submit_found_item` | Multipart: `image` (required), `location_hint`, `top_k` |
//! | `POST` | `/submit_lost_item` | JSON: `description` (required), `location_hint`, `top_k` |
//! | `GET`  | `/found_items/{id}` | Read back a found item |
//! | `GET`  | `/lost_reports/{id}` | Read back a lost report |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "description must not be empty" } }
//! ```
//!
//! Pipeline failures map to a single 500 with the taxonomy code in the body;
//! request validation failures map to 400.

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};
use uuid::Uuid;

use crate::error::PipelineError;
use crate::pipeline::{MatchCandidate, MatchRecording, Pipeline};
use crate::traits::ItemStore;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub store: Arc<dyn ItemStore>,
}

/// Starts the HTTP server on `bind_addr`. Runs until the process exits.
pub async fn run_server(bind_addr: &str, state: AppState) -> anyhow::Result<()> {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/submit_found_item", post(handle_submit_found_item))
        .route("/submit_lost_item", post(handle_submit_lost_item))
        .route("/found_items/{id}", get(handle_get_found_item))
        .route("/lost_reports/{id}", get(handle_get_lost_report))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state);

    info!(bind = bind_addr, "listening");

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Internal error type that converts into an HTTP response.
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: message.into(),
    }
}

impl From<PipelineError> for AppError {
    fn from(e: PipelineError) -> Self {
        // Validation failures are the caller's fault; everything else is a
        // backend failure surfaced as a single opaque server error.
        let status = match e {
            PipelineError::Invalid(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        error!(code = e.code(), error = %e, "ingestion failed");
        AppError {
            status,
            code: e.code().to_string(),
            message: e.to_string(),
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /submit_found_item ============

#[derive(Serialize)]
struct SubmitFoundResponse {
    found_item_id: Uuid,
    image_bucket: String,
    image_path: String,
    image_url: String,
    top_matches: Vec<MatchCandidate>,
    match_recording: MatchRecording,
}

async fn handle_submit_found_item(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<SubmitFoundResponse>, AppError> {
    let mut image: Option<(Vec<u8>, String)> = None;
    let mut location_hint = "unknown".to_string();
    let mut top_k: Option<usize> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("invalid multipart body: {}", e)))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "image" => {
                let filename = field.file_name().unwrap_or("upload").to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| bad_request(format!("failed to read image field: {}", e)))?;
                image = Some((bytes.to_vec(), filename));
            }
            "location_hint" => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| bad_request(format!("invalid location_hint: {}", e)))?;
                if !value.trim().is_empty() {
                    location_hint = value;
                }
            }
            "top_k" => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| bad_request(format!("invalid top_k: {}", e)))?;
                top_k = Some(
                    value
                        .trim()
                        .parse()
                        .map_err(|_| bad_request("top_k must be a positive integer"))?,
                );
            }
            _ => {}
        }
    }

    let (bytes, filename) = image.ok_or_else(|| bad_request("image field is required"))?;
    if bytes.is_empty() {
        return Err(bad_request("image must not be empty"));
    }
    if top_k == Some(0) {
        return Err(bad_request("top_k must be a positive integer"));
    }

    let result = state
        .pipeline
        .ingest_found_item(&bytes, &filename, &location_hint, top_k)
        .await?;

    Ok(Json(SubmitFoundResponse {
        found_item_id: result.item_id,
        image_bucket: result.locator.bucket,
        image_path: result.locator.path,
        image_url: result.locator.public_url,
        top_matches: result.matches,
        match_recording: result.match_recording,
    }))
}

// ============ POST /submit_lost_item ============

#[derive(Deserialize)]
struct SubmitLostRequest {
    description: String,
    #[serde(default = "default_location_hint")]
    location_hint: String,
    #[serde(default)]
    top_k: Option<usize>,
}

fn default_location_hint() -> String {
    "unknown".to_string()
}

#[derive(Serialize)]
struct SubmitLostResponse {
    lost_report_id: Uuid,
    matches: Vec<MatchCandidate>,
    match_recording: MatchRecording,
}

async fn handle_submit_lost_item(
    State(state): State<AppState>,
    Json(request): Json<SubmitLostRequest>,
) -> Result<Json<SubmitLostResponse>, AppError> {
    // Blank descriptions are rejected by the pipeline itself before any
    // side effect; only top_k parsing is validated here.
    if request.top_k == Some(0) {
        return Err(bad_request("top_k must be a positive integer"));
    }

    let result = state
        .pipeline
        .ingest_lost_report(&request.description, &request.location_hint, request.top_k)
        .await?;

    Ok(Json(SubmitLostResponse {
        lost_report_id: result.report_id,
        matches: result.matches,
        match_recording: result.match_recording,
    }))
}

// ============ GET /found_items/{id}, GET /lost_reports/{id} ============

async fn handle_get_found_item(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, AppError> {
    let item = state
        .store
        .get_found_item(id)
        .await
        .map_err(|e| internal(e.to_string()))?
        .ok_or_else(|| not_found(format!("no found item with id {}", id)))?;

    Ok(Json(serde_json::to_value(&item).map_err(|e| internal(e.to_string()))?))
}

async fn handle_get_lost_report(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, AppError> {
    let report = state
        .store
        .get_lost_report(id)
        .await
        .map_err(|e| internal(e.to_string()))?
        .ok_or_else(|| not_found(format!("no lost report with id {}", id)))?;

    Ok(Json(serde_json::to_value(&report).map_err(|e| internal(e.to_string()))?))
}
