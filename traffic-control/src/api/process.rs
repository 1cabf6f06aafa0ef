//! Processing endpoints
//!
//! Bodies are taken as raw bytes so malformed JSON is answered with a 400 in
//! the service's own error shape.

use axum::{body::Bytes, extract::State, routing::post, Json, Router};
use serde::Serialize;
use serde_json::Value;

use crate::error::{ApiError, ApiResult};
use crate::services::ProcessOutcome;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct ProcessResponse {
    pub status: String,
    pub message: String,
    #[serde(flatten)]
    pub outcome: ProcessOutcome,
}

impl ProcessResponse {
    fn success(outcome: ProcessOutcome) -> Self {
        Self {
            status: "success".to_string(),
            message: "Data processed successfully".to_string(),
            outcome,
        }
    }
}

fn parse_json(body: &Bytes) -> ApiResult<Value> {
    serde_json::from_slice(body).map_err(|e| ApiError::BadRequest(format!("Malformed JSON: {}", e)))
}

/// POST /process
///
/// Batch or legacy single-sensor traffic data.
pub async fn process_data(State(state): State<AppState>, body: Bytes) -> ApiResult<Json<ProcessResponse>> {
    let payload = parse_json(&body)?;
    let outcome = state.pipeline.process_value(payload).await?;
    Ok(Json(ProcessResponse::success(outcome)))
}

/// POST /ingest
///
/// Raw simulation output; formatted before entering the same pipeline.
pub async fn ingest_raw(State(state): State<AppState>, body: Bytes) -> ApiResult<Json<ProcessResponse>> {
    let payload = parse_json(&body)?;
    let outcome = state.pipeline.ingest_raw(payload).await?;
    Ok(Json(ProcessResponse::success(outcome)))
}

pub fn process_routes() -> Router<AppState> {
    Router::new()
        .route("/process", post(process_data))
        .route("/ingest", post(ingest_raw))
}
