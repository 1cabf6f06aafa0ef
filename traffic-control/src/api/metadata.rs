//! Metadata index endpoints

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use traffic_common::db::MetadataEntry;

use crate::db::MetadataStats;
use crate::error::{ApiError, ApiResult};
use crate::AppState;

const DEFAULT_LIST_LIMIT: i64 = 100;
const DEFAULT_RECENT_LIMIT: i64 = 50;

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<i64>,
}

impl LimitQuery {
    fn resolve(&self, default: i64) -> ApiResult<i64> {
        match self.limit {
            None => Ok(default),
            Some(limit) if limit >= 1 => Ok(limit),
            Some(limit) => Err(ApiError::BadRequest(format!(
                "limit must be at least 1, got {}",
                limit
            ))),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MetadataListResponse {
    pub status: String,
    pub message: String,
    pub data: Vec<MetadataEntry>,
    pub count: usize,
    pub limit: i64,
}

impl MetadataListResponse {
    fn new(message: String, data: Vec<MetadataEntry>, limit: i64) -> Self {
        Self {
            status: "success".to_string(),
            message,
            count: data.len(),
            data,
            limit,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub status: String,
    pub message: String,
    pub stats: MetadataStats,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub status: String,
    pub message: String,
    pub deleted_count: u64,
    pub traffic_light_id: String,
}

/// GET /metadata/traffic-light/:id
pub async fn by_traffic_light(
    State(state): State<AppState>,
    Path(traffic_light_id): Path<String>,
    Query(query): Query<LimitQuery>,
) -> ApiResult<Json<MetadataListResponse>> {
    let limit = query.resolve(DEFAULT_LIST_LIMIT)?;
    let entries = state.index.list_by_traffic_light(&traffic_light_id, limit).await?;
    let message = format!("Metadata for traffic light {}", traffic_light_id);
    Ok(Json(MetadataListResponse::new(message, entries, limit)))
}

/// GET /metadata/type/:data_type
pub async fn by_type(
    State(state): State<AppState>,
    Path(data_type): Path<String>,
    Query(query): Query<LimitQuery>,
) -> ApiResult<Json<MetadataListResponse>> {
    let limit = query.resolve(DEFAULT_LIST_LIMIT)?;
    let entries = state.index.list_by_type(&data_type, limit).await?;
    let message = format!("Metadata of type {}", data_type);
    Ok(Json(MetadataListResponse::new(message, entries, limit)))
}

/// GET /metadata/recent
pub async fn recent(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> ApiResult<Json<MetadataListResponse>> {
    let limit = query.resolve(DEFAULT_RECENT_LIMIT)?;
    let entries = state.index.list_recent(limit).await?;
    Ok(Json(MetadataListResponse::new(
        "Recent metadata".to_string(),
        entries,
        limit,
    )))
}

/// GET /metadata/stats
pub async fn stats(State(state): State<AppState>) -> ApiResult<Json<StatsResponse>> {
    let stats = state.index.stats().await?;
    Ok(Json(StatsResponse {
        status: "success".to_string(),
        message: "Metadata statistics".to_string(),
        stats,
    }))
}

/// DELETE /metadata/traffic-light/:id
pub async fn delete_by_traffic_light(
    State(state): State<AppState>,
    Path(traffic_light_id): Path<String>,
) -> ApiResult<Json<DeleteResponse>> {
    let deleted_count = state.index.delete_by_traffic_light(&traffic_light_id).await?;
    Ok(Json(DeleteResponse {
        status: "success".to_string(),
        message: format!(
            "Deleted {} metadata entries for traffic light {}",
            deleted_count, traffic_light_id
        ),
        deleted_count,
        traffic_light_id,
    }))
}

pub fn metadata_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/metadata/traffic-light/:traffic_light_id",
            get(by_traffic_light).delete(delete_by_traffic_light),
        )
        .route("/metadata/type/:data_type", get(by_type))
        .route("/metadata/recent", get(recent))
        .route("/metadata/stats", get(stats))
}
