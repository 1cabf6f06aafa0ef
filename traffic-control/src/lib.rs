//! traffic-control library
//!
//! Accepts traffic sensor readings over HTTP, validates and normalizes them,
//! round-trips them through the storage service, asks the optimization
//! service for signal timings, and keeps a local metadata index of what was
//! stored.

use std::sync::Arc;

use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod formatter;
pub mod models;
pub mod services;
pub mod validator;

use db::MetadataIndex;
use services::ProcessingPipeline;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<ProcessingPipeline>,
    pub index: MetadataIndex,
}

impl AppState {
    pub fn new(pipeline: ProcessingPipeline) -> Self {
        let index = pipeline.index().clone();
        Self {
            pipeline: Arc::new(pipeline),
            index,
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::health_routes())
        .merge(api::process_routes())
        .merge(api::metadata_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
