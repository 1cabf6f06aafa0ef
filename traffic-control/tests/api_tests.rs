//! Integration tests for traffic-control API endpoints
//!
//! Tests cover:
//! - Health and root endpoints
//! - POST /process and POST /ingest status codes and bodies
//! - Metadata listing, stats and deletion
//! - Error body shape

mod common;

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use common::*;
use serde_json::Value;
use tower::util::ServiceExt; // for `oneshot` method
use traffic_control::{build_router, AppState};

/// Test helper: app over stub collaborators and an in-memory index
async fn setup_app(storage: StubStorage, reply: OptimizerReply) -> axum::Router {
    let pipeline = pipeline(Arc::new(storage), Arc::new(StubOptimizer::new(reply))).await;
    build_router(AppState::new(pipeline))
}

async fn default_app() -> axum::Router {
    setup_app(StubStorage::default(), OptimizerReply::PerSensorList).await
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().method("GET").uri(uri).body(Body::empty()).unwrap()
}

fn delete(uri: &str) -> Request<Body> {
    Request::builder().method("DELETE").uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(body.into())
        .unwrap()
}

/// Test helper: Extract JSON body from response
async fn extract_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .expect("Should read body");
    serde_json::from_slice(&bytes).expect("Should parse JSON")
}

async fn call(app: &axum::Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    (status, extract_json(response.into_body()).await)
}

fn assert_error_body(body: &Value, error_code: &str) {
    assert_eq!(body["status"], "error");
    assert_eq!(body["error_code"], error_code);
    assert!(body["message"].is_string());
    assert!(body["timestamp"].as_str().unwrap().ends_with('Z'));
}

// =============================================================================
// Health
// =============================================================================

#[tokio::test]
async fn test_healthcheck() {
    let app = default_app().await;
    let (status, body) = call(&app, get("/healthcheck")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "traffic-control");
    assert!(body["version"].is_string());
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn test_root() {
    let app = default_app().await;
    let (status, body) = call(&app, get("/")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Traffic Control Service is running");
}

// =============================================================================
// Processing
// =============================================================================

#[tokio::test]
async fn test_process_batch_success() {
    let app = default_app().await;
    let payload = batch_json("2", &["1", "2"]).to_string();
    let (status, body) = call(&app, post_json("/process", payload)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert_eq!(body["data_type"], "data");
    assert_eq!(body["traffic_light_id"], "2");
    assert_eq!(body["timestamp"], TIMESTAMP_ISO);
    assert_eq!(body["sensor_count"], 2);
    assert_eq!(body["optimization_count"], 2);
}

#[tokio::test]
async fn test_process_legacy_success() {
    let app = default_app().await;
    let (status, body) = call(&app, post_json("/process", legacy_json("21").to_string())).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["sensor_count"], 1);
}

#[tokio::test]
async fn test_process_malformed_json_is_400() {
    let app = default_app().await;
    let (status, body) = call(&app, post_json("/process", "{\"version\": ")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_error_body(&body, "BAD_REQUEST");
}

#[tokio::test]
async fn test_process_unrecognized_shape_is_400() {
    let app = default_app().await;
    let payload = serde_json::json!({"version": "2.0", "type": "data"}).to_string();
    let (status, body) = call(&app, post_json("/process", payload)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_error_body(&body, "BAD_REQUEST");
}

#[tokio::test]
async fn test_process_validation_failure_is_422() {
    let app = default_app().await;
    let mut payload = batch_json("1", &["1", "2", "3"]);
    payload["sensors"][2]["metrics"]["density"] = serde_json::json!(1.7);
    let (status, body) = call(&app, post_json("/process", payload.to_string())).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_error_body(&body, "VALIDATION_ERROR");
    assert!(body["message"]
        .as_str()
        .unwrap()
        .contains("sensors[2].metrics.density"));
}

#[tokio::test]
async fn test_process_upstream_failure_is_500() {
    let app = setup_app(StubStorage::failing_download(502), OptimizerReply::Single).await;
    let (status, body) = call(&app, post_json("/process", legacy_json("3").to_string())).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_error_body(&body, "UPSTREAM_ERROR");
    assert!(body["message"].as_str().unwrap().contains("download"));
}

#[tokio::test]
async fn test_ingest_raw_success() {
    let app = default_app().await;
    let (status, body) = call(&app, post_json("/ingest", raw_json().to_string())).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["traffic_light_id"], "0042");
    assert_eq!(body["sensor_count"], 2);
}

#[tokio::test]
async fn test_ingest_invalid_raw_is_422() {
    let app = default_app().await;
    let mut payload = raw_json();
    payload["sensors"][1]["metrics"]["density"] = serde_json::json!(-0.2);
    let (status, body) = call(&app, post_json("/ingest", payload.to_string())).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_error_body(&body, "VALIDATION_ERROR");
}

// =============================================================================
// Metadata
// =============================================================================

#[tokio::test]
async fn test_metadata_queries_after_processing() {
    let app = default_app().await;
    let (status, _) = call(&app, post_json("/process", batch_json("1", &["1", "2"]).to_string())).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = call(&app, get("/metadata/traffic-light/1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert_eq!(body["count"], 2);
    assert_eq!(body["limit"], 100);
    assert_eq!(body["data"][0]["traffic_light_id"], "1");
    assert_eq!(body["data"][0]["timestamp"], TIMESTAMP_UNIX);

    let (_, body) = call(&app, get("/metadata/type/optimization?limit=1")).await;
    assert_eq!(body["count"], 1);
    assert_eq!(body["limit"], 1);
    assert_eq!(body["data"][0]["type"], "optimization");

    let (_, body) = call(&app, get("/metadata/recent")).await;
    assert_eq!(body["count"], 3);
    assert_eq!(body["limit"], 50);

    let (status, body) = call(&app, get("/metadata/stats")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["stats"]["total_entries"], 3);
    assert_eq!(body["stats"]["data_entries"], 1);
    assert_eq!(body["stats"]["optimization_entries"], 2);
    assert_eq!(body["stats"]["batch_entries"], 0);
    assert_eq!(body["stats"]["unique_traffic_lights"], 2);
}

#[tokio::test]
async fn test_metadata_limit_below_one_is_400() {
    let app = default_app().await;
    for uri in [
        "/metadata/traffic-light/1?limit=0",
        "/metadata/type/data?limit=-5",
        "/metadata/recent?limit=0",
    ] {
        let (status, body) = call(&app, get(uri)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
        assert_error_body(&body, "BAD_REQUEST");
    }
}

#[tokio::test]
async fn test_delete_metadata_for_traffic_light() {
    let app = default_app().await;
    call(&app, post_json("/process", batch_json("1", &["1", "2"]).to_string())).await;

    let (status, body) = call(&app, delete("/metadata/traffic-light/1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["deleted_count"], 2);
    assert_eq!(body["traffic_light_id"], "1");

    let (_, body) = call(&app, get("/metadata/traffic-light/1")).await;
    assert_eq!(body["count"], 0);

    let (_, body) = call(&app, get("/metadata/traffic-light/2")).await;
    assert_eq!(body["count"], 1);
}
