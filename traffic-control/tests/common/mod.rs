//! Shared fixtures: stub collaborators and payload builders

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};
use traffic_common::db::init_memory_database;
use traffic_control::db::MetadataIndex;
use traffic_control::models::TrafficEnvelope;
use traffic_control::services::{
    DownloadRequest, OptimizationService, ProcessingPipeline, RetryPolicy, StorageService,
    StorageUpload, UpstreamError,
};
use traffic_control::validator::ValidationLimits;

/// 2025-05-19T14:20:00Z
pub const TIMESTAMP_ISO: &str = "2025-05-19T14:20:00Z";
pub const TIMESTAMP_UNIX: i64 = 1_747_664_400;

/// Storage that keeps uploads in memory and echoes data batches on download
#[derive(Default)]
pub struct StubStorage {
    uploads: Mutex<Vec<Value>>,
    pending_not_found: AtomicUsize,
    download_failure: Option<u16>,
    download_calls: AtomicUsize,
}

impl StubStorage {
    /// Report "not yet visible" for the first `times` downloads
    pub fn not_found_times(times: usize) -> Self {
        Self {
            pending_not_found: AtomicUsize::new(times),
            ..Self::default()
        }
    }

    pub fn failing_download(status: u16) -> Self {
        Self {
            download_failure: Some(status),
            ..Self::default()
        }
    }

    pub fn uploads(&self) -> Vec<Value> {
        self.uploads.lock().unwrap().clone()
    }

    pub fn download_calls(&self) -> usize {
        self.download_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StorageService for StubStorage {
    async fn upload(&self, payload: &StorageUpload) -> Result<(), UpstreamError> {
        self.uploads
            .lock()
            .unwrap()
            .push(serde_json::to_value(payload).unwrap());
        Ok(())
    }

    async fn download(&self, request: &DownloadRequest) -> Result<Value, UpstreamError> {
        self.download_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(status) = self.download_failure {
            return Err(UpstreamError::Status(status, "storage unavailable".to_string()));
        }

        let pending = self.pending_not_found.load(Ordering::SeqCst);
        if pending > 0 {
            self.pending_not_found.store(pending - 1, Ordering::SeqCst);
            return Err(UpstreamError::NotFoundTransient(request.traffic_light_id.clone()));
        }

        self.uploads
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|upload| {
                upload["type"] == "data"
                    && upload["traffic_light_id"] == request.traffic_light_id.as_str()
                    && upload["timestamp"] == request.timestamp
            })
            .cloned()
            .ok_or_else(|| UpstreamError::NotFoundTransient(request.traffic_light_id.clone()))
    }
}

/// How the stub optimizer answers
pub enum OptimizerReply {
    /// A JSON list with one result per sensor
    PerSensorList,
    /// One result for the reference light
    Single,
    /// An `optimizations` wrapper with one entry per sensor
    Wrapped,
    Fixed(Value),
}

pub struct StubOptimizer {
    reply: OptimizerReply,
    received: Mutex<Vec<TrafficEnvelope>>,
}

impl StubOptimizer {
    pub fn new(reply: OptimizerReply) -> Self {
        Self {
            reply,
            received: Mutex::new(Vec::new()),
        }
    }

    pub fn received(&self) -> Vec<TrafficEnvelope> {
        self.received.lock().unwrap().clone()
    }
}

#[async_trait]
impl OptimizationService for StubOptimizer {
    async fn evaluate(&self, envelope: &TrafficEnvelope) -> Result<Value, UpstreamError> {
        self.received.lock().unwrap().push(envelope.clone());

        let response = match &self.reply {
            OptimizerReply::PerSensorList => Value::Array(
                envelope
                    .sensor_ids()
                    .map(|id| optimization_json(id, &envelope.timestamp))
                    .collect(),
            ),
            OptimizerReply::Single => optimization_json(&envelope.traffic_light_id, &envelope.timestamp),
            OptimizerReply::Wrapped => json!({
                "version": "2.0",
                "type": "batch-optimization",
                "timestamp": envelope.timestamp,
                "reference_id": envelope.traffic_light_id,
                "sensor_count": envelope.sensors.len(),
                "optimizations": envelope
                    .sensor_ids()
                    .map(|id| {
                        let mut entry = optimization_json(id, &envelope.timestamp);
                        let fields = entry.as_object_mut().unwrap();
                        fields.remove("version");
                        fields.remove("type");
                        fields.remove("timestamp");
                        entry
                    })
                    .collect::<Vec<_>>()
            }),
            OptimizerReply::Fixed(value) => value.clone(),
        };
        Ok(response)
    }
}

pub async fn memory_index() -> MetadataIndex {
    MetadataIndex::new(init_memory_database().await.unwrap())
}

/// Pipeline over the given stubs with no retry delay
pub async fn pipeline(storage: Arc<StubStorage>, optimizer: Arc<StubOptimizer>) -> ProcessingPipeline {
    ProcessingPipeline::new(
        storage,
        optimizer,
        memory_index().await,
        ValidationLimits::default(),
        RetryPolicy::immediate(5),
    )
}

pub fn sensor_json(id: &str) -> Value {
    json!({
        "traffic_light_id": id,
        "controlled_edges": [format!("E{}-in", id), format!("E{}-out", id)],
        "metrics": {
            "vehicles_per_minute": 24,
            "avg_speed_kmh": 41.5,
            "avg_circulation_time_sec": 28.0,
            "density": 0.42
        },
        "vehicle_stats": {"motorcycle": 3, "car": 18, "bus": 1, "truck": 2}
    })
}

pub fn batch_json(reference: &str, ids: &[&str]) -> Value {
    json!({
        "version": "2.0",
        "type": "data",
        "timestamp": TIMESTAMP_ISO,
        "traffic_light_id": reference,
        "sensors": ids.iter().map(|id| sensor_json(id)).collect::<Vec<_>>()
    })
}

pub fn legacy_json(id: &str) -> Value {
    let mut payload = sensor_json(id);
    payload["version"] = json!("2.0");
    payload["type"] = json!("data");
    payload["timestamp"] = json!(TIMESTAMP_ISO);
    payload
}

pub fn optimization_json(id: &str, timestamp: &str) -> Value {
    json!({
        "version": "2.0",
        "type": "optimization",
        "timestamp": timestamp,
        "traffic_light_id": id,
        "optimization": {"green_time_sec": 42, "red_time_sec": 28},
        "impact": {
            "original_congestion": 6,
            "optimized_congestion": 3,
            "original_category": "severe",
            "optimized_category": "mild"
        }
    })
}

pub fn raw_json() -> Value {
    json!({
        "timestamp": "2025-05-19T11:20:00-03:00",
        "source_id": "TL-0042-corridor",
        "sensors": [
            {
                "traffic_light_id": "TL-0042",
                "controlled_edges": ["A1", "A2"],
                "metrics": {
                    "vehicles_per_minute": 30,
                    "avg_speed_kmh": 215.0,
                    "avg_circulation_time_sec": 40.0,
                    "density": 64.0
                }
            },
            {
                "traffic_light_id": "TL-0043",
                "controlled_edges": ["B1"],
                "metrics": {
                    "vehicles_per_minute": 12,
                    "avg_speed_kmh": 35.0,
                    "avg_circulation_time_sec": 22.0,
                    "density": 0.3
                },
                "vehicle_stats": {"car": 9, "bus": 1}
            }
        ]
    })
}
