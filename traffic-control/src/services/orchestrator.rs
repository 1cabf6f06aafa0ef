//! Processing orchestrator
//!
//! One run takes a traffic payload through
//! validate → upload → register → download (retried) → optimize →
//! validate optimized → upload optimized → register optimizations.
//! The first unrecovered failure ends the run and carries the stage it
//! happened at.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, info, info_span, warn, Instrument};
use traffic_common::TimestampPolicy;
use uuid::Uuid;

use super::storage_client::{DownloadRequest, StorageService, StorageUpload};
use super::sync_client::OptimizationService;
use super::upstream::UpstreamError;
use crate::db::MetadataIndex;
use crate::formatter::DataFormatter;
use crate::models::{
    DataType, EnvelopeShape, IncomingEnvelope, OptimizationBatch, OptimizationResponse,
    RawSimulationPayload, StoredDataEnvelope, TrafficEnvelope,
};
use crate::validator::{SchemaValidator, ValidationError, ValidationLimits};

/// Backoff for the storage download
///
/// Failed attempt `n` (from 0) waits `min(base * 2^n, max)` before the next
/// one. With the defaults that is 2, 4, 8, 10, 10 seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Same attempt count, no waiting
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Sum of all delays when every attempt fails
    pub fn worst_case_wait(&self) -> Duration {
        (0..self.max_attempts).map(|n| self.delay_after(n)).sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Validate,
    Upload,
    RegisterMetadata,
    Download,
    Optimize,
    ValidateOptimized,
    UploadOptimized,
    RegisterOptimizationMetadata,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Validate => "validate",
            PipelineStage::Upload => "upload",
            PipelineStage::RegisterMetadata => "register_metadata",
            PipelineStage::Download => "download",
            PipelineStage::Optimize => "optimize",
            PipelineStage::ValidateOptimized => "validate_optimized",
            PipelineStage::UploadOptimized => "upload_optimized",
            PipelineStage::RegisterOptimizationMetadata => "register_optimization_metadata",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What went wrong, independent of where
#[derive(Debug, Error)]
pub enum ProcessError {
    /// Neither `sensors` nor inline sensor fields
    #[error("Unrecognized payload shape: {0}")]
    UnrecognizedShape(String),

    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error(transparent)]
    Persistence(#[from] traffic_common::Error),
}

#[derive(Debug, Error)]
#[error("{stage} failed: {source}")]
pub struct PipelineError {
    pub stage: PipelineStage,
    #[source]
    pub source: ProcessError,
}

/// Attach a stage to any error convertible into [`ProcessError`]
trait AtStage<T> {
    fn at(self, stage: PipelineStage) -> Result<T, PipelineError>;
}

impl<T, E: Into<ProcessError>> AtStage<T> for Result<T, E> {
    fn at(self, stage: PipelineStage) -> Result<T, PipelineError> {
        self.map_err(|e| PipelineError {
            stage,
            source: e.into(),
        })
    }
}

/// Summary of a successful run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessOutcome {
    pub data_type: DataType,
    pub traffic_light_id: String,
    /// Canonical ISO timestamp of the processed batch
    pub timestamp: String,
    pub sensor_count: usize,
    pub optimization_count: usize,
}

pub struct ProcessingPipeline {
    storage: Arc<dyn StorageService>,
    optimizer: Arc<dyn OptimizationService>,
    index: MetadataIndex,
    validator: SchemaValidator,
    formatter: DataFormatter,
    retry: RetryPolicy,
}

impl ProcessingPipeline {
    pub fn new(
        storage: Arc<dyn StorageService>,
        optimizer: Arc<dyn OptimizationService>,
        index: MetadataIndex,
        limits: ValidationLimits,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            storage,
            optimizer,
            index,
            validator: SchemaValidator::new(limits),
            formatter: DataFormatter::new(limits),
            retry,
        }
    }

    pub fn index(&self) -> &MetadataIndex {
        &self.index
    }

    fn timestamps(&self) -> &TimestampPolicy {
        &self.validator.limits().timestamps
    }

    /// Run a batch or legacy single-sensor payload through the pipeline
    pub async fn process_value(&self, payload: Value) -> Result<ProcessOutcome, PipelineError> {
        let run_id = Uuid::new_v4();
        traced(self.process_inner(payload))
            .instrument(info_span!("pipeline", %run_id, entry = "process"))
            .await
    }

    /// Check and format raw simulation output, then run the pipeline
    pub async fn ingest_raw(&self, payload: Value) -> Result<ProcessOutcome, PipelineError> {
        let run_id = Uuid::new_v4();
        traced(self.ingest_inner(payload))
            .instrument(info_span!("pipeline", %run_id, entry = "ingest"))
            .await
    }

    async fn process_inner(&self, payload: Value) -> Result<ProcessOutcome, PipelineError> {
        use PipelineStage::Validate;

        let shape = EnvelopeShape::detect(&payload)
            .ok_or_else(|| {
                ProcessError::UnrecognizedShape(
                    "expected a 'sensors' list or inline sensor fields".to_string(),
                )
            })
            .at(Validate)?;

        self.validator.validate(&payload).at(Validate)?;
        require_data_type(&payload).at(Validate)?;

        let incoming = IncomingEnvelope::from_value(shape, payload)
            .map_err(|e| ValidationError::new("payload", e.to_string()))
            .at(Validate)?;
        debug!(shape = ?incoming.shape(), "Resolved payload shape");

        let (envelope, unix) = incoming
            .into_canonical(self.timestamps())
            .map_err(|e| ValidationError::new("timestamp", e.to_string()))
            .at(Validate)?;

        self.run(envelope, unix).await
    }

    async fn ingest_inner(&self, payload: Value) -> Result<ProcessOutcome, PipelineError> {
        use PipelineStage::Validate;

        let raw: RawSimulationPayload = serde_json::from_value(payload)
            .map_err(|e| ValidationError::new("payload", e.to_string()))
            .at(Validate)?;
        debug!(source_id = %raw.source_id, sensors = raw.sensors.len(), "Formatting raw payload");

        self.formatter.check_raw(&raw).at(Validate)?;
        let envelope = self.formatter.format(&raw).at(Validate)?;

        let formatted = serde_json::to_value(&envelope)
            .map_err(|e| ValidationError::new("payload", e.to_string()))
            .at(Validate)?;
        self.validator.validate(&formatted).at(Validate)?;

        let unix = self
            .timestamps()
            .to_unix(&envelope.timestamp)
            .map_err(|e| ValidationError::new("timestamp", e.to_string()))
            .at(Validate)?;

        self.run(envelope, unix).await
    }

    /// Everything after ingress; `envelope` is canonical and validated
    async fn run(&self, envelope: TrafficEnvelope, unix: i64) -> Result<ProcessOutcome, PipelineError> {
        info!(
            traffic_light_id = %envelope.traffic_light_id,
            timestamp = %envelope.timestamp,
            sensors = envelope.sensors.len(),
            "Processing traffic data"
        );

        let upload = StorageUpload::Data(envelope.to_storage(unix));
        self.storage.upload(&upload).await.at(PipelineStage::Upload)?;

        self.index
            .register(envelope.data_type.as_str(), unix, &envelope.traffic_light_id)
            .await
            .at(PipelineStage::RegisterMetadata)?;

        let request = DownloadRequest {
            traffic_light_id: envelope.traffic_light_id.clone(),
            timestamp: unix,
            data_type: envelope.data_type,
        };
        let downloaded = self
            .download_with_retry(&request)
            .await
            .at(PipelineStage::Download)?;
        let synced = self.prepare_sync_input(downloaded).at(PipelineStage::Download)?;

        let response = self
            .optimizer
            .evaluate(&synced)
            .await
            .at(PipelineStage::Optimize)?;

        let (batch, registrations) = self
            .prepare_optimizations(response)
            .at(PipelineStage::ValidateOptimized)?;

        self.storage
            .upload(&StorageUpload::Optimization(batch))
            .await
            .at(PipelineStage::UploadOptimized)?;

        for (traffic_light_id, timestamp) in &registrations {
            self.index
                .register(DataType::Optimization.as_str(), *timestamp, traffic_light_id)
                .await
                .at(PipelineStage::RegisterOptimizationMetadata)?;
        }

        Ok(ProcessOutcome {
            data_type: envelope.data_type,
            traffic_light_id: envelope.traffic_light_id,
            timestamp: envelope.timestamp,
            sensor_count: envelope.sensors.len(),
            optimization_count: registrations.len(),
        })
    }

    /// Retry only while storage reports the record as not yet visible
    pub async fn download_with_retry(&self, request: &DownloadRequest) -> Result<Value, UpstreamError> {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            match self.storage.download(request).await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(attempt = attempt + 1, "Download succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) if err.is_transient() => {
                    let delay = self.retry.delay_after(attempt);
                    attempt += 1;
                    warn!(
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "Stored data not yet available"
                    );
                    tokio::time::sleep(delay).await;

                    if attempt >= max_attempts {
                        error!(attempts = attempt, "Download retries exhausted");
                        return Err(err);
                    }
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Unix timestamp back to ISO, narrow check, then the typed envelope
    fn prepare_sync_input(&self, mut downloaded: Value) -> Result<TrafficEnvelope, ProcessError> {
        if let Some(unix) = downloaded.get("timestamp").and_then(Value::as_i64) {
            let iso = self
                .timestamps()
                .to_iso(unix)
                .map_err(|e| ValidationError::new("timestamp", e.to_string()))?;
            downloaded["timestamp"] = Value::String(iso);
        }

        self.validator.validate_sync_input(&downloaded)?;

        let stored: StoredDataEnvelope = serde_json::from_value(downloaded)
            .map_err(|e| UpstreamError::MalformedResponse(e.to_string()))?;
        let envelope = stored
            .into_canonical(self.timestamps())
            .map_err(|e| ValidationError::new("timestamp", e.to_string()))?;
        Ok(envelope)
    }

    /// Validate the optimization answer and build the storage upload
    ///
    /// Also returns the `(traffic_light_id, unix)` pair to register for each
    /// result.
    fn prepare_optimizations(
        &self,
        response: Value,
    ) -> Result<(OptimizationBatch, Vec<(String, i64)>), ProcessError> {
        self.validator.validate_optimization_response(&response)?;

        let batch = OptimizationResponse::from_value(response)
            .map_err(|e| UpstreamError::MalformedResponse(e.to_string()))?
            .into_batch()
            .ok_or_else(|| UpstreamError::MalformedResponse("no optimization results".to_string()))?;

        let policy = self.timestamps();
        let registrations = batch
            .optimizations
            .iter()
            .map(|result| {
                policy
                    .normalize(&result.timestamp)
                    .map(|(_, unix)| (result.traffic_light_id.clone(), unix))
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| ValidationError::new("optimizations.timestamp", e.to_string()))?;

        let stored = batch
            .for_storage(policy)
            .map_err(|e| ValidationError::new("timestamp", e.to_string()))?;
        Ok((stored, registrations))
    }
}

async fn traced(
    run: impl std::future::Future<Output = Result<ProcessOutcome, PipelineError>>,
) -> Result<ProcessOutcome, PipelineError> {
    let result = run.await;
    match &result {
        Ok(outcome) => info!(
            traffic_light_id = %outcome.traffic_light_id,
            sensors = outcome.sensor_count,
            optimizations = outcome.optimization_count,
            "Pipeline completed"
        ),
        Err(err) => error!(stage = %err.stage, error = %err.source, "Pipeline failed"),
    }
    result
}

/// Only sensor data enters the pipeline
fn require_data_type(payload: &Value) -> Result<(), ValidationError> {
    match payload.get("type").and_then(Value::as_str) {
        Some(t) if t == DataType::Data.as_str() => Ok(()),
        other => Err(ValidationError::new(
            "type",
            format!("only 'data' payloads can be processed, got {:?}", other.unwrap_or("")),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_delays() {
        let policy = RetryPolicy::default();
        let delays: Vec<u64> = (0..5).map(|n| policy.delay_after(n).as_secs()).collect();
        assert_eq!(delays, vec![2, 4, 8, 10, 10]);
        assert_eq!(policy.worst_case_wait(), Duration::from_secs(34));
    }

    #[test]
    fn test_delay_saturates_for_large_attempts() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_after(40), Duration::from_secs(10));
    }

    #[test]
    fn test_immediate_policy_never_waits() {
        let policy = RetryPolicy::immediate(5);
        assert_eq!(policy.worst_case_wait(), Duration::ZERO);
        assert_eq!(policy.max_attempts, 5);
    }

    #[test]
    fn test_pipeline_error_names_stage() {
        let err = PipelineError {
            stage: PipelineStage::Download,
            source: ProcessError::Upstream(UpstreamError::Status(503, "busy".to_string())),
        };
        assert_eq!(err.to_string(), "download failed: Upstream returned 503: busy");
    }

    #[test]
    fn test_require_data_type() {
        assert!(require_data_type(&serde_json::json!({"type": "data"})).is_ok());
        let err = require_data_type(&serde_json::json!({"type": "optimization"})).unwrap_err();
        assert_eq!(err.field, "type");
    }
}
