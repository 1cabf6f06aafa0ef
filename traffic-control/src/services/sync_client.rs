//! Optimization service client (`POST /evaluate`, single attempt)

use async_trait::async_trait;
use serde_json::Value;

use super::upstream::{endpoint, http_client, json_body, UpstreamError};
use crate::models::TrafficEnvelope;

#[async_trait]
pub trait OptimizationService: Send + Sync {
    /// Returns the service's answer unvalidated
    async fn evaluate(&self, envelope: &TrafficEnvelope) -> Result<Value, UpstreamError>;
}

pub struct HttpOptimizationClient {
    http_client: reqwest::Client,
    base_url: String,
}

impl HttpOptimizationClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, UpstreamError> {
        Ok(Self {
            http_client: http_client()?,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl OptimizationService for HttpOptimizationClient {
    async fn evaluate(&self, envelope: &TrafficEnvelope) -> Result<Value, UpstreamError> {
        let url = endpoint(&self.base_url, "evaluate");
        tracing::debug!(
            url = %url,
            traffic_light_id = %envelope.traffic_light_id,
            sensors = envelope.sensors.len(),
            "Requesting optimization"
        );

        let response = self.http_client.post(&url).json(envelope).send().await?;
        json_body(response).await
    }
}
