//! Storage service client
//!
//! `POST /upload` persists a batch, `POST /download` fetches it back. A 404 on
//! download means the record is not visible yet and is reported as
//! [`UpstreamError::NotFoundTransient`] so the caller may retry.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::upstream::{endpoint, ensure_success, http_client, json_body, UpstreamError};
use crate::models::{DataType, OptimizationBatch, StoredDataEnvelope};

/// Lookup key for a stored batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadRequest {
    pub traffic_light_id: String,
    pub timestamp: i64,
    #[serde(rename = "type")]
    pub data_type: DataType,
}

/// Anything the storage service accepts on `/upload`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StorageUpload {
    Data(StoredDataEnvelope),
    Optimization(OptimizationBatch),
}

#[async_trait]
pub trait StorageService: Send + Sync {
    async fn upload(&self, payload: &StorageUpload) -> Result<(), UpstreamError>;

    /// Raw JSON as stored; timestamps come back as Unix integers
    async fn download(&self, request: &DownloadRequest) -> Result<Value, UpstreamError>;
}

pub struct HttpStorageClient {
    http_client: reqwest::Client,
    base_url: String,
}

impl HttpStorageClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, UpstreamError> {
        Ok(Self {
            http_client: http_client()?,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl StorageService for HttpStorageClient {
    async fn upload(&self, payload: &StorageUpload) -> Result<(), UpstreamError> {
        let url = endpoint(&self.base_url, "upload");
        tracing::debug!(url = %url, "Uploading to storage");

        let response = self.http_client.post(&url).json(payload).send().await?;
        ensure_success(response).await?;
        Ok(())
    }

    async fn download(&self, request: &DownloadRequest) -> Result<Value, UpstreamError> {
        let url = endpoint(&self.base_url, "download");
        tracing::debug!(
            url = %url,
            traffic_light_id = %request.traffic_light_id,
            timestamp = request.timestamp,
            data_type = %request.data_type,
            "Downloading from storage"
        );

        let response = self.http_client.post(&url).json(request).send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(UpstreamError::NotFoundTransient(format!(
                "{} {} at {}",
                request.data_type, request.traffic_light_id, request.timestamp
            )));
        }
        json_body(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_download_request_wire_form() {
        let request = DownloadRequest {
            traffic_light_id: "21".to_string(),
            timestamp: 1_747_664_400,
            data_type: DataType::Data,
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({"traffic_light_id": "21", "timestamp": 1_747_664_400, "type": "data"})
        );
    }

    #[test]
    fn test_client_creation() {
        assert!(HttpStorageClient::new("http://localhost:8000").is_ok());
    }
}
