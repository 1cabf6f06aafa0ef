//! Errors from the storage and optimization services

use serde_json::Value;
use thiserror::Error;

/// Sent with every upstream request
pub const USER_AGENT: &str = concat!("traffic-control/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Upstream returned {0}: {1}")]
    Status(u16, String),

    #[error("Malformed upstream response: {0}")]
    MalformedResponse(String),

    /// Storage has not made the record visible yet; the only retried case
    #[error("Record not yet available: {0}")]
    NotFoundTransient(String),
}

impl UpstreamError {
    pub fn is_transient(&self) -> bool {
        matches!(self, UpstreamError::NotFoundTransient(_))
    }
}

impl From<reqwest::Error> for UpstreamError {
    fn from(err: reqwest::Error) -> Self {
        UpstreamError::Network(err.to_string())
    }
}

pub(crate) fn http_client() -> Result<reqwest::Client, UpstreamError> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| UpstreamError::Network(e.to_string()))
}

pub(crate) fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), path.trim_start_matches('/'))
}

/// Non-2xx becomes `Status` with the body text
pub(crate) async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, UpstreamError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(UpstreamError::Status(status.as_u16(), body))
}

pub(crate) async fn json_body(response: reqwest::Response) -> Result<Value, UpstreamError> {
    ensure_success(response)
        .await?
        .json()
        .await
        .map_err(|e| UpstreamError::MalformedResponse(e.to_string()))
}
