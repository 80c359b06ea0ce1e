//! # Provider Status/Content Client
//!
//! Contract the recovery cycle uses to ask the batch-inference provider about a job
//! and to download its output artifact, plus the HTTP implementation against an
//! OpenAI-compatible `/batches` + `/files` API.

pub mod http;
pub mod retry;
pub mod status;
pub mod throttle;

pub use http::HttpBatchProvider;
pub use retry::extract_retry_delay;
pub use status::{resolve_status, ProviderStatus, StatusResolution};
pub use throttle::{throttle_key, RequestThrottle};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Provider error type
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("API error: {status} - {message}")]
    ApiError {
        status: u16,
        message: String,
        /// Seconds from a numeric `Retry-After` header
        retry_after: Option<u64>,
    },

    #[error("Invalid response: {field} - {reason}")]
    InvalidResponse { field: String, reason: String },

    #[error("Timeout waiting for operation: {operation}")]
    Timeout { operation: String },

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl ProviderError {
    pub fn api_error(status: u16, message: impl Into<String>) -> Self {
        Self::ApiError {
            status,
            message: message.into(),
            retry_after: None,
        }
    }

    /// Transport failures, timeouts, rate limiting and server errors
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::HttpError(e) => e
                .status()
                .map_or(true, |s| s.is_server_error() || s.as_u16() == 429),
            Self::ApiError { status, .. } => *status == 429 || *status >= 500,
            Self::Timeout { .. } => true,
            Self::InvalidResponse { .. } | Self::ConfigError(_) => false,
        }
    }

    /// The provider does not know the batch or file
    pub fn is_batch_missing(&self) -> bool {
        matches!(self, Self::ApiError { status: 404, .. })
    }
}

/// Provider view of one batch job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderBatch {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub output_file_id: Option<String>,
    #[serde(default)]
    pub error_file_id: Option<String>,
    /// `{"data": [{"code", "message", ...}]}` when the provider rejected the batch
    #[serde(default)]
    pub errors: Option<serde_json::Value>,
}

impl ProviderBatch {
    pub fn new(id: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: status.into(),
            output_file_id: None,
            error_file_id: None,
            errors: None,
        }
    }

    pub fn with_output_file(mut self, file_id: impl Into<String>) -> Self {
        self.output_file_id = Some(file_id.into());
        self
    }

    /// Joined provider error messages, if any
    pub fn error_summary(&self) -> Option<String> {
        let messages: Vec<&str> = self
            .errors
            .as_ref()?
            .get("data")?
            .as_array()?
            .iter()
            .filter_map(|entry| entry.get("message").and_then(serde_json::Value::as_str))
            .collect();
        (!messages.is_empty()).then(|| messages.join("; "))
    }
}

#[async_trait]
pub trait BatchProvider: Send + Sync {
    async fn get_status(&self, batch_id: &str) -> Result<ProviderBatch, ProviderError>;

    async fn get_file_content(&self, file_id: &str) -> Result<String, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_error_classification() {
        assert!(ProviderError::api_error(429, "slow down").is_recoverable());
        assert!(ProviderError::api_error(503, "unavailable").is_recoverable());
        assert!(!ProviderError::api_error(401, "bad key").is_recoverable());
        assert!(ProviderError::api_error(404, "no such batch").is_batch_missing());
        assert!(ProviderError::Timeout {
            operation: "get_status".into()
        }
        .is_recoverable());
    }

    #[test]
    fn test_provider_batch_deserializes_openai_shape() {
        let batch: ProviderBatch = serde_json::from_value(json!({
            "id": "batch_abc",
            "object": "batch",
            "status": "failed",
            "output_file_id": null,
            "errors": {"object": "list", "data": [
                {"code": "invalid_request", "message": "line 1 malformed"},
                {"code": "invalid_request", "message": "line 2 malformed"}
            ]}
        }))
        .unwrap();

        assert_eq!(batch.status, "failed");
        assert!(batch.output_file_id.is_none());
        assert_eq!(
            batch.error_summary().as_deref(),
            Some("line 1 malformed; line 2 malformed")
        );
    }
}
