//! HTTP client for OpenAI-compatible batch APIs.

use super::retry::extract_retry_delay;
use super::throttle::{throttle_key, RequestThrottle};
use super::{BatchProvider, ProviderBatch, ProviderError};
use crate::config::ProviderConfig;
use crate::constants::defaults;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, AUTHORIZATION, RETRY_AFTER};
use reqwest::{Client, Response, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// [`BatchProvider`] over `GET {base_url}/batches/{id}` and
/// `GET {base_url}/files/{id}/content`.
///
/// Requests are spaced by a [`RequestThrottle`] keyed on provider and model. A
/// 429 response is retried up to `max_rate_limit_retries` times after the delay
/// the provider asked for.
#[derive(Clone)]
pub struct HttpBatchProvider {
    client: Client,
    base_url: String,
    throttle: Arc<RequestThrottle>,
    throttle_key: String,
    max_rate_limit_retries: u32,
}

impl std::fmt::Debug for HttpBatchProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpBatchProvider")
            .field("base_url", &self.base_url)
            .field("throttle_key", &self.throttle_key)
            .field("max_rate_limit_retries", &self.max_rate_limit_retries)
            .finish()
    }
}

impl HttpBatchProvider {
    pub fn new(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let throttle = Arc::new(RequestThrottle::new(config.effective_min_interval()));
        Self::with_throttle(config, throttle)
    }

    /// Share a throttle with other clients issuing requests for the same key
    pub fn with_throttle(
        config: &ProviderConfig,
        throttle: Arc<RequestThrottle>,
    ) -> Result<Self, ProviderError> {
        let base_url = config.base_url.trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(ProviderError::ConfigError(
                "provider base_url must not be empty".to_string(),
            ));
        }

        let mut headers = HeaderMap::new();
        match config.resolved_api_key() {
            Some(api_key) => {
                headers.insert(
                    AUTHORIZATION,
                    format!("Bearer {api_key}").parse().map_err(|e| {
                        ProviderError::ConfigError(format!("Invalid API key: {e}"))
                    })?,
                );
            }
            None => warn!(provider = %config.provider, "No API key configured for provider"),
        }

        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .user_agent(format!("tagbatch-core/{}", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .build()
            .map_err(|e| ProviderError::ConfigError(format!("Failed to create HTTP client: {e}")))?;

        info!(
            base_url = %base_url,
            provider = %config.provider,
            model = %config.model,
            timeout_ms = config.request_timeout_ms,
            "Created batch provider client"
        );

        Ok(Self {
            client,
            base_url,
            throttle,
            throttle_key: throttle_key(&config.provider, &config.model),
            max_rate_limit_retries: config.max_rate_limit_retries,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// GET with throttling and rate-limit retries; non-2xx becomes `ApiError`
    async fn get(&self, path: &str, operation: &str) -> Result<Response, ProviderError> {
        let url = self.url(path);
        let mut rate_limited = 0;

        loop {
            self.throttle.acquire(&self.throttle_key).await;

            let response = self.client.get(&url).send().await.map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout {
                        operation: operation.to_string(),
                    }
                } else {
                    ProviderError::HttpError(e)
                }
            })?;

            let status = response.status();
            if status.is_success() {
                debug!(operation = %operation, "Provider request succeeded");
                return Ok(response);
            }

            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string);
            let body = response.text().await.unwrap_or_default();
            let message = api_error_message(&body);

            if status == StatusCode::TOO_MANY_REQUESTS && rate_limited < self.max_rate_limit_retries {
                rate_limited += 1;
                let delay = extract_retry_delay(
                    &message,
                    retry_after.as_deref(),
                    Duration::from_millis(defaults::RATE_LIMIT_FALLBACK_MS),
                );
                warn!(
                    operation = %operation,
                    attempt = rate_limited,
                    delay_ms = delay.as_millis() as u64,
                    "Provider rate limited request, retrying"
                );
                tokio::time::sleep(delay).await;
                continue;
            }

            error!(operation = %operation, status = %status, error = %message, "Provider request failed");
            return Err(ProviderError::ApiError {
                status: status.as_u16(),
                message,
                retry_after: retry_after.and_then(|value| value.trim().parse().ok()),
            });
        }
    }
}

/// `error.message` from an OpenAI-style error body, else the raw body
fn api_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| {
            value
                .get("error")
                .and_then(|error| error.get("message"))
                .and_then(serde_json::Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.trim().to_string())
}

#[async_trait]
impl BatchProvider for HttpBatchProvider {
    async fn get_status(&self, batch_id: &str) -> Result<ProviderBatch, ProviderError> {
        let response = self
            .get(&format!("batches/{batch_id}"), "get_status")
            .await?;

        response
            .json::<ProviderBatch>()
            .await
            .map_err(|e| ProviderError::InvalidResponse {
                field: "batch".to_string(),
                reason: e.to_string(),
            })
    }

    async fn get_file_content(&self, file_id: &str) -> Result<String, ProviderError> {
        let response = self
            .get(&format!("files/{file_id}/content"), "get_file_content")
            .await?;

        response.text().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout {
                    operation: "get_file_content".to_string(),
                }
            } else {
                ProviderError::HttpError(e)
            }
        })
    }
}
