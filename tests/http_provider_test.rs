//! HTTP provider client against a mock OpenAI-compatible server.

use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tagbatch_core::config::ProviderConfig;
use tagbatch_core::provider::{BatchProvider, HttpBatchProvider, ProviderError, RequestThrottle};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config(server: &MockServer) -> ProviderConfig {
    ProviderConfig {
        base_url: format!("{}/v1/", server.uri()),
        api_key: Some("sk-test".to_string()),
        min_interval_ms: Some(0),
        max_rate_limit_retries: 1,
        ..ProviderConfig::default()
    }
}

#[tokio::test]
async fn test_get_status_decodes_batch() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/batches/batch_abc"))
        .and(header("authorization", "Bearer sk-test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "batch_abc",
            "object": "batch",
            "endpoint": "/v1/chat/completions",
            "status": "completed",
            "output_file_id": "file-out",
            "error_file_id": null,
            "request_counts": {"total": 2, "completed": 2, "failed": 0}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = HttpBatchProvider::new(&config(&server)).unwrap();
    let batch = provider.get_status("batch_abc").await.unwrap();

    assert_eq!(batch.id, "batch_abc");
    assert_eq!(batch.status, "completed");
    assert_eq!(batch.output_file_id.as_deref(), Some("file-out"));
    assert!(batch.errors.is_none());
}

#[tokio::test]
async fn test_get_file_content_returns_raw_text() {
    let server = MockServer::start().await;
    let body = "{\"custom_id\":\"tags:1\"}\n{\"custom_id\":\"tags:2\"}\n";
    Mock::given(method("GET"))
        .and(path("/v1/files/file-out/content"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(&server)
        .await;

    let provider = HttpBatchProvider::new(&config(&server)).unwrap();
    let content = provider.get_file_content("file-out").await.unwrap();

    assert_eq!(content, body);
}

#[tokio::test]
async fn test_missing_batch_is_reported_as_missing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/batches/batch_gone"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": {
                "message": "No batch found with id 'batch_gone'.",
                "type": "invalid_request_error"
            }
        })))
        .mount(&server)
        .await;

    let provider = HttpBatchProvider::new(&config(&server)).unwrap();
    let err = provider.get_status("batch_gone").await.unwrap_err();

    assert!(err.is_batch_missing());
    assert!(!err.is_recoverable());
    match err {
        ProviderError::ApiError { status, message, .. } => {
            assert_eq!(status, 404);
            assert_eq!(message, "No batch found with id 'batch_gone'.");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_rate_limited_request_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/batches/batch_rl"))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("retry-after", "0")
                .set_body_json(json!({"error": {"message": "Rate limit reached"}})),
        )
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/batches/batch_rl"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"id": "batch_rl", "status": "in_progress"})),
        )
        .with_priority(2)
        .mount(&server)
        .await;

    let provider = HttpBatchProvider::new(&config(&server)).unwrap();
    let batch = provider.get_status("batch_rl").await.unwrap();

    assert_eq!(batch.status, "in_progress");
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_rate_limit_retries_are_bounded() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/batches/batch_rl"))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("retry-after", "0")
                .set_body_json(json!({"error": {"message": "Rate limit reached"}})),
        )
        .expect(2)
        .mount(&server)
        .await;

    let provider = HttpBatchProvider::new(&config(&server)).unwrap();
    let err = provider.get_status("batch_rl").await.unwrap_err();

    assert!(err.is_recoverable());
    match err {
        ProviderError::ApiError {
            status, retry_after, ..
        } => {
            assert_eq!(status, 429);
            assert_eq!(retry_after, Some(0));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_malformed_status_body_is_invalid_response() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/batches/batch_bad"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>gateway</html>"))
        .mount(&server)
        .await;

    let provider = HttpBatchProvider::new(&config(&server)).unwrap();
    let err = provider.get_status("batch_bad").await.unwrap_err();

    assert!(matches!(err, ProviderError::InvalidResponse { .. }));
}

#[tokio::test]
async fn test_shared_throttle_spaces_requests() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/batches/batch_t"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "batch_t", "status": "validating"})))
        .mount(&server)
        .await;

    let throttle = Arc::new(RequestThrottle::new(Duration::from_millis(100)));
    let provider = HttpBatchProvider::with_throttle(&config(&server), throttle).unwrap();

    let started = Instant::now();
    for _ in 0..3 {
        provider.get_status("batch_t").await.unwrap();
    }

    assert!(started.elapsed() >= Duration::from_millis(200));
}

#[test]
fn test_empty_base_url_is_rejected() {
    let config = ProviderConfig {
        base_url: "  ".to_string(),
        ..ProviderConfig::default()
    };

    assert!(matches!(
        HttpBatchProvider::new(&config),
        Err(ProviderError::ConfigError(_))
    ));
}
