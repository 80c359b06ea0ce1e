//! Scripted batch provider for recovery tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tagbatch_core::provider::{BatchProvider, ProviderBatch, ProviderError};

/// Scripted failure; materialized into a fresh `ProviderError` on every call
#[derive(Debug, Clone)]
pub enum MockFailure {
    Api { status: u16, message: String },
    Timeout,
}

impl MockFailure {
    fn to_error(&self, operation: &str) -> ProviderError {
        match self {
            Self::Api { status, message } => ProviderError::api_error(*status, message.clone()),
            Self::Timeout => ProviderError::Timeout {
                operation: operation.to_string(),
            },
        }
    }
}

/// Provider whose batch statuses and file contents are set by the test.
/// Unknown batches and files answer 404.
#[derive(Debug, Default)]
pub struct MockProvider {
    batches: Mutex<HashMap<String, Result<ProviderBatch, MockFailure>>>,
    files: Mutex<HashMap<String, Result<String, MockFailure>>>,
    content_delay: Mutex<Option<Duration>>,
    status_calls: AtomicUsize,
    content_calls: AtomicUsize,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_status(&self, batch_id: &str, status: &str) {
        self.batches
            .lock()
            .insert(batch_id.to_string(), Ok(ProviderBatch::new(batch_id, status)));
    }

    pub fn set_batch(&self, batch: ProviderBatch) {
        self.batches.lock().insert(batch.id.clone(), Ok(batch));
    }

    /// Mark the batch completed with `content` as its output file
    pub fn complete(&self, batch_id: &str, content: impl Into<String>) {
        let file_id = format!("file-{batch_id}");
        self.set_batch(ProviderBatch::new(batch_id, "completed").with_output_file(&file_id));
        self.files.lock().insert(file_id, Ok(content.into()));
    }

    pub fn fail_status(&self, batch_id: &str, failure: MockFailure) {
        self.batches.lock().insert(batch_id.to_string(), Err(failure));
    }

    pub fn fail_file(&self, file_id: &str, failure: MockFailure) {
        self.files.lock().insert(file_id.to_string(), Err(failure));
    }

    /// Delay every content download, to hold a lease open
    pub fn set_content_delay(&self, delay: Duration) {
        *self.content_delay.lock() = Some(delay);
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn content_calls(&self) -> usize {
        self.content_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BatchProvider for MockProvider {
    async fn get_status(&self, batch_id: &str) -> Result<ProviderBatch, ProviderError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        match self.batches.lock().get(batch_id) {
            Some(Ok(batch)) => Ok(batch.clone()),
            Some(Err(failure)) => Err(failure.to_error("get_status")),
            None => Err(ProviderError::api_error(404, format!("No batch found with id '{batch_id}'"))),
        }
    }

    async fn get_file_content(&self, file_id: &str) -> Result<String, ProviderError> {
        self.content_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.content_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match self.files.lock().get(file_id) {
            Some(Ok(content)) => Ok(content.clone()),
            Some(Err(failure)) => Err(failure.to_error("get_file_content")),
            None => Err(ProviderError::api_error(404, format!("No such File object: {file_id}"))),
        }
    }
}
