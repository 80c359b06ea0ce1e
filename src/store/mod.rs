//! # Batch Record Store and Applied-Results Ledger
//!
//! Persistence contracts for the recovery cycle. The only operations that must be
//! transactional are lease acquisition (compare-and-set) and the ledger insert
//! (insert-or-ignore); every other mutation is a single statement.
//!
//! Two backends implement both traits:
//!
//! - [`postgres`] - production storage via SQLx
//! - [`memory`] - process-local storage with identical semantics, used by tests and
//!   dry runs

use crate::error::Result;
use crate::models::{AppliedResult, BatchJob, NewBatchJob};
use crate::state_machine::BatchState;
use async_trait::async_trait;

pub mod memory;
pub mod postgres;

pub use memory::{InMemoryBatchStore, InMemoryResultsLedger};
pub use postgres::{PgBatchStore, PgResultsLedger};

/// Candidate selection for a recovery cycle
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CandidateQuery {
    pub flow: Option<String>,
    pub task_id: Option<i64>,
    pub limit: i64,
    /// Heartbeat age after which a lease counts as abandoned; `0` ignores freshness
    pub stale_minutes: i64,
}

impl CandidateQuery {
    pub fn new(limit: i64, stale_minutes: i64) -> Self {
        Self {
            flow: None,
            task_id: None,
            limit,
            stale_minutes,
        }
    }

    pub fn with_flow(mut self, flow: Option<&str>) -> Self {
        self.flow = flow.map(str::to_string);
        self
    }

    pub fn with_task_id(mut self, task_id: Option<i64>) -> Self {
        self.task_id = task_id;
        self
    }
}

/// Persistent table of known batch jobs
#[async_trait]
pub trait BatchStore: Send + Sync {
    /// Record a newly submitted job. Returns the existing row when `batch_id` is known.
    async fn record_submission(&self, job: NewBatchJob) -> Result<BatchJob>;

    async fn find_by_id(&self, job_id: i64) -> Result<Option<BatchJob>>;

    async fn find_by_batch_id(&self, batch_id: &str) -> Result<Option<BatchJob>>;

    /// All jobs of one flow, oldest first
    async fn list_by_flow(&self, flow: &str) -> Result<Vec<BatchJob>>;

    /// Non-terminal jobs, oldest first, whose lease is free or stale
    async fn list_candidates(&self, query: &CandidateQuery) -> Result<Vec<BatchJob>>;

    /// Atomically claim the job for `owner`. Succeeds when the lease is unheld, stale,
    /// or already held by `owner`.
    async fn acquire_lease(&self, job_id: i64, owner: &str, stale_minutes: i64) -> Result<bool>;

    /// Refresh the heartbeat of a lease `owner` still holds
    async fn heartbeat(&self, job_id: i64, owner: &str) -> Result<bool>;

    /// Move to `status`, validated against the transition table
    async fn update_status(
        &self,
        job_id: i64,
        status: BatchState,
        output_file_id: Option<&str>,
        error_text: Option<&str>,
    ) -> Result<BatchJob>;

    /// Record failure detail without changing state
    async fn record_error(&self, job_id: i64, error_text: &str) -> Result<()>;

    /// Terminal success: sets `processed_at`, clears the lease, status `applied`
    async fn mark_processed(&self, batch_id: &str) -> Result<BatchJob>;

    /// Clear the lease if `owner` holds it; status is untouched
    async fn release_lease(&self, job_id: i64, owner: &str) -> Result<bool>;
}

/// Append-only idempotency record of applied batches
#[async_trait]
pub trait ResultsLedger: Send + Sync {
    async fn is_applied(&self, batch_id: &str, flow: &str, task_id: i64) -> Result<bool>;

    /// Insert-or-ignore. Returns `false` when the triple already existed; the existing
    /// record wins.
    async fn record_applied(
        &self,
        batch_id: &str,
        flow: &str,
        task_id: i64,
        rows_done: i64,
        rows_error: i64,
    ) -> Result<bool>;

    async fn find_applied(
        &self,
        batch_id: &str,
        flow: &str,
        task_id: i64,
    ) -> Result<Option<AppliedResult>>;

    /// Most recently applied entries, newest first
    async fn recent(&self, limit: i64) -> Result<Vec<AppliedResult>>;
}
