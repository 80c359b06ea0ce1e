//! # Recovery Cycle
//!
//! One pass over the non-terminal batch jobs: reconcile each with the provider,
//! download finished output, apply it, and record the application exactly once.
//!
//! Per job, in order:
//!
//! 1. Ledger already has the job: mark it processed (catch-up) and skip.
//! 2. Take the lease; another live owner means skip.
//! 3. Re-check the ledger under the lease.
//! 4. Ask the provider for status. Not finished: release and skip. Failed, expired
//!    or cancelled, or a non-retryable error: terminal failure. Retryable error or
//!    unknown status: record the error, stay non-terminal.
//! 5. Fetch the output, then record the job as completed. A fetch failure leaves
//!    the status untouched and is retried on a later cycle.
//! 6. Refresh the heartbeat, then apply the rows through the job's flow.
//! 7. Write the ledger entry, then mark the job processed.
//!
//! Errors never escape a job's boundary; they are logged, counted in
//! [`RecoverySummary::failed`], and the lease is released.

use crate::applier::{ApplySettings, ApplyStats, FlowApplier};
use crate::constants::defaults;
use crate::error::{BatchError, Result};
use crate::logging::log_batch_operation;
use crate::models::BatchJob;
use crate::provider::{resolve_status, BatchProvider, StatusResolution};
use crate::state_machine::{can_transition, BatchState};
use crate::store::{BatchStore, CandidateQuery, ResultsLedger};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

/// Counts reported by one `recover_once` call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoverySummary {
    pub inspected: usize,
    pub applied: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl RecoverySummary {
    fn record(&mut self, outcome: &JobOutcome) {
        self.inspected += 1;
        match outcome {
            JobOutcome::Applied(_) => self.applied += 1,
            JobOutcome::CaughtUp | JobOutcome::NotReady | JobOutcome::LeaseHeld => self.skipped += 1,
            JobOutcome::Failed(_) => self.failed += 1,
        }
    }
}

/// Result of recovering a single job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Applied(ApplyStats),
    /// Ledger already had the job; only the store was brought up to date
    CaughtUp,
    /// Provider has not finished the job
    NotReady,
    /// Another worker holds a live lease
    LeaseHeld,
    Failed(String),
}

pub struct RecoveryCycle {
    store: Arc<dyn BatchStore>,
    ledger: Arc<dyn ResultsLedger>,
    provider: Arc<dyn BatchProvider>,
    applier: Arc<FlowApplier>,
    settings: ApplySettings,
    worker_id: String,
    max_concurrency: usize,
    job_timeout: Duration,
}

impl std::fmt::Debug for RecoveryCycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecoveryCycle")
            .field("worker_id", &self.worker_id)
            .field("flows", &self.applier.flows())
            .field("max_concurrency", &self.max_concurrency)
            .field("job_timeout", &self.job_timeout)
            .finish()
    }
}

impl RecoveryCycle {
    pub fn new(
        store: Arc<dyn BatchStore>,
        ledger: Arc<dyn ResultsLedger>,
        provider: Arc<dyn BatchProvider>,
        applier: Arc<FlowApplier>,
        worker_id: impl Into<String>,
    ) -> Self {
        Self {
            store,
            ledger,
            provider,
            applier,
            settings: ApplySettings::default(),
            worker_id: worker_id.into(),
            max_concurrency: defaults::MAX_CONCURRENCY,
            job_timeout: Duration::from_secs(defaults::JOB_TIMEOUT_SECONDS),
        }
    }

    pub fn with_settings(mut self, settings: ApplySettings) -> Self {
        self.settings = settings;
        self
    }

    /// Jobs recovered in parallel; lease acquisition stays per-job atomic
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    pub fn with_job_timeout(mut self, job_timeout: Duration) -> Self {
        self.job_timeout = job_timeout;
        self
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Run one recovery pass.
    ///
    /// `flow` and `task_id` narrow the candidate set. `stale_minutes = 0` reclaims
    /// every outstanding lease. Only a failure to list candidates is returned as
    /// an error; per-job problems are counted in the summary.
    #[instrument(skip(self), fields(worker_id = %self.worker_id))]
    pub async fn recover_once(
        &self,
        limit: i64,
        flow: Option<&str>,
        task_id: Option<i64>,
        stale_minutes: i64,
    ) -> Result<RecoverySummary> {
        let query = CandidateQuery::new(limit, stale_minutes)
            .with_flow(flow)
            .with_task_id(task_id);
        let candidates = self.store.list_candidates(&query).await?;
        debug!(candidates = candidates.len(), "Recovery candidates listed");

        let outcomes: Vec<JobOutcome> = stream::iter(candidates)
            .map(|job| self.recover_job_bounded(job, stale_minutes))
            .buffer_unordered(self.max_concurrency)
            .collect()
            .await;

        let mut summary = RecoverySummary::default();
        for outcome in &outcomes {
            summary.record(outcome);
        }

        info!(
            inspected = summary.inspected,
            applied = summary.applied,
            skipped = summary.skipped,
            failed = summary.failed,
            "Recovery cycle finished"
        );
        Ok(summary)
    }

    /// Recover one job under the per-job timeout, converting every error into an outcome
    async fn recover_job_bounded(&self, job: BatchJob, stale_minutes: i64) -> JobOutcome {
        match tokio::time::timeout(self.job_timeout, self.recover_job(&job, stale_minutes)).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                error!(batch_id = %job.batch_id, flow = %job.flow, error = %e, "Batch recovery failed");
                self.release(&job).await;
                JobOutcome::Failed(e.to_string())
            }
            Err(_) => {
                let reason =
                    BatchError::Timeout(format!("recovery exceeded {:?}", self.job_timeout)).to_string();
                warn!(batch_id = %job.batch_id, flow = %job.flow, "{reason}");
                if let Err(e) = self.store.record_error(job.id, &reason).await {
                    warn!(batch_id = %job.batch_id, error = %e, "Failed to record timeout");
                }
                self.release(&job).await;
                JobOutcome::Failed(reason)
            }
        }
    }

    async fn recover_job(&self, job: &BatchJob, stale_minutes: i64) -> Result<JobOutcome> {
        if self.is_applied(job).await? {
            return self.catch_up(job).await;
        }

        if !self
            .store
            .acquire_lease(job.id, &self.worker_id, stale_minutes)
            .await?
        {
            debug!(batch_id = %job.batch_id, "Lease held by another worker");
            return Ok(JobOutcome::LeaseHeld);
        }

        // Another worker may have applied between the first check and our lease
        if self.is_applied(job).await? {
            return self.catch_up(job).await;
        }

        let batch = match self.provider.get_status(&job.batch_id).await {
            Ok(batch) => batch,
            Err(e) if e.is_batch_missing() => {
                return self
                    .fail_permanently(job, BatchState::Failed, format!("provider has no such batch: {e}"))
                    .await;
            }
            Err(e) if !e.is_recoverable() => {
                return self
                    .fail_permanently(job, BatchState::Failed, format!("status query rejected: {e}"))
                    .await;
            }
            Err(e) => {
                return self
                    .fail_transiently(job, format!("status query failed: {e}"))
                    .await;
            }
        };

        let output_file_id = match resolve_status(&batch) {
            StatusResolution::Ready { output_file_id } => output_file_id,
            StatusResolution::Pending(state) => return self.not_ready(job, state).await,
            StatusResolution::Terminal { state, reason } => {
                return self.fail_permanently(job, state, reason).await;
            }
            StatusResolution::Transient { reason } => return self.fail_transiently(job, reason).await,
        };

        let content = match self.provider.get_file_content(&output_file_id).await {
            Ok(content) => content,
            Err(e) => {
                return self
                    .fail_transiently(job, format!("output fetch failed: {e}"))
                    .await;
            }
        };

        self.store
            .update_status(job.id, BatchState::Completed, Some(&output_file_id), None)
            .await?;

        if !self.store.heartbeat(job.id, &self.worker_id).await? {
            warn!(batch_id = %job.batch_id, "Lease lost before apply");
            return Ok(JobOutcome::LeaseHeld);
        }

        let stats = match self
            .applier
            .apply(&job.flow, &content, &self.settings, job.task_id)
            .await
        {
            Ok(stats) => stats,
            Err(e) => return self.fail_transiently(job, format!("apply failed: {e}")).await,
        };

        // Ledger first: a crash before mark_processed is repaired by catch-up
        let inserted = self
            .ledger
            .record_applied(&job.batch_id, &job.flow, job.task_id, stats.rows_done, stats.rows_error)
            .await?;
        if !inserted {
            debug!(batch_id = %job.batch_id, "Ledger entry already present");
        }

        if let Err(e) = self.store.mark_processed(&job.batch_id).await {
            warn!(batch_id = %job.batch_id, error = %e, "mark_processed failed; next cycle will catch up");
            self.release(job).await;
        }

        log_batch_operation(
            "apply",
            &job.batch_id,
            Some(&job.flow),
            BatchState::Applied.as_str(),
            Some(&format!("rows_done={} rows_error={}", stats.rows_done, stats.rows_error)),
        );
        Ok(JobOutcome::Applied(stats))
    }

    async fn is_applied(&self, job: &BatchJob) -> Result<bool> {
        self.ledger
            .is_applied(&job.batch_id, &job.flow, job.task_id)
            .await
    }

    async fn catch_up(&self, job: &BatchJob) -> Result<JobOutcome> {
        if !can_transition(job.status, BatchState::Applied) {
            self.store
                .update_status(job.id, BatchState::Completed, None, None)
                .await?;
        }
        self.store.mark_processed(&job.batch_id).await?;

        log_batch_operation("catch_up", &job.batch_id, Some(&job.flow), BatchState::Applied.as_str(), None);
        Ok(JobOutcome::CaughtUp)
    }

    async fn not_ready(&self, job: &BatchJob, provider_state: BatchState) -> Result<JobOutcome> {
        if provider_state != job.status && can_transition(job.status, provider_state) {
            self.store
                .update_status(job.id, provider_state, None, None)
                .await?;
        }
        self.release(job).await;
        debug!(batch_id = %job.batch_id, state = %provider_state, "Batch not finished yet");
        Ok(JobOutcome::NotReady)
    }

    async fn fail_permanently(
        &self,
        job: &BatchJob,
        state: BatchState,
        reason: String,
    ) -> Result<JobOutcome> {
        // Expired is not reachable once the output was seen; record as failed
        let state = if can_transition(job.status, state) {
            state
        } else {
            BatchState::Failed
        };

        self.store
            .update_status(job.id, state, None, Some(&reason))
            .await?;
        self.release(job).await;

        log_batch_operation("fail", &job.batch_id, Some(&job.flow), state.as_str(), Some(&reason));
        Ok(JobOutcome::Failed(reason))
    }

    async fn fail_transiently(&self, job: &BatchJob, reason: String) -> Result<JobOutcome> {
        warn!(batch_id = %job.batch_id, flow = %job.flow, reason = %reason, "Batch recovery deferred");
        self.store.record_error(job.id, &reason).await?;
        self.release(job).await;
        Ok(JobOutcome::Failed(reason))
    }

    async fn release(&self, job: &BatchJob) {
        if let Err(e) = self.store.release_lease(job.id, &self.worker_id).await {
            warn!(batch_id = %job.batch_id, error = %e, "Failed to release lease");
        }
    }
}
