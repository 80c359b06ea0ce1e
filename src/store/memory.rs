//! # In-Memory Batch Store
//!
//! Process-local [`BatchStore`] and [`ResultsLedger`] with the same compare-and-set
//! semantics as the Postgres backend. Every operation takes the single mutex once,
//! which makes each mutation atomic the way a single SQL statement is.

use super::{BatchStore, CandidateQuery, ResultsLedger};
use crate::clock::{Clock, SystemClock};
use crate::error::{BatchError, Result};
use crate::models::{AppliedKey, AppliedResult, BatchJob, NewBatchJob};
use crate::state_machine::{validate_transition, BatchState};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

#[derive(Debug, Default)]
struct BatchTable {
    next_id: i64,
    jobs: BTreeMap<i64, BatchJob>,
}

impl BatchTable {
    fn by_batch_id_mut(&mut self, batch_id: &str) -> Option<&mut BatchJob> {
        self.jobs.values_mut().find(|job| job.batch_id == batch_id)
    }

    fn get_mut(&mut self, job_id: i64) -> Result<&mut BatchJob> {
        self.jobs
            .get_mut(&job_id)
            .ok_or_else(|| BatchError::not_found("BatchJob", job_id))
    }
}

#[derive(Debug)]
pub struct InMemoryBatchStore {
    table: Mutex<BatchTable>,
    clock: Arc<dyn Clock>,
}

impl InMemoryBatchStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            table: Mutex::new(BatchTable::default()),
            clock,
        }
    }

    /// Overwrite lease fields directly, simulating a worker that crashed mid-recovery
    pub fn force_lease(&self, job_id: i64, owner: &str, heartbeat_at: chrono::DateTime<chrono::Utc>) -> Result<()> {
        let mut table = self.table.lock();
        let job = table.get_mut(job_id)?;
        job.processing_owner = Some(owner.to_string());
        job.processing_heartbeat_at = Some(heartbeat_at);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.table.lock().jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryBatchStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BatchStore for InMemoryBatchStore {
    async fn record_submission(&self, job: NewBatchJob) -> Result<BatchJob> {
        let now = self.clock.now();
        let mut table = self.table.lock();

        if let Some(existing) = table.by_batch_id_mut(&job.batch_id) {
            return Ok(existing.clone());
        }

        table.next_id += 1;
        let record = BatchJob {
            id: table.next_id,
            batch_id: job.batch_id,
            flow: job.flow,
            task_id: job.task_id,
            status: BatchState::Submitted,
            output_file_id: None,
            processing_owner: None,
            processing_heartbeat_at: None,
            error_text: None,
            processed_at: None,
            created_at: now,
            updated_at: now,
        };
        table.jobs.insert(record.id, record.clone());
        Ok(record)
    }

    async fn find_by_id(&self, job_id: i64) -> Result<Option<BatchJob>> {
        Ok(self.table.lock().jobs.get(&job_id).cloned())
    }

    async fn find_by_batch_id(&self, batch_id: &str) -> Result<Option<BatchJob>> {
        Ok(self
            .table
            .lock()
            .jobs
            .values()
            .find(|job| job.batch_id == batch_id)
            .cloned())
    }

    async fn list_by_flow(&self, flow: &str) -> Result<Vec<BatchJob>> {
        Ok(self
            .table
            .lock()
            .jobs
            .values()
            .filter(|job| job.flow == flow)
            .cloned()
            .collect())
    }

    async fn list_candidates(&self, query: &CandidateQuery) -> Result<Vec<BatchJob>> {
        let now = self.clock.now();
        let limit = usize::try_from(query.limit.max(0)).unwrap_or(usize::MAX);

        let mut candidates: Vec<BatchJob> = self
            .table
            .lock()
            .jobs
            .values()
            .filter(|job| !job.status.is_terminal())
            .filter(|job| query.flow.as_deref().map_or(true, |flow| job.flow == flow))
            .filter(|job| query.task_id.map_or(true, |task_id| job.task_id == task_id))
            .filter(|job| job.lease_available(now, query.stale_minutes))
            .cloned()
            .collect();

        candidates.sort_by_key(|job| (job.created_at, job.id));
        candidates.truncate(limit);
        Ok(candidates)
    }

    async fn acquire_lease(&self, job_id: i64, owner: &str, stale_minutes: i64) -> Result<bool> {
        let now = self.clock.now();
        let mut table = self.table.lock();
        let Some(job) = table.jobs.get_mut(&job_id) else {
            return Ok(false);
        };

        if job.status.is_terminal() {
            return Ok(false);
        }
        if !(job.is_leased_by(owner) || job.lease_available(now, stale_minutes)) {
            return Ok(false);
        }

        job.processing_owner = Some(owner.to_string());
        job.processing_heartbeat_at = Some(now);
        job.updated_at = now;
        Ok(true)
    }

    async fn heartbeat(&self, job_id: i64, owner: &str) -> Result<bool> {
        let now = self.clock.now();
        let mut table = self.table.lock();
        match table.jobs.get_mut(&job_id) {
            Some(job) if job.is_leased_by(owner) => {
                job.processing_heartbeat_at = Some(now);
                job.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn update_status(
        &self,
        job_id: i64,
        status: BatchState,
        output_file_id: Option<&str>,
        error_text: Option<&str>,
    ) -> Result<BatchJob> {
        if status.is_applied() {
            return Err(BatchError::StateTransitionError(
                "applied is only reachable through mark_processed".to_string(),
            ));
        }

        let now = self.clock.now();
        let mut table = self.table.lock();
        let job = table.get_mut(job_id)?;
        validate_transition(job.status, status)?;

        job.status = status;
        if let Some(file_id) = output_file_id {
            job.output_file_id = Some(file_id.to_string());
        }
        if let Some(text) = error_text {
            job.error_text = Some(text.to_string());
        }
        job.updated_at = now;
        Ok(job.clone())
    }

    async fn record_error(&self, job_id: i64, error_text: &str) -> Result<()> {
        let now = self.clock.now();
        let mut table = self.table.lock();
        let job = table.get_mut(job_id)?;
        job.error_text = Some(error_text.to_string());
        job.updated_at = now;
        Ok(())
    }

    async fn mark_processed(&self, batch_id: &str) -> Result<BatchJob> {
        let now = self.clock.now();
        let mut table = self.table.lock();
        let job = table
            .by_batch_id_mut(batch_id)
            .ok_or_else(|| BatchError::not_found("BatchJob", batch_id))?;
        validate_transition(job.status, BatchState::Applied)?;

        job.status = BatchState::Applied;
        job.processed_at.get_or_insert(now);
        job.processing_owner = None;
        job.processing_heartbeat_at = None;
        job.updated_at = now;
        Ok(job.clone())
    }

    async fn release_lease(&self, job_id: i64, owner: &str) -> Result<bool> {
        let now = self.clock.now();
        let mut table = self.table.lock();
        match table.jobs.get_mut(&job_id) {
            Some(job) if job.is_leased_by(owner) => {
                job.processing_owner = None;
                job.processing_heartbeat_at = None;
                job.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[derive(Debug)]
pub struct InMemoryResultsLedger {
    entries: Mutex<HashMap<AppliedKey, AppliedResult>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryResultsLedger {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryResultsLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResultsLedger for InMemoryResultsLedger {
    async fn is_applied(&self, batch_id: &str, flow: &str, task_id: i64) -> Result<bool> {
        let key = AppliedKey::new(batch_id, flow, task_id);
        Ok(self.entries.lock().contains_key(&key))
    }

    async fn record_applied(
        &self,
        batch_id: &str,
        flow: &str,
        task_id: i64,
        rows_done: i64,
        rows_error: i64,
    ) -> Result<bool> {
        let key = AppliedKey::new(batch_id, flow, task_id);
        let mut entries = self.entries.lock();
        if entries.contains_key(&key) {
            return Ok(false);
        }

        entries.insert(
            key,
            AppliedResult {
                batch_id: batch_id.to_string(),
                flow: flow.to_string(),
                task_id,
                rows_done,
                rows_error,
                applied_at: self.clock.now(),
            },
        );
        Ok(true)
    }

    async fn find_applied(
        &self,
        batch_id: &str,
        flow: &str,
        task_id: i64,
    ) -> Result<Option<AppliedResult>> {
        let key = AppliedKey::new(batch_id, flow, task_id);
        Ok(self.entries.lock().get(&key).cloned())
    }

    async fn recent(&self, limit: i64) -> Result<Vec<AppliedResult>> {
        let mut all: Vec<AppliedResult> = self.entries.lock().values().cloned().collect();
        all.sort_by(|a, b| b.applied_at.cmp(&a.applied_at));
        all.truncate(usize::try_from(limit.max(0)).unwrap_or(usize::MAX));
        Ok(all)
    }
}
