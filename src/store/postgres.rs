//! # Postgres Batch Store
//!
//! SQLx-backed [`BatchStore`] and [`ResultsLedger`].
//!
//! Lease acquisition is one conditional `UPDATE` whose `WHERE` clause encodes the
//! staleness rule, so under concurrent workers Postgres row locking serialises the
//! attempts and at most one sees `rows_affected() == 1` for a fresh lease. State
//! changes are guarded the same way with `status = ANY(allowed_from)`.
//!
//! ```rust,no_run
//! use tagbatch_core::store::{BatchStore, CandidateQuery, PgBatchStore};
//! use sqlx::PgPool;
//!
//! # async fn example(pool: PgPool) -> Result<(), Box<dyn std::error::Error>> {
//! let store = PgBatchStore::new(pool);
//! let candidates = store
//!     .list_candidates(&CandidateQuery::new(50, 15).with_flow(Some("translate_name_tags")))
//!     .await?;
//!
//! for job in candidates {
//!     if store.acquire_lease(job.id, "worker-host123", 15).await? {
//!         // recover the job...
//!         store.release_lease(job.id, "worker-host123").await?;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

use super::{BatchStore, CandidateQuery, ResultsLedger};
use crate::error::{BatchError, Result};
use crate::models::{AppliedResult, BatchJob, NewBatchJob};
use crate::state_machine::transitions::allowed_predecessor_names;
use crate::state_machine::BatchState;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{debug, error, instrument, warn};

const BATCH_COLUMNS: &str = "id, batch_id, flow, task_id, status, output_file_id, \
     processing_owner, processing_heartbeat_at, error_text, processed_at, created_at, updated_at";

const APPLIED_COLUMNS: &str = "batch_id, flow, task_id, rows_done, rows_error, applied_at";

fn non_terminal_names() -> Vec<String> {
    BatchState::NON_TERMINAL
        .iter()
        .map(|s| s.as_str().to_string())
        .collect()
}

/// Postgres `make_interval` takes INT minutes
fn stale_minutes_param(stale_minutes: i64) -> i32 {
    i32::try_from(stale_minutes.max(0)).unwrap_or(i32::MAX)
}

#[derive(Debug, Clone)]
pub struct PgBatchStore {
    pool: PgPool,
}

impl PgBatchStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn fetch_one_by(&self, column: &str, value: &str) -> Result<Option<BatchJob>> {
        let query = format!("SELECT {BATCH_COLUMNS} FROM batches WHERE {column} = $1");
        let row = sqlx::query_as::<_, BatchJobRow>(&query)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;
        row.map(BatchJob::try_from).transpose()
    }
}

#[async_trait]
impl BatchStore for PgBatchStore {
    #[instrument(skip(self, job), fields(batch_id = %job.batch_id, flow = %job.flow))]
    async fn record_submission(&self, job: NewBatchJob) -> Result<BatchJob> {
        let query = format!(
            r#"
            INSERT INTO batches (batch_id, flow, task_id, status, created_at, updated_at)
            VALUES ($1, $2, $3, 'submitted', NOW(), NOW())
            ON CONFLICT (batch_id) DO NOTHING
            RETURNING {BATCH_COLUMNS}
            "#
        );

        let inserted = sqlx::query_as::<_, BatchJobRow>(&query)
            .bind(&job.batch_id)
            .bind(&job.flow)
            .bind(job.task_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!("Failed to record batch submission: {}", e);
                BatchError::DatabaseError(format!("Batch submission insert failed: {e}"))
            })?;

        match inserted {
            Some(row) => BatchJob::try_from(row),
            None => {
                debug!("Batch already recorded, returning existing row");
                self.find_by_batch_id(&job.batch_id)
                    .await?
                    .ok_or_else(|| BatchError::not_found("BatchJob", &job.batch_id))
            }
        }
    }

    async fn find_by_id(&self, job_id: i64) -> Result<Option<BatchJob>> {
        let query = format!("SELECT {BATCH_COLUMNS} FROM batches WHERE id = $1");
        let row = sqlx::query_as::<_, BatchJobRow>(&query)
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(BatchJob::try_from).transpose()
    }

    async fn find_by_batch_id(&self, batch_id: &str) -> Result<Option<BatchJob>> {
        self.fetch_one_by("batch_id", batch_id).await
    }

    async fn list_by_flow(&self, flow: &str) -> Result<Vec<BatchJob>> {
        let query = format!("SELECT {BATCH_COLUMNS} FROM batches WHERE flow = $1 ORDER BY created_at, id");
        let rows = sqlx::query_as::<_, BatchJobRow>(&query)
            .bind(flow)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(BatchJob::try_from).collect()
    }

    #[instrument(skip(self))]
    async fn list_candidates(&self, query: &CandidateQuery) -> Result<Vec<BatchJob>> {
        let sql = format!(
            r#"
            SELECT {BATCH_COLUMNS}
            FROM batches
            WHERE status = ANY($1)
              AND ($2::TEXT IS NULL OR flow = $2)
              AND ($3::BIGINT IS NULL OR task_id = $3)
              AND ($4::INT <= 0
                   OR processing_owner IS NULL
                   OR processing_heartbeat_at IS NULL
                   OR processing_heartbeat_at < NOW() - make_interval(mins => $4::INT))
            ORDER BY created_at ASC, id ASC
            LIMIT $5
            "#
        );

        let rows = sqlx::query_as::<_, BatchJobRow>(&sql)
            .bind(non_terminal_names())
            .bind(query.flow.as_deref())
            .bind(query.task_id)
            .bind(stale_minutes_param(query.stale_minutes))
            .bind(query.limit.max(0))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                error!("Failed to list recovery candidates: {}", e);
                BatchError::DatabaseError(format!("Candidate listing failed: {e}"))
            })?;

        debug!(count = rows.len(), "Listed recovery candidates");
        rows.into_iter().map(BatchJob::try_from).collect()
    }

    #[instrument(skip(self))]
    async fn acquire_lease(&self, job_id: i64, owner: &str, stale_minutes: i64) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE batches
            SET processing_owner = $2,
                processing_heartbeat_at = NOW(),
                updated_at = NOW()
            WHERE id = $1
              AND status = ANY($4)
              AND (processing_owner IS NULL
                   OR processing_owner = $2
                   OR $3::INT <= 0
                   OR processing_heartbeat_at IS NULL
                   OR processing_heartbeat_at < NOW() - make_interval(mins => $3::INT))
            "#,
        )
        .bind(job_id)
        .bind(owner)
        .bind(stale_minutes_param(stale_minutes))
        .bind(non_terminal_names())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to acquire lease for job {}: {}", job_id, e);
            BatchError::DatabaseError(format!("Lease acquisition failed: {e}"))
        })?;

        let acquired = result.rows_affected() == 1;
        debug!(job_id, acquired, "Lease acquisition attempted");
        Ok(acquired)
    }

    async fn heartbeat(&self, job_id: i64, owner: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE batches
            SET processing_heartbeat_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND processing_owner = $2
            "#,
        )
        .bind(job_id)
        .bind(owner)
        .execute(&self.pool)
        .await?;

        let extended = result.rows_affected() == 1;
        if !extended {
            warn!(job_id, owner, "Lease heartbeat skipped (lease not held by this worker)");
        }
        Ok(extended)
    }

    #[instrument(skip(self))]
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

        let query = format!(
            r#"
            UPDATE batches
            SET status = $2,
                output_file_id = COALESCE($3, output_file_id),
                error_text = COALESCE($4, error_text),
                updated_at = NOW()
            WHERE id = $1 AND status = ANY($5)
            RETURNING {BATCH_COLUMNS}
            "#
        );

        let updated = sqlx::query_as::<_, BatchJobRow>(&query)
            .bind(job_id)
            .bind(status.as_str())
            .bind(output_file_id)
            .bind(error_text)
            .bind(allowed_predecessor_names(status))
            .fetch_optional(&self.pool)
            .await?;

        match updated {
            Some(row) => BatchJob::try_from(row),
            None => match self.find_by_id(job_id).await? {
                Some(current) => Err(BatchError::InvalidTransition {
                    from: current.status.to_string(),
                    to: status.to_string(),
                }),
                None => Err(BatchError::not_found("BatchJob", job_id)),
            },
        }
    }

    async fn record_error(&self, job_id: i64, error_text: &str) -> Result<()> {
        let result = sqlx::query(
            "UPDATE batches SET error_text = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(job_id)
        .bind(error_text)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(BatchError::not_found("BatchJob", job_id));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn mark_processed(&self, batch_id: &str) -> Result<BatchJob> {
        let query = format!(
            r#"
            UPDATE batches
            SET status = 'applied',
                processed_at = COALESCE(processed_at, NOW()),
                processing_owner = NULL,
                processing_heartbeat_at = NULL,
                updated_at = NOW()
            WHERE batch_id = $1 AND status = ANY($2)
            RETURNING {BATCH_COLUMNS}
            "#
        );

        let updated = sqlx::query_as::<_, BatchJobRow>(&query)
            .bind(batch_id)
            .bind(allowed_predecessor_names(BatchState::Applied))
            .fetch_optional(&self.pool)
            .await?;

        match updated {
            Some(row) => BatchJob::try_from(row),
            None => match self.find_by_batch_id(batch_id).await? {
                Some(current) => Err(BatchError::InvalidTransition {
                    from: current.status.to_string(),
                    to: BatchState::Applied.to_string(),
                }),
                None => Err(BatchError::not_found("BatchJob", batch_id)),
            },
        }
    }

    async fn release_lease(&self, job_id: i64, owner: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE batches
            SET processing_owner = NULL, processing_heartbeat_at = NULL, updated_at = NOW()
            WHERE id = $1 AND processing_owner = $2
            "#,
        )
        .bind(job_id)
        .bind(owner)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to release lease for job {}: {}", job_id, e);
            BatchError::DatabaseError(format!("Lease release failed: {e}"))
        })?;

        Ok(result.rows_affected() == 1)
    }
}

#[derive(Debug, Clone)]
pub struct PgResultsLedger {
    pool: PgPool,
}

impl PgResultsLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ResultsLedger for PgResultsLedger {
    async fn is_applied(&self, batch_id: &str, flow: &str, task_id: i64) -> Result<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM batch_results_applied
                WHERE batch_id = $1 AND flow = $2 AND task_id = $3
            )
            "#,
        )
        .bind(batch_id)
        .bind(flow)
        .bind(task_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    #[instrument(skip(self))]
    async fn record_applied(
        &self,
        batch_id: &str,
        flow: &str,
        task_id: i64,
        rows_done: i64,
        rows_error: i64,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO batch_results_applied
                (batch_id, flow, task_id, rows_done, rows_error, applied_at)
            VALUES ($1, $2, $3, $4, $5, NOW())
            ON CONFLICT (batch_id, flow, task_id) DO NOTHING
            "#,
        )
        .bind(batch_id)
        .bind(flow)
        .bind(task_id)
        .bind(rows_done)
        .bind(rows_error)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to record applied batch {}: {}", batch_id, e);
            BatchError::DatabaseError(format!("Ledger insert failed: {e}"))
        })?;

        let inserted = result.rows_affected() == 1;
        if !inserted {
            debug!(batch_id, flow, task_id, "Ledger entry already present, keeping existing record");
        }
        Ok(inserted)
    }

    async fn find_applied(
        &self,
        batch_id: &str,
        flow: &str,
        task_id: i64,
    ) -> Result<Option<AppliedResult>> {
        let query = format!(
            "SELECT {APPLIED_COLUMNS} FROM batch_results_applied \
             WHERE batch_id = $1 AND flow = $2 AND task_id = $3"
        );
        let row = sqlx::query_as::<_, AppliedResultRow>(&query)
            .bind(batch_id)
            .bind(flow)
            .bind(task_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(AppliedResult::from))
    }

    async fn recent(&self, limit: i64) -> Result<Vec<AppliedResult>> {
        let query = format!(
            "SELECT {APPLIED_COLUMNS} FROM batch_results_applied ORDER BY applied_at DESC LIMIT $1"
        );
        let rows = sqlx::query_as::<_, AppliedResultRow>(&query)
            .bind(limit.max(0))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(AppliedResult::from).collect())
    }
}

/// Internal struct for SQL query results
#[derive(sqlx::FromRow)]
struct BatchJobRow {
    id: i64,
    batch_id: String,
    flow: String,
    task_id: i64,
    status: String,
    output_file_id: Option<String>,
    processing_owner: Option<String>,
    processing_heartbeat_at: Option<DateTime<Utc>>,
    error_text: Option<String>,
    processed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<BatchJobRow> for BatchJob {
    type Error = BatchError;

    fn try_from(row: BatchJobRow) -> Result<Self> {
        let status = row.status.parse::<BatchState>().map_err(|e| {
            BatchError::StateTransitionError(format!("Invalid state in database: {e}"))
        })?;

        Ok(BatchJob {
            id: row.id,
            batch_id: row.batch_id,
            flow: row.flow,
            task_id: row.task_id,
            status,
            output_file_id: row.output_file_id,
            processing_owner: row.processing_owner,
            processing_heartbeat_at: row.processing_heartbeat_at,
            error_text: row.error_text,
            processed_at: row.processed_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct AppliedResultRow {
    batch_id: String,
    flow: String,
    task_id: i64,
    rows_done: i64,
    rows_error: i64,
    applied_at: DateTime<Utc>,
}

impl From<AppliedResultRow> for AppliedResult {
    fn from(row: AppliedResultRow) -> Self {
        AppliedResult {
            batch_id: row.batch_id,
            flow: row.flow,
            task_id: row.task_id,
            rows_done: row.rows_done,
            rows_error: row.rows_error,
            applied_at: row.applied_at,
        }
    }
}
