use crate::state_machine::BatchState;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// BatchJob is one submitted provider job and its recovery lease.
/// Maps to the `batches` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchJob {
    pub id: i64,
    /// Provider-assigned identifier, globally unique
    pub batch_id: String,
    /// Selects the applier that consumes this job's output
    pub flow: String,
    /// Caller correlation id, part of the ledger key
    pub task_id: i64,
    pub status: BatchState,
    pub output_file_id: Option<String>,
    pub processing_owner: Option<String>,
    pub processing_heartbeat_at: Option<DateTime<Utc>>,
    pub error_text: Option<String>,
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// New BatchJob for creation (without generated fields)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewBatchJob {
    pub batch_id: String,
    pub flow: String,
    pub task_id: i64,
}

impl NewBatchJob {
    pub fn new(batch_id: impl Into<String>, flow: impl Into<String>, task_id: i64) -> Self {
        Self {
            batch_id: batch_id.into(),
            flow: flow.into(),
            task_id,
        }
    }
}

impl BatchJob {
    /// Whether the lease is free for a new owner at `now`.
    ///
    /// `stale_minutes == 0` treats every outstanding lease as abandoned.
    pub fn lease_available(&self, now: DateTime<Utc>, stale_minutes: i64) -> bool {
        if self.processing_owner.is_none() || stale_minutes <= 0 {
            return true;
        }
        match self.processing_heartbeat_at {
            Some(heartbeat) => heartbeat < now - Duration::minutes(stale_minutes),
            None => true,
        }
    }

    pub fn is_leased_by(&self, owner: &str) -> bool {
        self.processing_owner.as_deref() == Some(owner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job_with_lease(owner: Option<&str>, heartbeat: Option<DateTime<Utc>>) -> BatchJob {
        let now = Utc::now();
        BatchJob {
            id: 1,
            batch_id: "batch_abc".to_string(),
            flow: "translate_name_tags".to_string(),
            task_id: 123,
            status: BatchState::InProgress,
            output_file_id: None,
            processing_owner: owner.map(str::to_string),
            processing_heartbeat_at: heartbeat,
            error_text: None,
            processed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_unleased_job_is_available() {
        let job = job_with_lease(None, None);
        assert!(job.lease_available(Utc::now(), 15));
    }

    #[test]
    fn test_fresh_lease_is_not_available() {
        let now = Utc::now();
        let job = job_with_lease(Some("worker-a"), Some(now - Duration::minutes(1)));
        assert!(!job.lease_available(now, 15));
        assert!(job.is_leased_by("worker-a"));
        assert!(!job.is_leased_by("worker-b"));
    }

    #[test]
    fn test_stale_lease_is_available() {
        let now = Utc::now();
        let job = job_with_lease(Some("worker-a"), Some(now - Duration::minutes(30)));
        assert!(job.lease_available(now, 15));
    }

    #[test]
    fn test_zero_stale_minutes_forces_availability() {
        let now = Utc::now();
        let job = job_with_lease(Some("worker-a"), Some(now));
        assert!(job.lease_available(now, 0));
    }
}
