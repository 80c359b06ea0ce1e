use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// AppliedResult is the idempotency record for one (batch_id, flow, task_id).
/// Maps to the `batch_results_applied` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedResult {
    pub batch_id: String,
    pub flow: String,
    pub task_id: i64,
    pub rows_done: i64,
    pub rows_error: i64,
    pub applied_at: DateTime<Utc>,
}

impl AppliedResult {
    /// Every parsed row failed to apply
    pub fn is_total_failure(&self) -> bool {
        self.rows_done == 0 && self.rows_error > 0
    }
}

/// Ledger key
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AppliedKey {
    pub batch_id: String,
    pub flow: String,
    pub task_id: i64,
}

impl AppliedKey {
    pub fn new(batch_id: impl Into<String>, flow: impl Into<String>, task_id: i64) -> Self {
        Self {
            batch_id: batch_id.into(),
            flow: flow.into(),
            task_id,
        }
    }
}
