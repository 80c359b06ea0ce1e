//! # Models
//!
//! Persisted records owned by the batch store and the applied-results ledger.

pub mod applied_result;
pub mod batch_job;

pub use applied_result::{AppliedKey, AppliedResult};
pub use batch_job::{BatchJob, NewBatchJob};
