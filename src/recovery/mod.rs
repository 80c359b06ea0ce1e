//! # Batch Recovery
//!
//! Reconciles recorded batch jobs with the provider and applies finished output
//! exactly once. Correctness across concurrent workers rests on two storage
//! primitives: the lease compare-and-set and the ledger insert-or-ignore.

pub mod bootstrap;
pub mod cycle;
pub mod scheduler;

pub use bootstrap::RecoverySystem;
pub use cycle::{JobOutcome, RecoveryCycle, RecoverySummary};
pub use scheduler::{RecoveryParams, RecoveryScheduler};
