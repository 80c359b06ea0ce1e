#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # TagBatch Core
//!
//! Lifecycle tracking and exactly-once application of bulk tagging jobs submitted
//! to an asynchronous batch-inference provider.
//!
//! ## Overview
//!
//! A batch job is submitted elsewhere and recorded here with its provider id. A
//! recovery cycle, run periodically by any number of workers, reconciles each
//! recorded job with the provider, downloads finished output, parses it line by
//! line and applies the rows to local storage. Submission, completion and
//! application happen at unrelated times and any step may crash; the design
//! guarantees no output is applied twice and no finished job is lost.
//!
//! ## Module Organization
//!
//! - [`state_machine`] - Batch job states and the allowed-transition table
//! - [`models`] - `BatchJob` and `AppliedResult` records
//! - [`store`] - Batch record store and applied-results ledger (Postgres, in-memory)
//! - [`parser`] - Newline-delimited output parsing with layered tag extraction
//! - [`applier`] - Flow registry and row application
//! - [`provider`] - Provider status/content client, throttling and rate-limit retries
//! - [`recovery`] - Recovery cycle, scheduler and bootstrap
//! - [`config`] - Environment-aware configuration
//! - [`database`] - Pool creation and embedded migrations
//! - [`error`] - Structured error handling
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tagbatch_core::recovery::RecoverySystem;
//!
//! # async fn example() -> tagbatch_core::error::Result<()> {
//! tagbatch_core::logging::init_tracing();
//!
//! let mut system = RecoverySystem::bootstrap_from_environment().await?;
//! let summary = system.cycle.recover_once(100, None, None, 15).await?;
//! println!("applied {} of {} batches", summary.applied, summary.inspected);
//!
//! system.start()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Testing
//!
//! The recovery cycle is exercised end to end against the in-memory store,
//! ledger and tag sink. Postgres-backed store tests need `DATABASE_URL` and run
//! with `--features test-database`.

pub mod applier;
pub mod clock;
pub mod config;
pub mod constants;
pub mod database;
pub mod error;
pub mod logging;
pub mod models;
pub mod parser;
pub mod provider;
pub mod recovery;
pub mod state_machine;
pub mod store;

pub use applier::{ApplySettings, ApplyStats, FlowApplier, FlowHandler};
pub use config::{ConfigManager, TagBatchConfig};
pub use error::{BatchError, Result};
pub use models::{AppliedResult, BatchJob, NewBatchJob};
pub use parser::{parse_batch_output, ParsedRow, RowOutcome, TagPayload};
pub use provider::{BatchProvider, HttpBatchProvider, ProviderBatch, ProviderError};
pub use recovery::{RecoveryCycle, RecoveryScheduler, RecoverySummary, RecoverySystem};
pub use state_machine::BatchState;
pub use store::{BatchStore, ResultsLedger};
