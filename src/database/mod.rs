//! # Database Operations
//!
//! Postgres pool creation and embedded schema migrations for the batch store,
//! the applied-results ledger and the asset tag tables.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use tagbatch_core::config::DatabaseConfig;
//! use tagbatch_core::database::{create_pool, run_migrations};
//!
//! # async fn example() -> tagbatch_core::error::Result<()> {
//! let pool = create_pool(&DatabaseConfig::default()).await?;
//! run_migrations(&pool).await?;
//! # Ok(())
//! # }
//! ```

pub mod connection;
pub mod migrations;

pub use connection::{create_pool, DatabaseConnection};
pub use migrations::run_migrations;
