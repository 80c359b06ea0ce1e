//! Schema migrations embedded from `migrations/` at compile time.
//!
//! `sqlx::migrate!` records applied versions in `_sqlx_migrations` and takes a
//! Postgres advisory lock while running, so concurrent workers starting at once
//! apply each migration exactly once.

use crate::error::Result;
use sqlx::migrate::Migrator;
use sqlx::PgPool;
use tracing::info;

pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Apply all pending migrations
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    MIGRATOR.run(pool).await?;
    info!(
        migrations = MIGRATOR.iter().count(),
        "Database migrations applied"
    );
    Ok(())
}
