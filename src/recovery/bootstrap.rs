//! # Recovery System Bootstrap
//!
//! Wires configuration into a running recovery worker: database pool and
//! migrations, Postgres-backed stores, the HTTP provider client, the built-in
//! flows, and the periodic scheduler.

use super::cycle::RecoveryCycle;
use super::scheduler::{RecoveryParams, RecoveryScheduler};
use crate::applier::{FlowApplier, PgAssetTagSink};
use crate::config::{ConfigManager, TagBatchConfig};
use crate::database::{create_pool, run_migrations};
use crate::error::Result;
use crate::provider::HttpBatchProvider;
use crate::store::{PgBatchStore, PgResultsLedger};
use sqlx::PgPool;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Fully wired recovery worker
#[derive(Debug)]
pub struct RecoverySystem {
    pub config: TagBatchConfig,
    pub pool: PgPool,
    pub cycle: Arc<RecoveryCycle>,
    pub scheduler: RecoveryScheduler,
    scheduler_handle: Option<JoinHandle<()>>,
}

impl RecoverySystem {
    /// Load configuration from the environment and bootstrap
    pub async fn bootstrap_from_environment() -> Result<Self> {
        let manager = ConfigManager::load()?;
        Self::bootstrap(manager.config().clone()).await
    }

    pub async fn bootstrap(config: TagBatchConfig) -> Result<Self> {
        config.validate()?;

        let pool = create_pool(&config.database).await?;
        run_migrations(&pool).await?;

        let provider = HttpBatchProvider::new(&config.provider)?;
        let applier = FlowApplier::with_default_flows(Arc::new(PgAssetTagSink::new(pool.clone())));
        let worker_id = config.recovery.resolved_worker_id();

        let cycle = Arc::new(
            RecoveryCycle::new(
                Arc::new(PgBatchStore::new(pool.clone())),
                Arc::new(PgResultsLedger::new(pool.clone())),
                Arc::new(provider),
                Arc::new(applier),
                worker_id.clone(),
            )
            .with_settings(config.apply.clone())
            .with_max_concurrency(config.recovery.max_concurrency)
            .with_job_timeout(config.recovery.job_timeout()),
        );

        let scheduler = RecoveryScheduler::new(
            cycle.clone(),
            RecoveryParams {
                limit: config.recovery.batch_limit,
                flow: None,
                task_id: None,
                stale_minutes: config.recovery.stale_minutes,
            },
            config.recovery.cycle_interval(),
        );

        info!(
            worker_id = %worker_id,
            provider = %config.provider.provider,
            max_concurrency = config.recovery.max_concurrency,
            "Recovery system bootstrapped"
        );

        Ok(Self {
            config,
            pool,
            cycle,
            scheduler,
            scheduler_handle: None,
        })
    }

    /// Start periodic recovery
    pub fn start(&mut self) -> Result<()> {
        self.scheduler_handle = Some(self.scheduler.start()?);
        Ok(())
    }

    /// Stop the scheduler, wait for the in-flight cycle, close the pool
    pub async fn shutdown(mut self) {
        self.scheduler.shutdown();
        if let Some(handle) = self.scheduler_handle.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "Recovery scheduler task ended abnormally");
            }
        }
        self.pool.close().await;
        info!("Recovery system stopped");
    }
}
