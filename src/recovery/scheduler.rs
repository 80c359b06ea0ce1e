//! Periodic driver for [`RecoveryCycle::recover_once`].

use super::cycle::{RecoveryCycle, RecoverySummary};
use crate::error::{BatchError, Result};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Arguments passed to every scheduled cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryParams {
    pub limit: i64,
    pub flow: Option<String>,
    pub task_id: Option<i64>,
    pub stale_minutes: i64,
}

#[derive(Debug)]
struct SchedulerState {
    running: AtomicBool,
    cycles_run: AtomicU64,
    shutdown_notify: Notify,
}

/// Runs a recovery pass every `interval` until [`shutdown`](Self::shutdown).
#[derive(Debug, Clone)]
pub struct RecoveryScheduler {
    cycle: Arc<RecoveryCycle>,
    params: RecoveryParams,
    interval: Duration,
    state: Arc<SchedulerState>,
}

impl RecoveryScheduler {
    pub fn new(cycle: Arc<RecoveryCycle>, params: RecoveryParams, interval: Duration) -> Self {
        Self {
            cycle,
            params,
            interval,
            state: Arc::new(SchedulerState {
                running: AtomicBool::new(false),
                cycles_run: AtomicU64::new(0),
                shutdown_notify: Notify::new(),
            }),
        }
    }

    pub fn is_running(&self) -> bool {
        self.state.running.load(Ordering::Acquire)
    }

    /// Completed cycles since start, including failed ones
    pub fn cycles_run(&self) -> u64 {
        self.state.cycles_run.load(Ordering::Acquire)
    }

    /// Spawn the loop onto the current runtime
    pub fn start(&self) -> Result<JoinHandle<()>> {
        if self
            .state
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(BatchError::StateTransitionError(
                "Recovery scheduler is already running".to_string(),
            ));
        }

        let scheduler = self.clone();
        Ok(tokio::spawn(async move { scheduler.run().await }))
    }

    /// Stop after the in-flight cycle finishes
    pub fn shutdown(&self) {
        self.state.running.store(false, Ordering::Release);
        // notify_one stores a permit if the loop is mid-cycle
        self.state.shutdown_notify.notify_one();
    }

    async fn run(&self) {
        info!(
            worker_id = %self.cycle.worker_id(),
            interval_ms = self.interval.as_millis() as u64,
            "Recovery scheduler started"
        );

        while self.is_running() {
            match self.run_cycle().await {
                Ok(summary) => debug!(?summary, "Scheduled recovery cycle complete"),
                Err(e) => error!(error = %e, "Scheduled recovery cycle failed"),
            }
            self.state.cycles_run.fetch_add(1, Ordering::AcqRel);

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {},
                _ = self.state.shutdown_notify.notified() => {
                    debug!("Shutdown notification received");
                    break;
                }
            }
        }

        self.state.running.store(false, Ordering::Release);
        info!(cycles_run = self.cycles_run(), "Recovery scheduler stopped");
    }

    async fn run_cycle(&self) -> Result<RecoverySummary> {
        self.cycle
            .recover_once(
                self.params.limit,
                self.params.flow.as_deref(),
                self.params.task_id,
                self.params.stale_minutes,
            )
            .await
    }
}
