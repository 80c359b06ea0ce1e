#![allow(dead_code)]

pub mod builders;
pub mod mock_provider;
pub mod strategies;

pub use builders::*;
pub use mock_provider::*;
pub use strategies::*;

use chrono::{TimeZone, Utc};
use std::sync::Arc;
use tagbatch_core::applier::{FlowApplier, InMemoryAssetTagSink};
use tagbatch_core::clock::ManualClock;
use tagbatch_core::models::{BatchJob, NewBatchJob};
use tagbatch_core::recovery::RecoveryCycle;
use tagbatch_core::store::{BatchStore, InMemoryBatchStore, InMemoryResultsLedger};

/// In-memory store, ledger, sink and scripted provider sharing one manual clock
pub struct RecoveryHarness {
    pub clock: Arc<ManualClock>,
    pub store: Arc<InMemoryBatchStore>,
    pub ledger: Arc<InMemoryResultsLedger>,
    pub sink: Arc<InMemoryAssetTagSink>,
    pub provider: Arc<MockProvider>,
    pub applier: Arc<FlowApplier>,
}

impl RecoveryHarness {
    pub fn new() -> Self {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap(),
        ));
        let sink = Arc::new(InMemoryAssetTagSink::new());
        Self {
            store: Arc::new(InMemoryBatchStore::with_clock(clock.clone())),
            ledger: Arc::new(InMemoryResultsLedger::with_clock(clock.clone())),
            applier: Arc::new(FlowApplier::with_default_flows(sink.clone())),
            provider: Arc::new(MockProvider::new()),
            sink,
            clock,
        }
    }

    pub fn cycle(&self, worker_id: &str) -> RecoveryCycle {
        RecoveryCycle::new(
            self.store.clone(),
            self.ledger.clone(),
            self.provider.clone(),
            self.applier.clone(),
            worker_id,
        )
    }

    pub async fn submit(&self, batch_id: &str, flow: &str, task_id: i64) -> BatchJob {
        self.store
            .record_submission(NewBatchJob::new(batch_id, flow, task_id))
            .await
            .expect("Failed to record submission")
    }

    pub async fn job(&self, batch_id: &str) -> BatchJob {
        self.store
            .find_by_batch_id(batch_id)
            .await
            .expect("Store lookup failed")
            .expect("Batch job should exist")
    }

    /// Register assets `1..=count` in the sink
    pub fn seed_assets(&self, count: i64) {
        for id in 1..=count {
            self.sink.insert_asset(id, format!("asset-{id}"));
        }
    }
}
