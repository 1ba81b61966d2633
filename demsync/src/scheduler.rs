//! Timer lifecycle for the reconciliation engine.
//!
//! The scheduler owns the recurring trigger, nothing else: reconciliation
//! semantics live in [`Reconciler`] and the scheduler's lifetime is
//! independent of the listener's.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{info, warn};

use crate::concurrency::shutdown::ShutdownRx;
use crate::destination::Destination;
use crate::reconcile::Reconciler;
use crate::source::SourceStore;

/// Periodically runs a [`Reconciler`] until stopped.
#[derive(Debug)]
pub struct ReconciliationScheduler {
    handle: Option<JoinHandle<()>>,
}

impl ReconciliationScheduler {
    /// Spawns the reconciliation timer.
    ///
    /// With `run_on_start` a pass fires immediately; otherwise the first
    /// pass waits one full interval. A failed pass is logged and the timer
    /// keeps going.
    pub fn start<S, D>(
        reconciler: Reconciler<S, D>,
        period: Duration,
        run_on_start: bool,
        mut shutdown_rx: ShutdownRx,
    ) -> Self
    where
        S: SourceStore + Clone + Send + Sync + 'static,
        D: Destination + Clone + Send + Sync + 'static,
    {
        let handle = tokio::spawn(async move {
            let mut ticker = interval(period);
            // A slow pass must not cause a burst of catch-up passes.
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            if !run_on_start {
                // The first tick completes immediately; consume it.
                ticker.tick().await;
            }

            info!(period_secs = period.as_secs(), "reconciliation scheduler started");

            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => {
                        info!("reconciliation scheduler shutting down");
                        return;
                    }
                    _ = ticker.tick() => {
                        if let Err(error) = reconciler.run().await {
                            warn!(%error, "reconciliation run failed");
                        }
                    }
                }
            }
        });

        Self {
            handle: Some(handle),
        }
    }

    /// Stops the timer and waits for an in-flight pass to wind down.
    /// Idempotent.
    pub async fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            let _ = handle.await;
        }
    }

    /// Returns whether the timer task is still owned by this scheduler.
    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tempfile::tempdir;
    use tokio::time::sleep;

    use super::*;
    use crate::apply::ApplyEngine;
    use crate::concurrency::shutdown::create_shutdown_channel;
    use crate::destination::MemoryDestination;
    use crate::failures::FailureLog;
    use crate::mappers::DemandMapper;
    use crate::source::MemorySourceStore;
    use crate::types::DemandSourceRow;

    fn demand_row(id: i64) -> DemandSourceRow {
        serde_json::from_value(json!({
            "id": id,
            "situacao": 2,
            "data_criacao": "2024-03-01T08:30:00",
            "ativo": true
        }))
        .unwrap()
    }

    async fn test_reconciler(
        source: MemorySourceStore,
        destination: MemoryDestination,
    ) -> (Reconciler<MemorySourceStore, MemoryDestination>, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let log = FailureLog::load(dir.path().join("failures.json")).await;
        let engine = ApplyEngine::new(destination, log);

        (Reconciler::new(source, engine, DemandMapper::new(1), 5000), dir)
    }

    #[tokio::test]
    async fn periodic_pass_converges_the_destination() {
        let source = MemorySourceStore::new();
        source.insert_demand(demand_row(1)).await;
        let destination = MemoryDestination::new();

        let (reconciler, _dir) = test_reconciler(source, destination.clone()).await;
        let (shutdown_tx, shutdown_rx) = create_shutdown_channel();

        let mut scheduler = ReconciliationScheduler::start(
            reconciler,
            Duration::from_millis(20),
            false,
            shutdown_rx,
        );

        sleep(Duration::from_millis(100)).await;
        assert!(destination.demand(1).await.is_some());

        shutdown_tx.shutdown().unwrap();
        scheduler.stop().await;
    }

    #[tokio::test]
    async fn run_on_start_fires_an_immediate_pass() {
        let source = MemorySourceStore::new();
        source.insert_demand(demand_row(1)).await;
        let destination = MemoryDestination::new();

        let (reconciler, _dir) = test_reconciler(source, destination.clone()).await;
        let (_shutdown_tx, shutdown_rx) = create_shutdown_channel();

        // One hour period: only the startup pass can have run.
        let mut scheduler = ReconciliationScheduler::start(
            reconciler,
            Duration::from_secs(3600),
            true,
            shutdown_rx,
        );

        sleep(Duration::from_millis(100)).await;
        assert!(destination.demand(1).await.is_some());

        scheduler.stop().await;
    }

    #[tokio::test]
    async fn first_pass_waits_one_interval_by_default() {
        let source = MemorySourceStore::new();
        source.insert_demand(demand_row(1)).await;
        let destination = MemoryDestination::new();

        let (reconciler, _dir) = test_reconciler(source, destination.clone()).await;
        let (_shutdown_tx, shutdown_rx) = create_shutdown_channel();

        let mut scheduler = ReconciliationScheduler::start(
            reconciler,
            Duration::from_secs(3600),
            false,
            shutdown_rx,
        );

        sleep(Duration::from_millis(100)).await;
        assert!(destination.demand(1).await.is_none());

        scheduler.stop().await;
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let source = MemorySourceStore::new();
        let (reconciler, _dir) = test_reconciler(source, MemoryDestination::new()).await;
        let (_shutdown_tx, shutdown_rx) = create_shutdown_channel();

        let mut scheduler = ReconciliationScheduler::start(
            reconciler,
            Duration::from_secs(3600),
            false,
            shutdown_rx,
        );

        assert!(scheduler.is_running());
        scheduler.stop().await;
        scheduler.stop().await;
        assert!(!scheduler.is_running());
    }
}
