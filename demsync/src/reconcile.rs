//! Gap detection and replay.
//!
//! Reconciliation is the eventual-consistency backstop for the live
//! listener: it diffs a bounded window of recent source keys against the
//! destination and replays whatever is missing through the same apply
//! paths. It is safe to run concurrently with the listener and safe to run
//! repeatedly, since every replay is idempotent.

use std::collections::HashSet;

use tracing::{debug, info, warn};

use crate::apply::{ApplyEngine, ApplyOutcome};
use crate::destination::Destination;
use crate::error::SyncResult;
use crate::mappers::{DemandMapper, map_fiscal_demanda};
use crate::source::SourceStore;
use crate::types::{AssignmentKey, EventType};

/// Counters for one reconciliation pass over one entity type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    /// Keys in the window universe.
    pub checked: usize,
    /// Keys absent from the destination.
    pub missing: usize,
    /// Missing keys successfully replayed.
    pub resynced: usize,
    /// Missing keys whose replay failed.
    pub errored: usize,
}

/// Replays source rows the destination is missing.
#[derive(Debug, Clone)]
pub struct Reconciler<S, D> {
    source: S,
    engine: ApplyEngine<D>,
    mapper: DemandMapper,
    window_size: i64,
}

impl<S, D> Reconciler<S, D>
where
    S: SourceStore,
    D: Destination,
{
    pub fn new(source: S, engine: ApplyEngine<D>, mapper: DemandMapper, window_size: i64) -> Self {
        Self {
            source,
            engine,
            mapper,
            window_size,
        }
    }

    /// Runs one full pass: demands first, then assignments, so replayed
    /// demand rows can satisfy assignment endpoint checks within the same
    /// run.
    pub async fn run(&self) -> SyncResult<()> {
        let demands = self.reconcile_demands().await?;
        info!(
            checked = demands.checked,
            missing = demands.missing,
            resynced = demands.resynced,
            errored = demands.errored,
            "demand reconciliation finished"
        );

        let assignments = self.reconcile_assignments(Some(self.window_size)).await?;
        info!(
            checked = assignments.checked,
            missing = assignments.missing,
            resynced = assignments.resynced,
            errored = assignments.errored,
            "assignment reconciliation finished"
        );

        let removed = self.remove_orphaned_pairs().await?;
        info!(removed, "orphaned assignment cleanup finished");

        Ok(())
    }

    /// Diffs the most recent demand keys against the destination and
    /// replays the missing ones as INSERTs.
    pub async fn reconcile_demands(&self) -> SyncResult<ReconcileSummary> {
        let window = self.source.recent_demand_ids(self.window_size).await?;
        let present = self.engine.destination().demand_ids_in(&window).await?;

        let missing: Vec<i64> = window
            .iter()
            .copied()
            .filter(|id| !present.contains(id))
            .collect();

        let mut summary = ReconcileSummary {
            checked: window.len(),
            missing: missing.len(),
            ..Default::default()
        };

        for id in missing {
            // One bad row must not block the rest of the window.
            match self.replay_demand(id).await {
                Ok(true) => summary.resynced += 1,
                Ok(false) => {}
                Err(error) => {
                    warn!(id, %error, "failed to replay missing demand");
                    summary.errored += 1;
                }
            }
        }

        Ok(summary)
    }

    /// Diffs active source assignments whose endpoints already exist in the
    /// destination against the destination pair set, and replays the
    /// missing pairs. `limit: None` scans the full universe.
    pub async fn reconcile_assignments(
        &self,
        limit: Option<i64>,
    ) -> SyncResult<ReconcileSummary> {
        let keys = self.source.active_assignment_keys(limit).await?;

        let destination = self.engine.destination();
        let demand_ids = destination.demand_ids().await?;
        let fiscal_ids = destination.fiscal_ids().await?;

        // Endpoint-gated universe; rows skipped here are picked up by a
        // later run once their endpoints are synchronized.
        let eligible: Vec<AssignmentKey> = keys
            .into_iter()
            .filter(|key| {
                demand_ids.contains(&key.demanda_id) && fiscal_ids.contains(&key.fiscal_id)
            })
            .collect();

        let pairs: HashSet<(i64, i64)> = destination.assignment_pairs().await?;

        let mut summary = ReconcileSummary {
            checked: eligible.len(),
            ..Default::default()
        };

        for key in eligible {
            if pairs.contains(&(key.demanda_id, key.fiscal_id)) {
                continue;
            }
            summary.missing += 1;

            match self.replay_assignment(key.id).await {
                Ok(true) => summary.resynced += 1,
                Ok(false) => {}
                Err(error) => {
                    warn!(id = key.id, %error, "failed to replay missing assignment");
                    summary.errored += 1;
                }
            }
        }

        Ok(summary)
    }

    /// One-shot bulk reconciliation of every valid assignment row,
    /// unbounded by the window.
    pub async fn backfill_assignments(&self) -> SyncResult<ReconcileSummary> {
        let summary = self.reconcile_assignments(None).await?;
        info!(
            checked = summary.checked,
            missing = summary.missing,
            resynced = summary.resynced,
            errored = summary.errored,
            "assignment backfill finished"
        );

        Ok(summary)
    }

    /// Deletes destination pairs that no longer have an active source
    /// assignment behind them.
    ///
    /// Assignment DELETE notifications carry only the source row id, which
    /// cannot be resolved to a pair once the row is gone, so pair removal
    /// happens here. Orphans are diffed against the full active source
    /// universe, never the window, so a pair is only deleted when the
    /// source genuinely no longer backs it.
    pub async fn remove_orphaned_pairs(&self) -> SyncResult<usize> {
        let source_pairs: HashSet<(i64, i64)> = self
            .source
            .active_assignment_keys(None)
            .await?
            .into_iter()
            .map(|key| (key.demanda_id, key.fiscal_id))
            .collect();

        let destination = self.engine.destination();
        let orphaned: Vec<(i64, i64)> = destination
            .assignment_pairs()
            .await?
            .into_iter()
            .filter(|pair| !source_pairs.contains(pair))
            .collect();

        let mut removed = 0;
        for (demanda_id, fiscal_id) in orphaned {
            match destination.delete_assignment(demanda_id, fiscal_id).await {
                Ok(()) => removed += 1,
                Err(error) => {
                    warn!(demanda_id, fiscal_id, %error, "failed to remove orphaned assignment");
                }
            }
        }

        Ok(removed)
    }

    /// Returns `true` when the row was applied, `false` when it vanished
    /// from the source in the meantime.
    async fn replay_demand(&self, id: i64) -> SyncResult<bool> {
        let Some(row) = self.source.fetch_demand(id).await? else {
            debug!(id, "demand row no longer at source, skipping replay");
            return Ok(false);
        };

        self.engine
            .apply_demand(EventType::Insert, &self.mapper.map(row))
            .await?;

        Ok(true)
    }

    async fn replay_assignment(&self, id: i64) -> SyncResult<bool> {
        let Some(row) = self.source.fetch_fiscal_demanda(id).await? else {
            debug!(id, "assignment row no longer at source, skipping replay");
            return Ok(false);
        };

        let outcome = self
            .engine
            .apply_assignment(EventType::Insert, &map_fiscal_demanda(row))
            .await?;

        Ok(outcome == ApplyOutcome::Applied)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tempfile::tempdir;

    use super::*;
    use crate::destination::MemoryDestination;
    use crate::failures::FailureLog;
    use crate::source::MemorySourceStore;
    use crate::types::{DemandSourceRow, FiscalDemandaSourceRow};

    fn demand_row(id: i64, situacao: i64) -> DemandSourceRow {
        serde_json::from_value(json!({
            "id": id,
            "situacao": situacao,
            "descricao": format!("Case {id}"),
            "data_criacao": "2024-03-01T08:30:00",
            "ativo": true
        }))
        .unwrap()
    }

    fn assignment_row(id: i64, demanda_id: i64, fiscal_id: i64) -> FiscalDemandaSourceRow {
        serde_json::from_value(json!({
            "id": id,
            "demanda_id": demanda_id,
            "usuario_id": fiscal_id,
            "ativo": true,
            "data_criacao": "2024-03-01T08:30:00"
        }))
        .unwrap()
    }

    async fn reconciler(
        source: MemorySourceStore,
        destination: MemoryDestination,
        window_size: i64,
    ) -> (Reconciler<MemorySourceStore, MemoryDestination>, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let log = FailureLog::load(dir.path().join("failures.json")).await;
        let engine = ApplyEngine::new(destination, log);

        (
            Reconciler::new(source, engine, DemandMapper::new(1), window_size),
            dir,
        )
    }

    #[tokio::test]
    async fn missing_window_keys_are_replayed() {
        let source = MemorySourceStore::new();
        for id in [10, 11, 12] {
            source.insert_demand(demand_row(id, 2)).await;
        }

        let destination = MemoryDestination::new();
        let (reconciler, _dir) = reconciler(source, destination, 5000).await;

        // Seed the destination with 10 and 12; only 11 is a gap.
        for id in [10, 12] {
            reconciler
                .engine
                .apply_demand(
                    EventType::Insert,
                    &reconciler.mapper.map(demand_row(id, 2)),
                )
                .await
                .unwrap();
        }

        let summary = reconciler.reconcile_demands().await.unwrap();

        assert_eq!(summary.checked, 3);
        assert_eq!(summary.missing, 1);
        assert_eq!(summary.resynced, 1);
        assert_eq!(summary.errored, 0);
        assert!(reconciler.engine.destination().demand(11).await.is_some());
    }

    #[tokio::test]
    async fn one_bad_row_does_not_abort_the_batch() {
        let source = MemorySourceStore::new();
        source.insert_demand(demand_row(1, 2)).await;
        source.insert_demand(demand_row(2, 9)).await;
        source.insert_demand(demand_row(3, 2)).await;

        let destination = MemoryDestination::new().with_known_situacoes([1, 2]).await;
        let (reconciler, _dir) = reconciler(source, destination, 5000).await;

        let summary = reconciler.reconcile_demands().await.unwrap();

        assert_eq!(summary.checked, 3);
        assert_eq!(summary.missing, 3);
        assert_eq!(summary.resynced, 2);
        assert_eq!(summary.errored, 1);
        // The failed row is classified for triage.
        assert_eq!(reconciler.engine.failure_log().snapshot().await.total, 1);
    }

    #[tokio::test]
    async fn window_bounds_the_scan() {
        let source = MemorySourceStore::new();
        for id in 1..=10 {
            source.insert_demand(demand_row(id, 2)).await;
        }

        let (reconciler, _dir) = reconciler(source, MemoryDestination::new(), 4).await;
        let summary = reconciler.reconcile_demands().await.unwrap();

        // Only the 4 most recent ids are in the universe.
        assert_eq!(summary.checked, 4);
        assert_eq!(summary.resynced, 4);
        assert!(reconciler.engine.destination().demand(6).await.is_none());
        assert!(reconciler.engine.destination().demand(7).await.is_some());
    }

    #[tokio::test]
    async fn assignment_universe_is_endpoint_filtered() {
        let source = MemorySourceStore::new();
        source.insert_demand(demand_row(42, 2)).await;
        source.insert_assignment(assignment_row(100, 42, 7)).await;
        // Demand 43 is not in the destination, fiscal 8 is unknown.
        source.insert_assignment(assignment_row(101, 43, 7)).await;
        source.insert_assignment(assignment_row(102, 42, 8)).await;

        let destination = MemoryDestination::new();
        destination.add_fiscal(7).await;
        let (reconciler, _dir) = reconciler(source, destination, 5000).await;

        reconciler
            .engine
            .apply_demand(
                EventType::Insert,
                &reconciler.mapper.map(demand_row(42, 2)),
            )
            .await
            .unwrap();

        let summary = reconciler.reconcile_assignments(Some(5000)).await.unwrap();

        assert_eq!(summary.checked, 1);
        assert_eq!(summary.missing, 1);
        assert_eq!(summary.resynced, 1);
        assert_eq!(summary.errored, 0);

        let pairs = reconciler
            .engine
            .destination()
            .assignment_pairs()
            .await
            .unwrap();
        assert_eq!(pairs.len(), 1);
        assert!(pairs.contains(&(42, 7)));
    }

    #[tokio::test]
    async fn backfill_covers_the_full_universe() {
        let source = MemorySourceStore::new();
        let destination = MemoryDestination::new();
        destination.add_fiscal(7).await;

        for id in 1..=6 {
            source.insert_demand(demand_row(id, 2)).await;
            source.insert_assignment(assignment_row(100 + id, id, 7)).await;
        }

        // Window of 2 would only see the two most recent assignments.
        let (reconciler, _dir) = reconciler(source, destination, 2).await;
        reconciler.reconcile_demands().await.unwrap();
        for id in 1..=6 {
            reconciler
                .engine
                .apply_demand(
                    EventType::Insert,
                    &reconciler.mapper.map(demand_row(id, 2)),
                )
                .await
                .unwrap();
        }

        let summary = reconciler.backfill_assignments().await.unwrap();

        assert_eq!(summary.checked, 6);
        assert_eq!(summary.resynced, 6);
        assert_eq!(
            reconciler
                .engine
                .destination()
                .assignment_pairs()
                .await
                .unwrap()
                .len(),
            6
        );
    }

    #[tokio::test]
    async fn deleted_source_assignment_is_removed_by_reconciliation() {
        let source = MemorySourceStore::new();
        source.insert_demand(demand_row(42, 2)).await;
        source.insert_demand(demand_row(43, 2)).await;
        source.insert_assignment(assignment_row(100, 42, 7)).await;
        source.insert_assignment(assignment_row(101, 43, 7)).await;

        let destination = MemoryDestination::new();
        destination.add_fiscal(7).await;
        let (reconciler, _dir) = reconciler(source.clone(), destination, 5000).await;

        reconciler.run().await.unwrap();
        assert_eq!(
            reconciler
                .engine
                .destination()
                .assignment_pairs()
                .await
                .unwrap()
                .len(),
            2
        );

        // The source row is hard-deleted; the DELETE notification cannot
        // name the pair, so the next pass has to clean it up.
        source.remove_assignment(100).await;
        reconciler.run().await.unwrap();

        let pairs = reconciler
            .engine
            .destination()
            .assignment_pairs()
            .await
            .unwrap();
        assert_eq!(pairs.len(), 1);
        assert!(!pairs.contains(&(42, 7)));
        assert!(pairs.contains(&(43, 7)));
    }

    #[tokio::test]
    async fn deactivated_source_assignment_is_removed_by_reconciliation() {
        let source = MemorySourceStore::new();
        source.insert_demand(demand_row(42, 2)).await;
        source.insert_assignment(assignment_row(100, 42, 7)).await;

        let destination = MemoryDestination::new();
        destination.add_fiscal(7).await;
        let (reconciler, _dir) = reconciler(source.clone(), destination, 5000).await;

        reconciler.run().await.unwrap();

        let mut row = assignment_row(100, 42, 7);
        row.ativo = Some(false);
        source.insert_assignment(row).await;
        let removed = reconciler.remove_orphaned_pairs().await.unwrap();

        assert_eq!(removed, 1);
        assert!(
            reconciler
                .engine
                .destination()
                .assignment_pairs()
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn replay_is_safe_to_run_repeatedly() {
        let source = MemorySourceStore::new();
        source.insert_demand(demand_row(1, 2)).await;

        let (reconciler, _dir) = reconciler(source, MemoryDestination::new(), 5000).await;

        reconciler.reconcile_demands().await.unwrap();
        let second = reconciler.reconcile_demands().await.unwrap();

        assert_eq!(second.missing, 0);
        assert_eq!(second.resynced, 0);
        assert_eq!(reconciler.engine.destination().demands().await.len(), 1);
    }
}
