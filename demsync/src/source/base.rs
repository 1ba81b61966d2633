use std::future::Future;

use crate::error::SyncResult;
use crate::types::{AssignmentKey, DemandSourceRow, FiscalDemandaSourceRow};

/// Trait for stores the pipeline reads demand data from.
///
/// Notifications carry only the row key, so the pipeline fetches the current
/// row state through this trait at apply time. Fetches must observe the
/// committed state of the source; a row deleted between notification and
/// fetch is reported as absent, never as an error.
pub trait SourceStore {
    /// Returns the name of the source store.
    fn name() -> &'static str;

    /// Fetches a demand row by id. `None` means the row no longer exists.
    fn fetch_demand(
        &self,
        id: i64,
    ) -> impl Future<Output = SyncResult<Option<DemandSourceRow>>> + Send;

    /// Fetches an assignment row by id. `None` means the row no longer
    /// exists.
    fn fetch_fiscal_demanda(
        &self,
        id: i64,
    ) -> impl Future<Output = SyncResult<Option<FiscalDemandaSourceRow>>> + Send;

    /// Returns the most recent demand ids, newest first, bounded by `limit`.
    ///
    /// This is the reconciliation window: only ids returned here are
    /// compared against the destination.
    fn recent_demand_ids(&self, limit: i64) -> impl Future<Output = SyncResult<Vec<i64>>> + Send;

    /// Returns the key columns of active assignment rows, newest first.
    ///
    /// `limit: None` returns the full universe, used by the one-shot
    /// backfill. Rows with a missing endpoint are excluded at the query
    /// level.
    fn active_assignment_keys(
        &self,
        limit: Option<i64>,
    ) -> impl Future<Output = SyncResult<Vec<AssignmentKey>>> + Send;
}
