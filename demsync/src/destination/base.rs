use std::collections::HashSet;
use std::future::Future;

use crate::error::SyncResult;
use crate::types::{DemandRecord, FiscalDemandaRecord};

/// Trait for stores that receive synchronized demand data.
///
/// Implementations must keep every operation idempotent, because the same
/// change can be applied more than once: a notification apply and a
/// reconciliation sweep may race, and failed applies are retried. Demand
/// rows are soft-deleted; assignment rows are existence-only and
/// hard-deleted.
///
/// Constraint violations must surface as
/// [`crate::error::ErrorKind::ConstraintViolation`] so the apply engine can
/// route them to the failure log.
pub trait Destination {
    /// Returns the name of the destination.
    fn name() -> &'static str;

    /// Returns whether a demand row with the given id exists.
    fn demand_exists(&self, id: i64) -> impl Future<Output = SyncResult<bool>> + Send;

    /// Inserts the demand or, when the id already exists, updates its
    /// mutable columns. Immutable columns of an existing row are left
    /// untouched.
    fn upsert_demand(&self, record: &DemandRecord) -> impl Future<Output = SyncResult<()>> + Send;

    /// Updates the mutable columns of an existing demand.
    ///
    /// Returns `false` when no row with that id exists, in which case the
    /// caller falls back to [`Destination::upsert_demand`].
    fn update_demand(&self, record: &DemandRecord) -> impl Future<Output = SyncResult<bool>> + Send;

    /// Marks a demand as inactive. Repeated calls and calls for absent rows
    /// are no-ops.
    fn soft_delete_demand(&self, id: i64) -> impl Future<Output = SyncResult<()>> + Send;

    /// Returns whether an inspector row with the given id exists.
    fn fiscal_exists(&self, id: i64) -> impl Future<Output = SyncResult<bool>> + Send;

    /// Inserts the assignment pair if it is not already present.
    fn ensure_assignment(
        &self,
        record: &FiscalDemandaRecord,
    ) -> impl Future<Output = SyncResult<()>> + Send;

    /// Removes the assignment pair. A no-op when the pair is absent.
    fn delete_assignment(
        &self,
        demanda_id: i64,
        fiscal_id: i64,
    ) -> impl Future<Output = SyncResult<()>> + Send;

    /// Returns which of the given demand ids exist in the destination.
    ///
    /// Reconciliation probes its source-side window with this instead of
    /// fetching the whole destination table.
    fn demand_ids_in(
        &self,
        ids: &[i64],
    ) -> impl Future<Output = SyncResult<HashSet<i64>>> + Send;

    /// Returns all demand ids present in the destination.
    fn demand_ids(&self) -> impl Future<Output = SyncResult<HashSet<i64>>> + Send;

    /// Returns all inspector ids present in the destination.
    fn fiscal_ids(&self) -> impl Future<Output = SyncResult<HashSet<i64>>> + Send;

    /// Returns all `(demanda_id, fiscal_id)` pairs present in the
    /// destination.
    fn assignment_pairs(&self) -> impl Future<Output = SyncResult<HashSet<(i64, i64)>>> + Send;
}
