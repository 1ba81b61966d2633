//! Idempotent application of mapped records against the destination.
//!
//! Both the live listener and the reconciliation engine funnel into this
//! engine, so every operation must be safe to replay and safe to race
//! across triggers. Applies for the same `(entity, id)` are serialized
//! through a keyed lock; distinct keys proceed concurrently.

use serde::Serialize;
use tracing::warn;

use crate::concurrency::locks::KeyedLocks;
use crate::destination::Destination;
use crate::error::{ErrorKind, SyncResult};
use crate::failures::{FailureKind, FailureLog};
use crate::types::{
    DEMANDA_TABLE, DemandRecord, EntityKind, EventType, FISCAL_DEMANDA_TABLE, FiscalDemandaRecord,
};

/// Outcome of an assignment apply.
///
/// Skips are deliberate, not failures: a skipped assignment is retried by
/// the next reconciliation run once its preconditions hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    /// An endpoint row is not yet present in the destination.
    SkippedDependency,
    /// The record failed key validation; details are in the failure log.
    SkippedInvalid,
}

/// Applies change events to a [`Destination`], classifying constraint
/// failures into the [`FailureLog`].
#[derive(Debug, Clone)]
pub struct ApplyEngine<D> {
    destination: D,
    failure_log: FailureLog,
    locks: KeyedLocks,
}

impl<D> ApplyEngine<D>
where
    D: Destination,
{
    pub fn new(destination: D, failure_log: FailureLog) -> Self {
        Self {
            destination,
            failure_log,
            locks: KeyedLocks::new(),
        }
    }

    pub fn destination(&self) -> &D {
        &self.destination
    }

    pub fn failure_log(&self) -> &FailureLog {
        &self.failure_log
    }

    /// Applies a demand event.
    ///
    /// INSERT upserts; UPDATE falls back to the INSERT path when the row
    /// was never inserted, which self-heals out-of-order delivery; DELETE
    /// soft-deletes. Constraint violations are recorded to the failure log
    /// and re-raised so the caller sees the apply as failed.
    pub async fn apply_demand(
        &self,
        event_type: EventType,
        record: &DemandRecord,
    ) -> SyncResult<()> {
        let _guard = self.locks.acquire(EntityKind::Demand, record.id).await;

        let result = match event_type {
            EventType::Insert => self.destination.upsert_demand(record).await,
            EventType::Update => match self.destination.update_demand(record).await {
                Ok(true) => Ok(()),
                // The UPDATE arrived before its INSERT became durable.
                Ok(false) => self.destination.upsert_demand(record).await,
                Err(error) => Err(error),
            },
            EventType::Delete => self.destination.soft_delete_demand(record.id).await,
        };

        self.capture_constraint(record.id, DEMANDA_TABLE, record, result)
            .await
    }

    /// Soft-deletes a demand by id. Used for DELETE events, where the source
    /// row is already gone and no re-fetch is possible.
    pub async fn delete_demand(&self, id: i64) -> SyncResult<()> {
        let _guard = self.locks.acquire(EntityKind::Demand, id).await;

        self.destination.soft_delete_demand(id).await
    }

    /// Applies an assignment event.
    ///
    /// INSERT and UPDATE collapse to "ensure the pair exists"; before
    /// inserting, both endpoint rows must already exist in the destination,
    /// otherwise the event is skipped and left for reconciliation. DELETE
    /// is an unconditional hard delete of the pair.
    pub async fn apply_assignment(
        &self,
        event_type: EventType,
        record: &FiscalDemandaRecord,
    ) -> SyncResult<ApplyOutcome> {
        let _guard = self
            .locks
            .acquire(EntityKind::FiscalDemanda, record.origem_id)
            .await;

        if event_type == EventType::Delete {
            self.destination
                .delete_assignment(record.demanda_id, record.fiscal_id)
                .await?;
            return Ok(ApplyOutcome::Applied);
        }

        let violations = record.validate();
        if !violations.is_empty() {
            let message = violations.join("; ");
            warn!(
                origem_id = record.origem_id,
                %message,
                "assignment failed validation, skipping"
            );
            self.record_failure(
                record.origem_id,
                FISCAL_DEMANDA_TABLE,
                FailureKind::ValidationError,
                &message,
                record,
            )
            .await;
            return Ok(ApplyOutcome::SkippedInvalid);
        }

        if !self.destination.demand_exists(record.demanda_id).await? {
            warn!(
                origem_id = record.origem_id,
                demanda_id = record.demanda_id,
                "demand endpoint not yet synchronized, deferring assignment"
            );
            return Ok(ApplyOutcome::SkippedDependency);
        }

        if !self.destination.fiscal_exists(record.fiscal_id).await? {
            warn!(
                origem_id = record.origem_id,
                fiscal_id = record.fiscal_id,
                "inspector not present in destination, deferring assignment"
            );
            return Ok(ApplyOutcome::SkippedDependency);
        }

        let result = self.destination.ensure_assignment(record).await;
        self.capture_constraint(record.origem_id, FISCAL_DEMANDA_TABLE, record, result)
            .await?;

        Ok(ApplyOutcome::Applied)
    }

    /// Intercepts constraint violations, records them with the full mapped
    /// payload, and re-raises the original error.
    async fn capture_constraint<T, R>(
        &self,
        id: i64,
        table: &str,
        record: &R,
        result: SyncResult<T>,
    ) -> SyncResult<T>
    where
        R: Serialize,
    {
        match result {
            Err(error) if error.kind() == ErrorKind::ConstraintViolation => {
                let message = error
                    .detail()
                    .unwrap_or("constraint violation")
                    .to_string();
                self.record_failure(id, table, FailureKind::ConstraintViolation, &message, record)
                    .await;

                Err(error)
            }
            other => other,
        }
    }

    async fn record_failure<R>(
        &self,
        id: i64,
        table: &str,
        error_kind: FailureKind,
        message: &str,
        record: &R,
    ) where
        R: Serialize,
    {
        let payload = serde_json::to_value(record).ok();

        // A failed log write must not mask the original failure.
        if let Err(log_error) = self
            .failure_log
            .record(id, table, error_kind, message, payload)
            .await
        {
            warn!(%log_error, "failed to persist failure log entry");
        }
    }
}
