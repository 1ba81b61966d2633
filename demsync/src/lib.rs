//! Change-data-capture middleware keeping a destination relational store in
//! sync with a source store.
//!
//! Two independent triggers feed one convergence pipeline: the
//! [`listener::NotificationListener`] reacts to live change events on a
//! Postgres LISTEN/NOTIFY channel, and the [`reconcile::Reconciler`]
//! periodically replays source keys missing from the destination. Both paths
//! run fetched source rows through the pure entity mappers and the idempotent
//! [`apply::ApplyEngine`], so duplicate and out-of-order delivery converge to
//! the same destination state. Constraint violations are classified and
//! captured in the durable [`failures::FailureLog`] for operator triage.

pub mod apply;
pub mod concurrency;
pub mod destination;
pub mod error;
pub mod failures;
pub mod listener;
mod macros;
pub mod mappers;
pub mod pipeline;
pub mod reconcile;
pub mod scheduler;
pub mod source;
pub mod types;
