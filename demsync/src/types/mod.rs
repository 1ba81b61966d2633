//! Data model for the synchronization pipeline.
//!
//! Source rows are the typed per-entity shapes fetched from the source store;
//! records are their destination-shape projections produced by the mappers.
//! Change events are ephemeral, built from deserialized notification
//! payloads.

mod coerce;
mod demand;
mod event;
mod fiscal;

pub use demand::{Classificacao, DemandRecord, DemandSourceRow};
pub use event::{ChangeEvent, DEMANDA_TABLE, EntityKind, EventType, FISCAL_DEMANDA_TABLE};
pub use fiscal::{AssignmentKey, FiscalDemandaRecord, FiscalDemandaSourceRow};
