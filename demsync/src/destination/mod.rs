//! Write access to the synchronized store.
//!
//! All statements are idempotent so applies can be retried: demand writes
//! key on the source id, assignment writes key on the `(demanda_id,
//! fiscal_id)` pair. The Postgres implementation is used in production; the
//! in-memory implementation backs tests.

pub mod base;
pub mod memory;
pub mod postgres;

pub use base::Destination;
pub use memory::MemoryDestination;
pub use postgres::PgDestination;
