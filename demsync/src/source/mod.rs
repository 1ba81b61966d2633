//! Read-only access to the system of record.
//!
//! Change notifications carry only a key, so every apply re-reads the row
//! through a [`SourceStore`]. The Postgres implementation is used in
//! production; the in-memory implementation backs tests.

pub mod base;
pub mod memory;
pub mod postgres;

pub use base::SourceStore;
pub use memory::MemorySourceStore;
pub use postgres::PgSourceStore;
