//! Pure, stateless translation of source row shapes into destination row
//! shapes.
//!
//! Mappers never perform I/O and never fail: missing optional fields are
//! replaced by documented defaults, so the apply engine always receives a
//! fixed-shape record.

mod demand;
mod fiscal;

pub use demand::DemandMapper;
pub use fiscal::map_fiscal_demanda;
