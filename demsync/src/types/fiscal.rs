use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::types::coerce;

/// A `public.fiscaldemanda` row as fetched from the source store.
///
/// The source `usuario_id` column references the inspector (fiscal).
#[derive(Debug, Clone, Deserialize)]
pub struct FiscalDemandaSourceRow {
    #[serde(deserialize_with = "coerce::key")]
    pub id: i64,
    #[serde(default, deserialize_with = "coerce::optional_key")]
    pub demanda_id: Option<i64>,
    #[serde(default, deserialize_with = "coerce::optional_key")]
    pub usuario_id: Option<i64>,
    #[serde(default)]
    pub ativo: Option<bool>,
    #[serde(default)]
    pub data_criacao: Option<NaiveDateTime>,
    #[serde(default)]
    pub usuarioalteracao: Option<String>,
}

/// Destination-shape projection of an inspector assignment.
///
/// The destination row is identified by the composite key
/// `(demanda_id, fiscal_id)`; `origem_id` is the source row id, carried only
/// for failure reporting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FiscalDemandaRecord {
    pub demanda_id: i64,
    pub fiscal_id: i64,
    pub ativo: bool,
    pub data_criacao: NaiveDateTime,
    pub usuario_alteracao: Option<String>,
    #[serde(skip)]
    pub origem_id: i64,
}

impl FiscalDemandaRecord {
    /// Checks that both endpoint keys are usable.
    ///
    /// Returns the violations found; an empty list means the record is valid.
    pub fn validate(&self) -> Vec<&'static str> {
        let mut violations = Vec::new();

        if self.demanda_id <= 0 {
            violations.push("demanda_id must be greater than 0");
        }

        if self.fiscal_id <= 0 {
            violations.push("fiscal_id must be greater than 0");
        }

        violations
    }
}

/// Key columns of a source assignment row, used by reconciliation to filter
/// the replay universe without fetching whole rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssignmentKey {
    /// Source row id.
    pub id: i64,
    /// Demand endpoint.
    pub demanda_id: i64,
    /// Inspector endpoint (source `usuario_id`).
    pub fiscal_id: i64,
}
