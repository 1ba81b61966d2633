use std::fmt;

use serde::{Deserialize, Serialize};

/// Source table carrying demand rows.
pub const DEMANDA_TABLE: &str = "public.demanda";

/// Source table carrying inspector-to-demand assignment rows.
pub const FISCAL_DEMANDA_TABLE: &str = "public.fiscaldemanda";

/// Kind of row-level change carried by a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventType {
    Insert,
    Update,
    Delete,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventType::Insert => f.write_str("INSERT"),
            EventType::Update => f.write_str("UPDATE"),
            EventType::Delete => f.write_str("DELETE"),
        }
    }
}

/// Closed set of entity kinds the pipeline knows how to synchronize.
///
/// Unknown source tables map to [`EntityKind::Unsupported`], which
/// short-circuits dispatch instead of failing a lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    /// Primary entity, synchronized from `public.demanda` into
    /// `fiscalizacao.demandas`.
    Demand,
    /// Relation entity, synchronized from `public.fiscaldemanda` into
    /// `fiscalizacao.demandas_fiscais`.
    FiscalDemanda,
    /// No handler configured for the table.
    Unsupported,
}

impl EntityKind {
    /// Resolves a qualified source table name to its entity kind.
    pub fn from_table(table: &str) -> EntityKind {
        match table {
            DEMANDA_TABLE => EntityKind::Demand,
            FISCAL_DEMANDA_TABLE => EntityKind::FiscalDemanda,
            _ => EntityKind::Unsupported,
        }
    }
}

/// A change event deserialized from a notification payload.
///
/// Ephemeral: constructed per notification and discarded once the pipeline
/// invocation that handled it returns.
#[derive(Debug, Clone, Deserialize)]
pub struct ChangeEvent {
    /// Primary key of the changed source row.
    pub id: i64,
    /// Qualified name of the source table, e.g. `public.demanda`.
    pub table: String,
    /// Kind of change.
    pub event_type: EventType,
}

impl ChangeEvent {
    /// Returns the entity kind this event targets.
    pub fn entity(&self) -> EntityKind {
        EntityKind::from_table(&self.table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_a_notification_payload() {
        let event: ChangeEvent =
            serde_json::from_str(r#"{"id": 42, "table": "public.demanda", "event_type": "INSERT"}"#)
                .unwrap();

        assert_eq!(event.id, 42);
        assert_eq!(event.entity(), EntityKind::Demand);
        assert_eq!(event.event_type, EventType::Insert);
    }

    #[test]
    fn unknown_tables_resolve_to_unsupported() {
        assert_eq!(EntityKind::from_table("public.pessoa"), EntityKind::Unsupported);
        assert_eq!(
            EntityKind::from_table("public.fiscaldemanda"),
            EntityKind::FiscalDemanda
        );
    }

    #[test]
    fn rejects_unknown_event_types() {
        let result: Result<ChangeEvent, _> =
            serde_json::from_str(r#"{"id": 1, "table": "public.demanda", "event_type": "TRUNCATE"}"#);
        assert!(result.is_err());
    }
}
