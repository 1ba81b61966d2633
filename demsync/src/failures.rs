//! Durable, deduplicating log of classified sync failures.
//!
//! The log is a single JSON document rewritten on every distinct failure.
//! It exists for operator triage: besides the raw failure entries it keeps
//! an aggregate of distinct offending values per field, so a batch of
//! foreign key violations reads as "these status ids are missing in the
//! lookup table" instead of a wall of identical errors.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::SyncResult;

/// Destination table prefixes recognized when deriving the offending field
/// from a foreign key constraint name. Longest prefix first.
const CONSTRAINT_TABLE_PREFIXES: &[&str] = &["demandas_fiscais_", "demandas_"];

/// Classification of a recorded failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    ConstraintViolation,
    ValidationError,
}

/// A single classified failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureRecord {
    /// Source row id the apply was for.
    pub id: i64,
    /// Source table the event referenced.
    pub table: String,
    pub error_kind: FailureKind,
    /// Constraint name parsed from the error message, when present.
    pub constraint_name: Option<String>,
    /// Field derived from the constraint name (`{table}_{field}_fkey`).
    pub offending_field: Option<String>,
    /// Value of the offending field in the payload, best-effort.
    pub offending_value: Option<serde_json::Value>,
    /// Full mapped payload at the time of the failure.
    pub full_payload: Option<serde_json::Value>,
    pub message: String,
    pub timestamp: String,
}

/// Persisted shape of the failure log file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureLogDocument {
    pub constraint_errors: Vec<FailureRecord>,
    /// Field name to distinct offending values seen across all failures.
    pub valores_faltando: BTreeMap<String, Vec<serde_json::Value>>,
    pub total: usize,
    pub ultima_atualizacao: String,
}

impl FailureLogDocument {
    fn empty() -> Self {
        Self {
            constraint_errors: Vec::new(),
            valores_faltando: BTreeMap::new(),
            total: 0,
            ultima_atualizacao: Utc::now().to_rfc3339(),
        }
    }
}

#[derive(Debug)]
struct Inner {
    path: PathBuf,
    document: FailureLogDocument,
}

/// Process-wide failure log with exclusive-access persistence.
///
/// The whole load-mutate-persist cycle runs under one async mutex, so
/// concurrent failures from the listener and a reconciliation sweep cannot
/// lose each other's entries.
#[derive(Debug, Clone)]
pub struct FailureLog {
    inner: Arc<Mutex<Inner>>,
}

impl FailureLog {
    /// Opens the failure log at `path`, loading any existing document.
    ///
    /// A missing file starts an empty log; an unreadable or corrupt file is
    /// replaced by an empty document on the next write, since the log must
    /// never block the pipeline.
    pub async fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let document = match tokio::fs::read(&path).await {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(document) => document,
                Err(error) => {
                    warn!(
                        path = %path.display(),
                        %error,
                        "failure log file is corrupt, starting empty"
                    );
                    FailureLogDocument::empty()
                }
            },
            Err(_) => FailureLogDocument::empty(),
        };

        Self {
            inner: Arc::new(Mutex::new(Inner { path, document })),
        }
    }

    /// Records a failure and flushes the document to disk.
    ///
    /// Returns `false` when an identical `(id, table, message)` entry is
    /// already present; duplicates are not re-appended and do not touch the
    /// file.
    pub async fn record(
        &self,
        id: i64,
        table: &str,
        error_kind: FailureKind,
        message: &str,
        payload: Option<serde_json::Value>,
    ) -> SyncResult<bool> {
        let mut inner = self.inner.lock().await;

        let already_recorded = inner
            .document
            .constraint_errors
            .iter()
            .any(|entry| entry.id == id && entry.table == table && entry.message == message);
        if already_recorded {
            return Ok(false);
        }

        let constraint_name = parse_constraint_name(message);
        let offending_field = constraint_name.as_deref().map(derive_offending_field);
        let offending_value = match (&offending_field, &payload) {
            (Some(field), Some(payload)) => payload.get(field).cloned(),
            _ => None,
        };

        info!(
            id,
            table,
            ?error_kind,
            constraint = constraint_name.as_deref(),
            field = offending_field.as_deref(),
            "recording sync failure"
        );

        if let (Some(field), Some(value)) = (&offending_field, &offending_value) {
            if !value.is_null() {
                let values = inner
                    .document
                    .valores_faltando
                    .entry(field.clone())
                    .or_default();
                if !values.contains(value) {
                    values.push(value.clone());
                }
            }
        }

        inner.document.constraint_errors.push(FailureRecord {
            id,
            table: table.to_string(),
            error_kind,
            constraint_name,
            offending_field,
            offending_value,
            full_payload: payload,
            message: message.to_string(),
            timestamp: Utc::now().to_rfc3339(),
        });
        inner.document.total = inner.document.constraint_errors.len();
        inner.document.ultima_atualizacao = Utc::now().to_rfc3339();

        persist(&inner.path, &inner.document).await?;

        Ok(true)
    }

    /// Returns a snapshot of the current document.
    pub async fn snapshot(&self) -> FailureLogDocument {
        let inner = self.inner.lock().await;
        inner.document.clone()
    }
}

async fn persist(path: &Path, document: &FailureLogDocument) -> SyncResult<()> {
    let bytes = serde_json::to_vec_pretty(document)?;
    tokio::fs::write(path, bytes).await?;

    Ok(())
}

/// Extracts the quoted constraint name from a Postgres error message.
fn parse_constraint_name(message: &str) -> Option<String> {
    let (_, rest) = message.split_once("constraint \"")?;
    let (name, _) = rest.split_once('"')?;

    Some(name.to_string())
}

/// Derives the offending field from a constraint named
/// `{table}_{field}_fkey`, falling back to the raw constraint name.
fn derive_offending_field(constraint_name: &str) -> String {
    let Some(stripped) = constraint_name.strip_suffix("_fkey") else {
        return constraint_name.to_string();
    };

    for prefix in CONSTRAINT_TABLE_PREFIXES {
        if let Some(field) = stripped.strip_prefix(prefix) {
            return field.to_string();
        }
    }

    constraint_name.to_string()
}
