use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::bail;
use crate::destination::Destination;
use crate::error::{ErrorKind, SyncResult};
use crate::types::{DemandRecord, FiscalDemandaRecord};

#[derive(Debug, Default)]
struct Inner {
    demands: HashMap<i64, DemandRecord>,
    assignments: HashMap<(i64, i64), FiscalDemandaRecord>,
    fiscais: HashSet<i64>,
    known_situacoes: Option<HashSet<i64>>,
}

/// In-memory destination for tests.
///
/// Mirrors the write semantics of the Postgres destination, including the
/// upsert mutable-column subset. When a set of known situação ids is
/// configured, writes referencing an unknown one fail with a
/// Postgres-shaped foreign key violation, which exercises the failure-log
/// classification path.
#[derive(Debug, Clone, Default)]
pub struct MemoryDestination {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryDestination {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts acceptable `situacao_id` values, simulating the foreign key
    /// on `fiscalizacao.demandas`.
    pub async fn with_known_situacoes(self, situacoes: impl IntoIterator<Item = i64>) -> Self {
        {
            let mut inner = self.inner.lock().await;
            inner.known_situacoes = Some(situacoes.into_iter().collect());
        }
        self
    }

    /// Registers an inspector row in `fiscalizacao.fiscais`.
    pub async fn add_fiscal(&self, id: i64) {
        let mut inner = self.inner.lock().await;
        inner.fiscais.insert(id);
    }

    /// Returns a snapshot of the stored demand rows.
    pub async fn demands(&self) -> HashMap<i64, DemandRecord> {
        let inner = self.inner.lock().await;
        inner.demands.clone()
    }

    /// Returns the stored demand row with the given id, if any.
    pub async fn demand(&self, id: i64) -> Option<DemandRecord> {
        let inner = self.inner.lock().await;
        inner.demands.get(&id).cloned()
    }

    /// Returns a snapshot of the stored assignment rows.
    pub async fn assignments(&self) -> HashMap<(i64, i64), FiscalDemandaRecord> {
        let inner = self.inner.lock().await;
        inner.assignments.clone()
    }

    fn check_situacao(inner: &Inner, record: &DemandRecord) -> SyncResult<()> {
        if let (Some(known), Some(situacao_id)) = (&inner.known_situacoes, record.situacao_id) {
            if !known.contains(&situacao_id) {
                bail!(
                    ErrorKind::ConstraintViolation,
                    "Postgres constraint violation",
                    format!(
                        "insert or update on table \"demandas\" violates foreign key \
                         constraint \"demandas_situacao_id_fkey\": situacao_id={situacao_id}"
                    )
                );
            }
        }

        Ok(())
    }

    fn apply_mutable_columns(existing: &mut DemandRecord, record: &DemandRecord) {
        existing.situacao_id = record.situacao_id;
        existing.fiscalizado_demanda = record.fiscalizado_demanda.clone();
        existing.fiscalizado_logradouro = record.fiscalizado_logradouro.clone();
        existing.fiscalizado_numero = record.fiscalizado_numero.clone();
        existing.fiscalizado_complemento = record.fiscalizado_complemento.clone();
        existing.fiscalizado_bairro = record.fiscalizado_bairro.clone();
        existing.fiscalizado_lat = record.fiscalizado_lat.clone();
        existing.fiscalizado_lng = record.fiscalizado_lng.clone();
        existing.data_realizacao = record.data_realizacao;
        existing.ativo = record.ativo;
    }
}

impl Destination for MemoryDestination {
    fn name() -> &'static str {
        "memory"
    }

    async fn demand_exists(&self, id: i64) -> SyncResult<bool> {
        let inner = self.inner.lock().await;
        Ok(inner.demands.contains_key(&id))
    }

    async fn upsert_demand(&self, record: &DemandRecord) -> SyncResult<()> {
        let mut inner = self.inner.lock().await;
        Self::check_situacao(&inner, record)?;

        match inner.demands.get_mut(&record.id) {
            Some(existing) => Self::apply_mutable_columns(existing, record),
            None => {
                inner.demands.insert(record.id, record.clone());
            }
        }

        Ok(())
    }

    async fn update_demand(&self, record: &DemandRecord) -> SyncResult<bool> {
        let mut inner = self.inner.lock().await;
        Self::check_situacao(&inner, record)?;

        match inner.demands.get_mut(&record.id) {
            Some(existing) => {
                Self::apply_mutable_columns(existing, record);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn soft_delete_demand(&self, id: i64) -> SyncResult<()> {
        let mut inner = self.inner.lock().await;
        if let Some(existing) = inner.demands.get_mut(&id) {
            existing.ativo = false;
        }

        Ok(())
    }

    async fn fiscal_exists(&self, id: i64) -> SyncResult<bool> {
        let inner = self.inner.lock().await;
        Ok(inner.fiscais.contains(&id))
    }

    async fn ensure_assignment(&self, record: &FiscalDemandaRecord) -> SyncResult<()> {
        let mut inner = self.inner.lock().await;
        inner
            .assignments
            .entry((record.demanda_id, record.fiscal_id))
            .or_insert_with(|| record.clone());

        Ok(())
    }

    async fn delete_assignment(&self, demanda_id: i64, fiscal_id: i64) -> SyncResult<()> {
        let mut inner = self.inner.lock().await;
        inner.assignments.remove(&(demanda_id, fiscal_id));

        Ok(())
    }

    async fn demand_ids_in(&self, ids: &[i64]) -> SyncResult<HashSet<i64>> {
        let inner = self.inner.lock().await;
        Ok(ids
            .iter()
            .copied()
            .filter(|id| inner.demands.contains_key(id))
            .collect())
    }

    async fn demand_ids(&self) -> SyncResult<HashSet<i64>> {
        let inner = self.inner.lock().await;
        Ok(inner.demands.keys().copied().collect())
    }

    async fn fiscal_ids(&self) -> SyncResult<HashSet<i64>> {
        let inner = self.inner.lock().await;
        Ok(inner.fiscais.clone())
    }

    async fn assignment_pairs(&self) -> SyncResult<HashSet<(i64, i64)>> {
        let inner = self.inner.lock().await;
        Ok(inner.assignments.keys().copied().collect())
    }
}
