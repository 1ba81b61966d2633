use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::SyncResult;
use crate::source::SourceStore;
use crate::types::{AssignmentKey, DemandSourceRow, FiscalDemandaSourceRow};

#[derive(Debug, Default)]
struct Inner {
    demands: HashMap<i64, DemandSourceRow>,
    assignments: HashMap<i64, FiscalDemandaSourceRow>,
}

/// In-memory source store for tests.
///
/// Holds source rows keyed by id; mutating helpers let a test stage the
/// source state a notification or reconciliation run should observe.
#[derive(Debug, Clone, Default)]
pub struct MemorySourceStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemorySourceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_demand(&self, row: DemandSourceRow) {
        let mut inner = self.inner.lock().await;
        inner.demands.insert(row.id, row);
    }

    pub async fn remove_demand(&self, id: i64) {
        let mut inner = self.inner.lock().await;
        inner.demands.remove(&id);
    }

    pub async fn insert_assignment(&self, row: FiscalDemandaSourceRow) {
        let mut inner = self.inner.lock().await;
        inner.assignments.insert(row.id, row);
    }

    pub async fn remove_assignment(&self, id: i64) {
        let mut inner = self.inner.lock().await;
        inner.assignments.remove(&id);
    }
}

impl SourceStore for MemorySourceStore {
    fn name() -> &'static str {
        "memory"
    }

    async fn fetch_demand(&self, id: i64) -> SyncResult<Option<DemandSourceRow>> {
        let inner = self.inner.lock().await;
        Ok(inner.demands.get(&id).cloned())
    }

    async fn fetch_fiscal_demanda(&self, id: i64) -> SyncResult<Option<FiscalDemandaSourceRow>> {
        let inner = self.inner.lock().await;
        Ok(inner.assignments.get(&id).cloned())
    }

    async fn recent_demand_ids(&self, limit: i64) -> SyncResult<Vec<i64>> {
        let inner = self.inner.lock().await;
        let mut ids: Vec<i64> = inner.demands.keys().copied().collect();
        ids.sort_unstable_by(|a, b| b.cmp(a));
        ids.truncate(limit.max(0) as usize);

        Ok(ids)
    }

    async fn active_assignment_keys(&self, limit: Option<i64>) -> SyncResult<Vec<AssignmentKey>> {
        let inner = self.inner.lock().await;
        let mut keys: Vec<AssignmentKey> = inner
            .assignments
            .values()
            .filter(|row| row.ativo.unwrap_or(true))
            .filter_map(|row| {
                Some(AssignmentKey {
                    id: row.id,
                    demanda_id: row.demanda_id?,
                    fiscal_id: row.usuario_id?,
                })
            })
            .collect();
        keys.sort_unstable_by(|a, b| b.id.cmp(&a.id));

        if let Some(limit) = limit {
            keys.truncate(limit.max(0) as usize);
        }

        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn assignment(id: i64, demanda_id: Option<i64>, ativo: Option<bool>) -> FiscalDemandaSourceRow {
        serde_json::from_value(json!({
            "id": id,
            "demanda_id": demanda_id,
            "usuario_id": 7,
            "ativo": ativo
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn recent_demand_ids_are_newest_first_and_bounded() {
        let store = MemorySourceStore::new();
        for id in [3, 1, 2] {
            store
                .insert_demand(
                    serde_json::from_value(json!({
                        "id": id,
                        "data_criacao": "2024-03-01T08:30:00",
                        "ativo": true
                    }))
                    .unwrap(),
                )
                .await;
        }

        let ids = store.recent_demand_ids(2).await.unwrap();
        assert_eq!(ids, vec![3, 2]);
    }

    #[tokio::test]
    async fn assignment_universe_excludes_inactive_and_incomplete_rows() {
        let store = MemorySourceStore::new();
        store.insert_assignment(assignment(1, Some(10), Some(true))).await;
        store.insert_assignment(assignment(2, Some(11), Some(false))).await;
        store.insert_assignment(assignment(3, None, None)).await;
        store.insert_assignment(assignment(4, Some(12), None)).await;

        let keys = store.active_assignment_keys(None).await.unwrap();
        let ids: Vec<i64> = keys.iter().map(|key| key.id).collect();
        assert_eq!(ids, vec![4, 1]);
    }
}
