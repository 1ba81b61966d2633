use std::time::Duration;

use demsync_config::shared::{IntoConnectOptions, PgConnectionConfig};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::debug;

use crate::error::SyncResult;
use crate::source::SourceStore;
use crate::types::{AssignmentKey, DemandSourceRow, FiscalDemandaSourceRow};

/// Maximum number of connections in the pool.
///
/// Set to 2 so a reconciliation sweep and a notification fetch can run
/// concurrently without holding connections open permanently.
const MAX_POOL_CONNECTIONS: u32 = 2;

/// Duration after which idle connections are closed.
const IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Creates a lazily connected pool with automatic idle connection cleanup.
///
/// Returns immediately without establishing any connections. Connections are
/// created on-demand when queries are executed and closed again after the
/// idle timeout, which suits the bursty read pattern of notification fetches.
fn create_database_pool(config: &PgConnectionConfig) -> PgPool {
    let options = config.with_db();

    PgPoolOptions::new()
        .min_connections(0)
        .max_connections(MAX_POOL_CONNECTIONS)
        .idle_timeout(Some(IDLE_TIMEOUT))
        .connect_lazy_with(options)
}

/// Source store backed by the Postgres system of record.
///
/// Rows are fetched as `row_to_json` and deserialized at the boundary, so
/// the store tolerates extra columns and numeric-string keys without any
/// schema coupling beyond the consumed fields.
#[derive(Debug, Clone)]
pub struct PgSourceStore {
    pool: PgPool,
}

impl PgSourceStore {
    pub fn new(config: &PgConnectionConfig) -> Self {
        Self {
            pool: create_database_pool(config),
        }
    }

    /// Closes the connection pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn fetch_row_json(&self, query: &str, id: i64) -> SyncResult<Option<serde_json::Value>> {
        let row = sqlx::query_scalar::<_, serde_json::Value>(query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row)
    }
}

impl SourceStore for PgSourceStore {
    fn name() -> &'static str {
        "postgres"
    }

    async fn fetch_demand(&self, id: i64) -> SyncResult<Option<DemandSourceRow>> {
        debug!(id, "fetching demand row from source");

        let row = self
            .fetch_row_json(
                "select row_to_json(t) from public.demanda t where t.id = $1",
                id,
            )
            .await?;

        row.map(serde_json::from_value).transpose().map_err(Into::into)
    }

    async fn fetch_fiscal_demanda(&self, id: i64) -> SyncResult<Option<FiscalDemandaSourceRow>> {
        debug!(id, "fetching assignment row from source");

        let row = self
            .fetch_row_json(
                "select row_to_json(t) from public.fiscaldemanda t where t.id = $1",
                id,
            )
            .await?;

        row.map(serde_json::from_value).transpose().map_err(Into::into)
    }

    async fn recent_demand_ids(&self, limit: i64) -> SyncResult<Vec<i64>> {
        let ids = sqlx::query_scalar::<_, i64>(
            "select id::bigint from public.demanda order by id desc limit $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }

    async fn active_assignment_keys(&self, limit: Option<i64>) -> SyncResult<Vec<AssignmentKey>> {
        // `limit null` means no limit, which is how the unbounded backfill
        // reuses the same query.
        let rows = sqlx::query_as::<_, (i64, i64, i64)>(
            r#"
            select id::bigint, demanda_id::bigint, usuario_id::bigint
            from public.fiscaldemanda
            where ativo = true
              and demanda_id is not null
              and usuario_id is not null
            order by id desc
            limit $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, demanda_id, fiscal_id)| AssignmentKey {
                id,
                demanda_id,
                fiscal_id,
            })
            .collect())
    }
}
