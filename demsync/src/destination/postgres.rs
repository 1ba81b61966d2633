use std::collections::HashSet;
use std::time::Duration;

use demsync_config::shared::{IntoConnectOptions, PgConnectionConfig};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::debug;

use crate::destination::Destination;
use crate::error::SyncResult;
use crate::types::{DemandRecord, FiscalDemandaRecord};

/// Maximum number of connections in the pool.
///
/// Set to 2 so concurrent applies for distinct keys are not fully
/// serialized on a single connection.
const MAX_POOL_CONNECTIONS: u32 = 2;

/// Duration after which idle connections are closed.
const IDLE_TIMEOUT: Duration = Duration::from_secs(30);

fn create_database_pool(config: &PgConnectionConfig) -> PgPool {
    let options = config.with_db();

    PgPoolOptions::new()
        .min_connections(0)
        .max_connections(MAX_POOL_CONNECTIONS)
        .idle_timeout(Some(IDLE_TIMEOUT))
        .connect_lazy_with(options)
}

/// Destination store backed by the synchronized Postgres database.
///
/// Writes target the `fiscalizacao` schema; `fiscalizacao.fiscais` is only
/// ever read, for relation endpoint checks.
#[derive(Debug, Clone)]
pub struct PgDestination {
    pool: PgPool,
}

impl PgDestination {
    pub fn new(config: &PgConnectionConfig) -> Self {
        Self {
            pool: create_database_pool(config),
        }
    }

    /// Closes the connection pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

impl Destination for PgDestination {
    fn name() -> &'static str {
        "postgres"
    }

    async fn demand_exists(&self, id: i64) -> SyncResult<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            "select exists(select 1 from fiscalizacao.demandas where id = $1)",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    async fn upsert_demand(&self, record: &DemandRecord) -> SyncResult<()> {
        debug!(id = record.id, "upserting demand");

        sqlx::query(
            r#"
            insert into fiscalizacao.demandas (
                id, situacao_id, motivo_id, fiscal_id,
                fiscalizado_demanda, fiscalizado_cpf_cnpj, fiscalizado_nome,
                fiscalizado_logradouro, fiscalizado_numero,
                fiscalizado_complemento, fiscalizado_bairro,
                fiscalizado_municipio, fiscalizado_uf,
                fiscalizado_lat, fiscalizado_lng,
                classificacao, data_criacao, data_realizacao,
                ativo, tipo_rota, grupo_ocorrencia_id
            ) values (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11,
                $12, $13, $14, $15, $16, $17, $18, $19, $20, $21
            )
            on conflict (id) do update set
                situacao_id = excluded.situacao_id,
                fiscalizado_demanda = excluded.fiscalizado_demanda,
                fiscalizado_logradouro = excluded.fiscalizado_logradouro,
                fiscalizado_numero = excluded.fiscalizado_numero,
                fiscalizado_complemento = excluded.fiscalizado_complemento,
                fiscalizado_bairro = excluded.fiscalizado_bairro,
                fiscalizado_lat = excluded.fiscalizado_lat,
                fiscalizado_lng = excluded.fiscalizado_lng,
                data_realizacao = excluded.data_realizacao,
                ativo = excluded.ativo
            "#,
        )
        .bind(record.id)
        .bind(record.situacao_id)
        .bind(record.motivo_id)
        .bind(record.fiscal_id)
        .bind(&record.fiscalizado_demanda)
        .bind(&record.fiscalizado_cpf_cnpj)
        .bind(&record.fiscalizado_nome)
        .bind(&record.fiscalizado_logradouro)
        .bind(&record.fiscalizado_numero)
        .bind(&record.fiscalizado_complemento)
        .bind(&record.fiscalizado_bairro)
        .bind(&record.fiscalizado_municipio)
        .bind(&record.fiscalizado_uf)
        .bind(&record.fiscalizado_lat)
        .bind(&record.fiscalizado_lng)
        .bind(record.classificacao.as_str())
        .bind(record.data_criacao)
        .bind(record.data_realizacao)
        .bind(record.ativo)
        .bind(&record.tipo_rota)
        .bind(record.grupo_ocorrencia_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update_demand(&self, record: &DemandRecord) -> SyncResult<bool> {
        debug!(id = record.id, "updating demand");

        let result = sqlx::query(
            r#"
            update fiscalizacao.demandas set
                situacao_id = $2,
                fiscalizado_demanda = $3,
                fiscalizado_logradouro = $4,
                fiscalizado_numero = $5,
                fiscalizado_complemento = $6,
                fiscalizado_bairro = $7,
                fiscalizado_lat = $8,
                fiscalizado_lng = $9,
                data_realizacao = $10,
                ativo = $11
            where id = $1
            "#,
        )
        .bind(record.id)
        .bind(record.situacao_id)
        .bind(&record.fiscalizado_demanda)
        .bind(&record.fiscalizado_logradouro)
        .bind(&record.fiscalizado_numero)
        .bind(&record.fiscalizado_complemento)
        .bind(&record.fiscalizado_bairro)
        .bind(&record.fiscalizado_lat)
        .bind(&record.fiscalizado_lng)
        .bind(record.data_realizacao)
        .bind(record.ativo)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn soft_delete_demand(&self, id: i64) -> SyncResult<()> {
        debug!(id, "soft deleting demand");

        sqlx::query("update fiscalizacao.demandas set ativo = false where id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn fiscal_exists(&self, id: i64) -> SyncResult<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            "select exists(select 1 from fiscalizacao.fiscais where id = $1)",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    async fn ensure_assignment(&self, record: &FiscalDemandaRecord) -> SyncResult<()> {
        debug!(
            demanda_id = record.demanda_id,
            fiscal_id = record.fiscal_id,
            "ensuring assignment"
        );

        sqlx::query(
            r#"
            insert into fiscalizacao.demandas_fiscais (
                demanda_id, fiscal_id, ativo, data_criacao, usuario_alteracao
            ) values ($1, $2, $3, $4, $5)
            on conflict (demanda_id, fiscal_id) do nothing
            "#,
        )
        .bind(record.demanda_id)
        .bind(record.fiscal_id)
        .bind(record.ativo)
        .bind(record.data_criacao)
        .bind(&record.usuario_alteracao)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete_assignment(&self, demanda_id: i64, fiscal_id: i64) -> SyncResult<()> {
        debug!(demanda_id, fiscal_id, "deleting assignment");

        sqlx::query(
            "delete from fiscalizacao.demandas_fiscais where demanda_id = $1 and fiscal_id = $2",
        )
        .bind(demanda_id)
        .bind(fiscal_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn demand_ids_in(&self, ids: &[i64]) -> SyncResult<HashSet<i64>> {
        let present = sqlx::query_scalar::<_, i64>(
            "select id from fiscalizacao.demandas where id = any($1)",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(present.into_iter().collect())
    }

    async fn demand_ids(&self) -> SyncResult<HashSet<i64>> {
        let ids = sqlx::query_scalar::<_, i64>("select id from fiscalizacao.demandas")
            .fetch_all(&self.pool)
            .await?;

        Ok(ids.into_iter().collect())
    }

    async fn fiscal_ids(&self) -> SyncResult<HashSet<i64>> {
        let ids = sqlx::query_scalar::<_, i64>("select id from fiscalizacao.fiscais")
            .fetch_all(&self.pool)
            .await?;

        Ok(ids.into_iter().collect())
    }

    async fn assignment_pairs(&self) -> SyncResult<HashSet<(i64, i64)>> {
        let pairs = sqlx::query_as::<_, (i64, i64)>(
            "select demanda_id, fiscal_id from fiscalizacao.demandas_fiscais",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(pairs.into_iter().collect())
    }
}
