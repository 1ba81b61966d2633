use chrono::Utc;

use crate::types::{FiscalDemandaRecord, FiscalDemandaSourceRow};

/// Projects a source assignment row onto the `fiscalizacao.demandas_fiscais`
/// columns.
///
/// Missing endpoint keys are mapped to `0` so that
/// [`FiscalDemandaRecord::validate`] reports them instead of a panic or a
/// silent skip here.
pub fn map_fiscal_demanda(row: FiscalDemandaSourceRow) -> FiscalDemandaRecord {
    FiscalDemandaRecord {
        demanda_id: row.demanda_id.unwrap_or(0),
        fiscal_id: row.usuario_id.unwrap_or(0),
        ativo: row.ativo.unwrap_or(true),
        data_criacao: row.data_criacao.unwrap_or_else(|| Utc::now().naive_utc()),
        usuario_alteracao: row.usuarioalteracao,
        origem_id: row.id,
    }
}
