use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::types::coerce;

/// Derived classification of a demand.
///
/// Projection of the source `os_direta` flag; no other values are ever
/// produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Classificacao {
    Direta,
    Ordinaria,
}

impl Classificacao {
    /// Returns the value as stored in the destination column.
    pub fn as_str(&self) -> &'static str {
        match self {
            Classificacao::Direta => "direta",
            Classificacao::Ordinaria => "ordinaria",
        }
    }
}

/// A `public.demanda` row as fetched from the source store.
///
/// Key fields tolerate numeric strings (see [`crate::types::coerce`]); all
/// optional columns are documented as nullable in the source schema.
#[derive(Debug, Clone, Deserialize)]
pub struct DemandSourceRow {
    #[serde(deserialize_with = "coerce::key")]
    pub id: i64,
    #[serde(default, deserialize_with = "coerce::optional_key")]
    pub situacao: Option<i64>,
    #[serde(default)]
    pub descricao: Option<String>,
    #[serde(default)]
    pub protocolo: Option<String>,
    #[serde(default)]
    pub logradouro: Option<String>,
    #[serde(default)]
    pub numero: Option<String>,
    #[serde(default)]
    pub complemento: Option<String>,
    #[serde(default)]
    pub bairro: Option<String>,
    #[serde(default)]
    pub municipio: Option<String>,
    #[serde(default)]
    pub uf: Option<String>,
    #[serde(default)]
    pub latitude: Option<String>,
    #[serde(default)]
    pub longitude: Option<String>,
    #[serde(default)]
    pub os_direta: Option<bool>,
    pub data_criacao: NaiveDateTime,
    #[serde(default)]
    pub datafiscalizacao: Option<NaiveDateTime>,
    #[serde(default)]
    pub dataexecucao: Option<NaiveDateTime>,
    pub ativo: bool,
    #[serde(default)]
    pub tipo_rota: Option<String>,
    #[serde(default, deserialize_with = "coerce::optional_key")]
    pub grupodemanda_id: Option<i64>,
}

/// Destination-shape projection of a demand, consumed by the apply engine.
///
/// Immutable once constructed; field names match the columns of
/// `fiscalizacao.demandas` so the serialized form doubles as the failure-log
/// payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DemandRecord {
    pub id: i64,
    pub situacao_id: Option<i64>,
    pub motivo_id: Option<i64>,
    pub fiscal_id: Option<i64>,
    pub fiscalizado_demanda: String,
    pub fiscalizado_cpf_cnpj: String,
    pub fiscalizado_nome: String,
    pub fiscalizado_logradouro: String,
    pub fiscalizado_numero: String,
    pub fiscalizado_complemento: String,
    pub fiscalizado_bairro: String,
    pub fiscalizado_municipio: Option<String>,
    pub fiscalizado_uf: Option<String>,
    pub fiscalizado_lat: String,
    pub fiscalizado_lng: String,
    pub classificacao: Classificacao,
    pub data_criacao: NaiveDateTime,
    pub data_realizacao: NaiveDateTime,
    pub ativo: bool,
    pub tipo_rota: Option<String>,
    pub grupo_ocorrencia_id: i64,
}
