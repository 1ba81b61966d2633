use crate::types::{Classificacao, DemandRecord, DemandSourceRow};

/// Maps source demand rows into their destination shape.
///
/// The mapper is pure and total: every optional source column has a
/// documented fallback, so mapping never fails.
#[derive(Debug, Clone, Copy)]
pub struct DemandMapper {
    /// Destination `grupo_ocorrencia_id` used when the source row has no
    /// `grupodemanda_id`.
    pub default_grupo_ocorrencia_id: i64,
}

impl DemandMapper {
    pub fn new(default_grupo_ocorrencia_id: i64) -> Self {
        Self {
            default_grupo_ocorrencia_id,
        }
    }

    /// Projects a source row onto the `fiscalizacao.demandas` columns.
    pub fn map(&self, row: DemandSourceRow) -> DemandRecord {
        let fiscalizado_demanda = first_non_empty(&row.descricao)
            .or_else(|| first_non_empty(&row.protocolo))
            .unwrap_or_else(|| format!("DEMANDA-{}", row.id));

        let classificacao = if row.os_direta == Some(true) {
            Classificacao::Direta
        } else {
            Classificacao::Ordinaria
        };

        // Realization date prefers the inspection timestamp, then the
        // execution timestamp, then creation.
        let data_realizacao = row
            .datafiscalizacao
            .or(row.dataexecucao)
            .unwrap_or(row.data_criacao);

        DemandRecord {
            id: row.id,
            situacao_id: row.situacao,
            motivo_id: None,
            fiscal_id: None,
            fiscalizado_demanda,
            fiscalizado_cpf_cnpj: String::new(),
            fiscalizado_nome: String::new(),
            fiscalizado_logradouro: row.logradouro.unwrap_or_default(),
            fiscalizado_numero: row.numero.unwrap_or_default(),
            fiscalizado_complemento: row.complemento.unwrap_or_default(),
            fiscalizado_bairro: row.bairro.unwrap_or_default(),
            fiscalizado_municipio: row.municipio,
            fiscalizado_uf: row.uf,
            fiscalizado_lat: row.latitude.unwrap_or_default(),
            fiscalizado_lng: row.longitude.unwrap_or_default(),
            classificacao,
            data_criacao: row.data_criacao,
            data_realizacao,
            ativo: row.ativo,
            tipo_rota: row.tipo_rota,
            grupo_ocorrencia_id: row.grupodemanda_id.unwrap_or(self.default_grupo_ocorrencia_id),
        }
    }
}

fn first_non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .filter(|text| !text.trim().is_empty())
        .map(str::to_owned)
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use serde_json::json;

    use super::*;
    use crate::types::DemandSourceRow;

    fn row_from_json(value: serde_json::Value) -> DemandSourceRow {
        serde_json::from_value(value).expect("source row should deserialize")
    }

    #[test]
    fn minimal_row_maps_with_defaults() {
        let mapper = DemandMapper::new(1);
        let row = row_from_json(json!({
            "id": 42,
            "situacao": 2,
            "descricao": "Case 42",
            "data_criacao": "2024-03-01T08:30:00",
            "ativo": true
        }));

        let record = mapper.map(row);

        assert_eq!(record.id, 42);
        assert_eq!(record.situacao_id, Some(2));
        assert_eq!(record.fiscalizado_demanda, "Case 42");
        assert_eq!(record.fiscalizado_cpf_cnpj, "");
        assert_eq!(record.fiscalizado_logradouro, "");
        assert_eq!(record.classificacao, Classificacao::Ordinaria);
        assert_eq!(record.data_realizacao, record.data_criacao);
        assert!(record.ativo);
        assert_eq!(record.grupo_ocorrencia_id, 1);
    }

    #[test]
    fn description_falls_back_to_protocol_then_synthetic_label() {
        let mapper = DemandMapper::new(1);

        let with_protocol = mapper.map(row_from_json(json!({
            "id": 7,
            "descricao": "   ",
            "protocolo": "PROT-7",
            "data_criacao": "2024-03-01T08:30:00",
            "ativo": true
        })));
        assert_eq!(with_protocol.fiscalizado_demanda, "PROT-7");

        let without_either = mapper.map(row_from_json(json!({
            "id": 7,
            "data_criacao": "2024-03-01T08:30:00",
            "ativo": true
        })));
        assert_eq!(without_either.fiscalizado_demanda, "DEMANDA-7");
    }

    #[test]
    fn os_direta_controls_classification() {
        let mapper = DemandMapper::new(1);

        let direta = mapper.map(row_from_json(json!({
            "id": 1,
            "os_direta": true,
            "data_criacao": "2024-03-01T08:30:00",
            "ativo": true
        })));
        assert_eq!(direta.classificacao, Classificacao::Direta);

        let ordinaria = mapper.map(row_from_json(json!({
            "id": 1,
            "os_direta": false,
            "data_criacao": "2024-03-01T08:30:00",
            "ativo": true
        })));
        assert_eq!(ordinaria.classificacao, Classificacao::Ordinaria);
    }

    #[test]
    fn realization_date_prefers_inspection_then_execution() {
        let mapper = DemandMapper::new(1);
        let inspected = NaiveDate::from_ymd_opt(2024, 3, 5)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap();
        let executed = NaiveDate::from_ymd_opt(2024, 3, 3)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();

        let both = mapper.map(row_from_json(json!({
            "id": 9,
            "data_criacao": "2024-03-01T08:00:00",
            "datafiscalizacao": "2024-03-05T10:00:00",
            "dataexecucao": "2024-03-03T09:00:00",
            "ativo": true
        })));
        assert_eq!(both.data_realizacao, inspected);

        let execution_only = mapper.map(row_from_json(json!({
            "id": 9,
            "data_criacao": "2024-03-01T08:00:00",
            "dataexecucao": "2024-03-03T09:00:00",
            "ativo": true
        })));
        assert_eq!(execution_only.data_realizacao, executed);
    }

    #[test]
    fn group_default_applies_only_when_source_is_null() {
        let mapper = DemandMapper::new(99);

        let explicit = mapper.map(row_from_json(json!({
            "id": 3,
            "grupodemanda_id": 5,
            "data_criacao": "2024-03-01T08:30:00",
            "ativo": true
        })));
        assert_eq!(explicit.grupo_ocorrencia_id, 5);

        let defaulted = mapper.map(row_from_json(json!({
            "id": 3,
            "data_criacao": "2024-03-01T08:30:00",
            "ativo": true
        })));
        assert_eq!(defaulted.grupo_ocorrencia_id, 99);
    }
}
