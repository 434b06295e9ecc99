// src/services/schema_validator.rs

use crate::common::error::AppError;
use crate::db::catalog_repo::CatalogRepository;
use crate::models::tenancy::{SchemaName, SchemaReport, TenantId};
use crate::schema::tables::REQUIRED_TABLES;

// ---
// O health-check de schemas
// ---
// Validação out-of-band, pensada para chamadas operacionais (endpoint de
// health, scripts de auditoria), não para o hot path de requisições.
// "Schema não existe" e "tabela faltando" são respostas válidas (false),
// nunca erro — erro aqui é só infraestrutura de verdade.
#[derive(Clone)]
pub struct SchemaValidator {
    catalog: CatalogRepository,
}

impl SchemaValidator {
    pub fn new(catalog: CatalogRepository) -> Self {
        Self { catalog }
    }

    /// O laudo completo: o que existe, o que falta, o que está sem a
    /// coluna de isolamento.
    pub async fn report(&self, tenant: &TenantId) -> Result<SchemaReport, AppError> {
        let schema = SchemaName::for_tenant(tenant);

        if !self.catalog.schema_exists(&schema).await? {
            return Ok(SchemaReport {
                schema_name: schema.to_string(),
                schema_exists: false,
                missing_tables: REQUIRED_TABLES.iter().map(|t| t.to_string()).collect(),
                tables_missing_isolation: Vec::new(),
            });
        }

        let existing = self.catalog.list_tables(&schema).await?;

        let missing_tables: Vec<String> = REQUIRED_TABLES
            .iter()
            .filter(|required| !existing.iter().any(|t| t == *required))
            .map(|t| t.to_string())
            .collect();

        // Das obrigatórias que existem, quais carregam tenant_id —
        // resolvido numa consulta só.
        let present: Vec<String> = REQUIRED_TABLES
            .iter()
            .filter(|required| existing.iter().any(|t| t == *required))
            .map(|t| t.to_string())
            .collect();

        let with_isolation = self
            .catalog
            .tables_with_isolation_column(&schema, &present)
            .await?;

        let tables_missing_isolation: Vec<String> = present
            .into_iter()
            .filter(|t| !with_isolation.contains(t))
            .collect();

        Ok(SchemaReport {
            schema_name: schema.to_string(),
            schema_exists: true,
            missing_tables,
            tables_missing_isolation,
        })
    }

    /// A resposta binária que o health-check consome.
    pub async fn is_valid(&self, tenant: &TenantId) -> Result<bool, AppError> {
        Ok(self.report(tenant).await?.is_valid())
    }
}
