// src/db/catalog_repo.rs

use sqlx::PgPool;

use crate::common::error::AppError;
use crate::models::tenancy::SchemaName;
use crate::schema::tables::ISOLATION_COLUMN;

// O repositório de metadados do catálogo, responsável por todas as
// consultas cross-tenant ao information_schema / pg_catalog. SEMPRE opera
// na pool administrativa — é a única parte do crate autorizada a enxergar
// além de um schema.
//
// Aqui os nomes de schema PODEM ser bind parameters, porque são consultas
// normais (DML), não DDL.
#[derive(Clone)]
pub struct CatalogRepository {
    pool: PgPool,
}

impl CatalogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Verifica se o schema existe no cluster.
    pub async fn schema_exists(&self, schema: &SchemaName) -> Result<bool, AppError> {
        // SELECT EXISTS é a consulta mais barata possível para isso.
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM information_schema.schemata
                WHERE schema_name = $1
            )
            "#,
        )
        .bind(schema.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    /// Lista as tabelas existentes dentro de um schema.
    pub async fn list_tables(&self, schema: &SchemaName) -> Result<Vec<String>, AppError> {
        let tables: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT table_name FROM information_schema.tables
            WHERE table_schema = $1 AND table_type = 'BASE TABLE'
            "#,
        )
        .bind(schema.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(tables)
    }

    /// Verifica se uma tabela específica tem a coluna de isolamento.
    pub async fn has_isolation_column(
        &self,
        schema: &SchemaName,
        table: &str,
    ) -> Result<bool, AppError> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM information_schema.columns
                WHERE table_schema = $1 AND table_name = $2 AND column_name = $3
            )
            "#,
        )
        .bind(schema.as_str())
        .bind(table)
        .bind(ISOLATION_COLUMN)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    /// Dentre as tabelas informadas, quais têm a coluna de isolamento.
    /// Uma consulta só, para o health-check não disparar N round trips.
    pub async fn tables_with_isolation_column(
        &self,
        schema: &SchemaName,
        tables: &[String],
    ) -> Result<Vec<String>, AppError> {
        let found: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT table_name FROM information_schema.columns
            WHERE table_schema = $1 AND column_name = $2 AND table_name = ANY($3)
            "#,
        )
        .bind(schema.as_str())
        .bind(ISOLATION_COLUMN)
        .bind(tables)
        .fetch_all(&self.pool)
        .await?;

        Ok(found)
    }

    /// Lista todos os schemas de tenant do cluster, filtrando qualquer nome
    /// que este crate não teria gerado.
    pub async fn list_tenant_schemas(&self) -> Result<Vec<SchemaName>, AppError> {
        let names: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT nspname FROM pg_catalog.pg_namespace
            WHERE nspname LIKE 'tenant\_%'
            ORDER BY nspname
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(names
            .iter()
            .filter_map(|n| SchemaName::from_catalog(n))
            .collect())
    }
}
