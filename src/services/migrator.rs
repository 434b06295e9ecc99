// src/services/migrator.rs

use sqlx::PgPool;

use crate::common::db_utils::{apply_idempotent, quote_ident};
use crate::common::error::AppError;
use crate::db::catalog_repo::CatalogRepository;
use crate::models::tenancy::{SchemaName, TenantId};
use crate::schema::tables::{
    isolation_check_name, BooleanBackfill, BOOLEAN_BACKFILLS, ISOLATION_COLUMN,
    LEGACY_CORE_TABLES,
};

// ---
// O migrador legado
// ---
// Schemas provisionados antes da coluna de isolamento virar obrigatória
// têm as tabelas core SEM tenant_id. A migração é estritamente aditiva:
// adiciona a coluna com default igual à identidade do próprio tenant,
// recria a constraint de tamanho e faz o backfill das flags booleanas que
// viraram obrigatórias. Nada é reescrito nem removido.
#[derive(Clone)]
pub struct LegacyMigrator {
    admin_pool: PgPool,
    catalog: CatalogRepository,
}

impl LegacyMigrator {
    pub fn new(admin_pool: PgPool, catalog: CatalogRepository) -> Self {
        Self {
            admin_pool,
            catalog,
        }
    }

    /// Há drift legado? Ou seja: alguma tabela core existe sem a coluna de
    /// isolamento.
    pub async fn detect_drift(&self, schema: &SchemaName) -> Result<bool, AppError> {
        let existing = self.catalog.list_tables(schema).await?;

        for table in LEGACY_CORE_TABLES {
            if existing.iter().any(|t| t == table)
                && !self.catalog.has_isolation_column(schema, table).await?
            {
                return Ok(true);
            }
        }

        Ok(false)
    }

    /// Repara o schema legado. O caminho primário tira um snapshot da
    /// tabela antes de alterá-la; se o próprio snapshot falhar, o fallback
    /// aplica as mesmas mudanças aditivas direto, sem backup.
    pub async fn migrate(&self, schema: &SchemaName, tenant: &TenantId) -> Result<(), AppError> {
        let existing = self.catalog.list_tables(schema).await?;

        for table in LEGACY_CORE_TABLES {
            if !existing.iter().any(|t| t == table) {
                continue;
            }
            if self.catalog.has_isolation_column(schema, table).await? {
                continue;
            }

            match self.migrate_table_with_backup(schema, table, tenant).await {
                Ok(()) => {
                    tracing::info!(
                        "Coluna de isolamento adicionada em {}.{} (com backup)",
                        schema,
                        table
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        "Caminho com backup falhou em {}.{} ({}); tentando ALTER direto",
                        schema,
                        table,
                        e
                    );
                    self.add_isolation_column(schema, table, tenant)
                        .await
                        .map_err(|source| AppError::MigrationError {
                            schema: schema.to_string(),
                            source,
                        })?;
                }
            }
        }

        self.backfill_boolean_flags(schema, &existing).await?;

        Ok(())
    }

    // Caminho primário: snapshot e só então ALTER.
    async fn migrate_table_with_backup(
        &self,
        schema: &SchemaName,
        table: &str,
        tenant: &TenantId,
    ) -> Result<(), sqlx::Error> {
        let s = quote_ident(schema.as_str());

        // O snapshot fica DENTRO do schema do tenant, com prefixo que o
        // validador ignora (não faz parte do RequiredTableSet).
        let backup = quote_ident(&format!("_backup_{table}"));
        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {s}.{backup} AS TABLE {s}.{table}",
            table = quote_ident(table)
        ))
        .execute(&self.admin_pool)
        .await?;

        self.add_isolation_column(schema, table, tenant).await
    }

    // As mudanças aditivas em si — compartilhadas pelo caminho primário e
    // pelo fallback.
    async fn add_isolation_column(
        &self,
        schema: &SchemaName,
        table: &str,
        tenant: &TenantId,
    ) -> Result<(), sqlx::Error> {
        let s = quote_ident(schema.as_str());
        let t = quote_ident(table);

        // O default é a identidade do próprio tenant: as linhas antigas
        // ganham o dono certo no backfill implícito do ADD COLUMN.
        sqlx::query(&format!(
            "ALTER TABLE {s}.{t} ADD COLUMN IF NOT EXISTS {ISOLATION_COLUMN} \
             VARCHAR(36) NOT NULL DEFAULT '{}'",
            tenant.canonical()
        ))
        .execute(&self.admin_pool)
        .await?;

        // A constraint de tamanho, idempotente por código de erro.
        apply_idempotent(
            &self.admin_pool,
            &format!(
                "ALTER TABLE {s}.{t} ADD CONSTRAINT {} CHECK (char_length({ISOLATION_COLUMN}) = 36)",
                isolation_check_name(table)
            ),
        )
        .await?;

        Ok(())
    }

    // Flags booleanas que viraram obrigatórias depois dos schemas antigos:
    // ganham a coluna com default seguro, sem tocar nos dados existentes.
    async fn backfill_boolean_flags(
        &self,
        schema: &SchemaName,
        existing: &[String],
    ) -> Result<(), AppError> {
        let s = quote_ident(schema.as_str());

        for BooleanBackfill {
            table,
            column,
            default_value,
        } in &BOOLEAN_BACKFILLS
        {
            if !existing.iter().any(|t| t == table) {
                continue;
            }

            sqlx::query(&format!(
                "ALTER TABLE {s}.{t} ADD COLUMN IF NOT EXISTS {column} \
                 BOOLEAN NOT NULL DEFAULT {default_value}",
                t = quote_ident(table)
            ))
            .execute(&self.admin_pool)
            .await
            .map_err(|source| AppError::MigrationError {
                schema: schema.to_string(),
                source,
            })?;
        }

        Ok(())
    }
}
