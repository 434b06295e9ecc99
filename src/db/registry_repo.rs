// src/db/registry_repo.rs

use sqlx::PgPool;

use crate::common::error::AppError;
use crate::models::tenancy::{SchemaName, Tenant, TenantId};

// O repositório do schema compartilhado (`public`): o registro de tenants,
// o diretório global de usuários e o armazenamento de sessões. São as
// ÚNICAS tabelas cross-tenant do sistema, e só a pool administrativa
// chega nelas.
#[derive(Clone)]
pub struct RegistryRepository {
    pool: PgPool,
}

impl RegistryRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Garante as tabelas compartilhadas na inicialização. Idempotente,
    /// como todo DDL deste crate.
    pub async fn ensure_shared_tables(&self) -> Result<(), AppError> {
        let statements = [
            // O registro de tenants: qual schema pertence a quem
            r#"
            CREATE TABLE IF NOT EXISTS public.tenants (
                id UUID PRIMARY KEY,
                schema_name VARCHAR(63) NOT NULL UNIQUE,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
            // O diretório global de usuários (o login é único no cluster,
            // o vínculo com tenants é resolvido pela camada de auth)
            r#"
            CREATE TABLE IF NOT EXISTS public.users (
                id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                email VARCHAR(255) NOT NULL UNIQUE,
                hashed_password VARCHAR(255) NOT NULL,
                display_name VARCHAR(255),
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
            // Sessões ativas
            r#"
            CREATE TABLE IF NOT EXISTS public.sessions (
                id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                user_id UUID NOT NULL REFERENCES public.users (id) ON DELETE CASCADE,
                tenant_id UUID,
                token VARCHAR(255) NOT NULL UNIQUE,
                expires_at TIMESTAMPTZ NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_sessions_user ON public.sessions (user_id)",
        ];

        for sql in statements {
            sqlx::query(sql).execute(&self.pool).await?;
        }

        Ok(())
    }

    /// Registra um tenant recém-provisionado. Seguro de repetir: a corrida
    /// entre dois provisionamentos do mesmo tenant cai no ON CONFLICT.
    pub async fn register(
        &self,
        tenant: &TenantId,
        schema: &SchemaName,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO public.tenants (id, schema_name)
            VALUES ($1, $2)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(tenant.as_uuid())
        .bind(schema.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Remove o registro quando o schema é derrubado.
    pub async fn unregister(&self, tenant: &TenantId) -> Result<(), AppError> {
        sqlx::query("DELETE FROM public.tenants WHERE id = $1")
            .bind(tenant.as_uuid())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Busca a linha de registro de um tenant.
    pub async fn find(&self, tenant: &TenantId) -> Result<Option<Tenant>, AppError> {
        let row = sqlx::query_as::<_, Tenant>(
            "SELECT id, schema_name, created_at, updated_at FROM public.tenants WHERE id = $1",
        )
        .bind(tenant.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    /// Lista todos os tenants registrados.
    pub async fn list(&self) -> Result<Vec<Tenant>, AppError> {
        let rows = sqlx::query_as::<_, Tenant>(
            "SELECT id, schema_name, created_at, updated_at FROM public.tenants ORDER BY created_at",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}
