// src/services/tenancy_service.rs

use std::sync::Arc;

use sqlx::postgres::PgConnectOptions;
use sqlx::PgPool;

use crate::common::db_utils::quote_ident;
use crate::common::error::AppError;
use crate::config::AppConfig;
use crate::db::catalog_repo::CatalogRepository;
use crate::db::pool_manager::{TenantConnectionHandle, TenantPoolManager};
use crate::db::registry_repo::RegistryRepository;
use crate::models::tenancy::{SchemaName, SchemaReport, Tenant, TenantId};
use crate::services::migrator::LegacyMigrator;
use crate::services::provisioner::SchemaProvisioner;
use crate::services::schema_cache::{Clock, SchemaCache, SystemClock};
use crate::services::schema_validator::SchemaValidator;

// A fachada que a camada de rotas consome: provisiona, valida, derruba e
// entrega conexões escopadas por tenant. Clonável e barata de clonar — os
// pedaços com estado vivem atrás de Arc.
#[derive(Clone)]
pub struct TenantService {
    admin_pool: PgPool,
    catalog: CatalogRepository,
    registry: RegistryRepository,
    validator: SchemaValidator,
    provisioner: Arc<SchemaProvisioner>,
    pools: TenantPoolManager,
    cache: Arc<SchemaCache>,
}

impl TenantService {
    /// Cria uma nova instância do serviço de tenancy, com o relógio do
    /// sistema.
    pub fn new(admin_pool: PgPool, base_options: PgConnectOptions, config: &AppConfig) -> Self {
        Self::with_clock(admin_pool, base_options, config, Arc::new(SystemClock))
    }

    /// Variante com relógio injetado, para testes determinísticos do TTL.
    pub fn with_clock(
        admin_pool: PgPool,
        base_options: PgConnectOptions,
        config: &AppConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let catalog = CatalogRepository::new(admin_pool.clone());
        let registry = RegistryRepository::new(admin_pool.clone());
        let migrator = LegacyMigrator::new(admin_pool.clone(), catalog.clone());
        let validator = SchemaValidator::new(catalog.clone());
        let cache = Arc::new(SchemaCache::new(
            config.cache_ttl,
            config.cache_max_entries,
            config.cache_cleanup_interval,
            clock,
        ));
        let provisioner = Arc::new(SchemaProvisioner::new(
            admin_pool.clone(),
            catalog.clone(),
            registry.clone(),
            migrator,
            cache.clone(),
        ));
        let pools = TenantPoolManager::new(
            base_options,
            config.tenant_max_connections,
            config.acquire_timeout,
            config.connection_max_lifetime,
        );

        Self {
            admin_pool,
            catalog,
            registry,
            validator,
            provisioner,
            pools,
            cache,
        }
    }

    /// Garante o schema do tenant: existência, migração legada, tabelas,
    /// índices, foreign keys e registro.
    pub async fn provision_tenant_schema(&self, tenant: &TenantId) -> Result<(), AppError> {
        self.provisioner.provision(tenant).await
    }

    /// Entrega a pool escopada do tenant, provisionando no primeiro
    /// acesso. É o caminho que os handlers usam em toda requisição.
    pub async fn acquire_tenant_connection(
        &self,
        tenant: &TenantId,
    ) -> Result<TenantConnectionHandle, AppError> {
        self.provisioner.provision(tenant).await?;
        Ok(self.pools.acquire(tenant))
    }

    /// Health-check out-of-band: o schema está íntegro?
    pub async fn is_schema_valid(&self, tenant: &TenantId) -> Result<bool, AppError> {
        self.validator.is_valid(tenant).await
    }

    /// O laudo detalhado do health-check.
    pub async fn schema_report(&self, tenant: &TenantId) -> Result<SchemaReport, AppError> {
        self.validator.report(tenant).await
    }

    /// Derruba o schema do tenant e tudo que há nele, fecha a pool
    /// dedicada e esquece o cache. Irreversível.
    pub async fn drop_tenant_schema(&self, tenant: &TenantId) -> Result<(), AppError> {
        let schema = SchemaName::for_tenant(tenant);

        // Primeiro a pool (ninguém mais consegue usar conexões do schema),
        // depois o schema em si, por último registro e cache.
        self.pools.evict(tenant).await;

        sqlx::query(&format!(
            "DROP SCHEMA IF EXISTS {} CASCADE",
            quote_ident(schema.as_str())
        ))
        .execute(&self.admin_pool)
        .await?;

        self.registry.unregister(tenant).await?;
        self.cache.invalidate(tenant);

        tracing::info!("Schema {} derrubado", schema);
        Ok(())
    }

    /// Lista os schemas de tenant existentes no cluster.
    pub async fn list_tenant_schemas(&self) -> Result<Vec<SchemaName>, AppError> {
        self.catalog.list_tenant_schemas().await
    }

    /// Lista as linhas do registro compartilhado.
    pub async fn list_registered_tenants(&self) -> Result<Vec<Tenant>, AppError> {
        self.registry.list().await
    }

    /// Fecha todas as pools de tenant (shutdown gracioso do processo).
    pub async fn shutdown(&self) {
        self.pools.shutdown().await;
    }
}
