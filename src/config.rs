// src/config.rs

use std::{env, time::Duration};

use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;

use crate::services::tenancy_service::TenantService;

// ---
// Configuração
// ---
// Uma única connection string é a única configuração externa obrigatória.
// Tudo que é por-tenant (search_path, pool dedicada) é DERIVADO dela —
// nunca existe uma segunda connection string independente.

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    // A pool administrativa atende provisionamento e catálogo de TODOS os
    // tenants; as pools por-tenant são deliberadamente pequenas para um
    // tenant não esfomear o orçamento de conexões do cluster.
    pub admin_max_connections: u32,
    pub tenant_max_connections: u32,
    pub acquire_timeout: Duration,
    pub connection_max_lifetime: Duration,
    pub cache_ttl: Duration,
    pub cache_max_entries: usize,
    pub cache_cleanup_interval: Duration,
}

impl AppConfig {
    /// Carrega do ambiente (.env incluído), com defaults para tudo que não
    /// for a connection string.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let database_url = env::var("DATABASE_URL").expect("DATABASE_URL deve ser definida");

        Self {
            database_url,
            admin_max_connections: env_u32("ADMIN_POOL_MAX_CONNECTIONS", 25),
            tenant_max_connections: env_u32("TENANT_POOL_MAX_CONNECTIONS", 2),
            acquire_timeout: Duration::from_secs(env_u64("DB_ACQUIRE_TIMEOUT_SECS", 3)),
            connection_max_lifetime: Duration::from_secs(env_u64(
                "DB_CONNECTION_MAX_LIFETIME_SECS",
                30 * 60,
            )),
            cache_ttl: Duration::from_secs(env_u64("SCHEMA_CACHE_TTL_SECS", 120)),
            cache_max_entries: env_u32("SCHEMA_CACHE_MAX_ENTRIES", 50) as usize,
            cache_cleanup_interval: Duration::from_secs(env_u64(
                "SCHEMA_CACHE_CLEANUP_SECS",
                30,
            )),
        }
    }
}

fn env_u32(key: &str, default: u32) -> u32 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

// O estado compartilhado: o contexto explícito (pool administrativa +
// serviço de tenancy) que a camada de rotas recebe por injeção — nada de
// singleton global, para os testes poderem montar o seu próprio.
#[derive(Clone)]
pub struct AppState {
    pub admin_pool: PgPool,
    pub tenant_service: TenantService,
}

impl AppState {
    pub async fn new() -> anyhow::Result<Self> {
        Self::with_config(AppConfig::from_env()).await
    }

    pub async fn with_config(config: AppConfig) -> anyhow::Result<Self> {
        // Os parâmetros base do cluster, de onde TODA conexão deriva
        let base_options: PgConnectOptions = config.database_url.parse()?;

        // Conecta a pool administrativa, usando '?' para propagar erros
        let admin_pool = PgPoolOptions::new()
            .max_connections(config.admin_max_connections)
            .acquire_timeout(config.acquire_timeout)
            .max_lifetime(config.connection_max_lifetime)
            .connect(&config.database_url)
            .await?;

        tracing::info!("✅ Conexão com o banco de dados estabelecida com sucesso!");

        // --- Monta o gráfico de dependências ---
        let tenant_service = TenantService::new(admin_pool.clone(), base_options, &config);

        // Garante as tabelas do schema compartilhado (registro de tenants,
        // diretório de usuários, sessões) antes de atender qualquer coisa.
        crate::db::registry_repo::RegistryRepository::new(admin_pool.clone())
            .ensure_shared_tables()
            .await?;

        Ok(Self {
            admin_pool,
            tenant_service,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_the_resource_model() {
        // Sem variáveis de ambiente, os helpers devolvem os defaults
        assert_eq!(env_u32("UMA_VARIAVEL_QUE_NAO_EXISTE", 25), 25);
        assert_eq!(env_u64("OUTRA_VARIAVEL_QUE_NAO_EXISTE", 120), 120);
    }
}
