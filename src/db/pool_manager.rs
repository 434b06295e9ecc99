// src/db/pool_manager.rs

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;

use crate::models::tenancy::{SchemaName, TenantId};
use crate::schema::tables::REQUIRED_TABLES;

// ---
// A pool dedicada de cada tenant
// ---
// Cada tenant ganha uma pool pequena e exclusiva, com o schema dele
// injetado como search_path da conexão. É ESTE o ponto que garante o
// isolamento: toda query de dados de tenant passa por uma conexão que só
// resolve nomes dentro do schema certo, sem precisar qualificar tabela
// por tabela.

/// O handle que a camada de rotas recebe: a pool do tenant mais o catálogo
/// de tabelas que ela enxerga.
#[derive(Clone)]
pub struct TenantConnectionHandle {
    pub pool: PgPool,
    pub tables: &'static [&'static str],
}

#[derive(Clone)]
pub struct TenantPoolManager {
    // Os parâmetros base do cluster. A conexão de cada tenant é derivada
    // DAQUI, trocando só o search_path — nunca montando uma segunda
    // connection string independente.
    base_options: PgConnectOptions,
    max_connections: u32,
    acquire_timeout: Duration,
    max_lifetime: Duration,
    handles: Arc<Mutex<HashMap<TenantId, TenantConnectionHandle>>>,
}

impl TenantPoolManager {
    pub fn new(
        base_options: PgConnectOptions,
        max_connections: u32,
        acquire_timeout: Duration,
        max_lifetime: Duration,
    ) -> Self {
        Self {
            base_options,
            max_connections,
            acquire_timeout,
            max_lifetime,
            handles: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Devolve o handle do tenant, criando a pool no primeiro acesso.
    ///
    /// A pool é "lazy": nenhuma conexão abre até a primeira query, então
    /// criar o handle é barato e síncrono. O handle vive até `evict` (drop
    /// do schema) ou `shutdown` — não há reaproveitamento por ociosidade.
    pub fn acquire(&self, tenant: &TenantId) -> TenantConnectionHandle {
        let mut handles = self.handles.lock().expect("lock da tabela de pools envenenado");

        if let Some(handle) = handles.get(tenant) {
            return handle.clone();
        }

        let schema = SchemaName::for_tenant(tenant);
        // search_path só com o schema do tenant: nada de fallback para
        // public nas conexões de dados.
        let options = self
            .base_options
            .clone()
            .options([("search_path", schema.as_str())]);

        let pool = PgPoolOptions::new()
            .max_connections(self.max_connections)
            .acquire_timeout(self.acquire_timeout)
            .max_lifetime(self.max_lifetime)
            .connect_lazy_with(options);

        tracing::info!("Pool dedicada criada para o schema {}", schema);

        let handle = TenantConnectionHandle {
            pool,
            tables: &REQUIRED_TABLES,
        };
        handles.insert(*tenant, handle.clone());
        handle
    }

    /// Fecha e descarta a pool de um tenant (usado no drop do schema).
    pub async fn evict(&self, tenant: &TenantId) {
        let removed = {
            let mut handles = self.handles.lock().expect("lock da tabela de pools envenenado");
            handles.remove(tenant)
        };

        if let Some(handle) = removed {
            handle.pool.close().await;
            tracing::info!("Pool do tenant {} fechada e descartada", tenant);
        }
    }

    /// Fecha todas as pools (shutdown do processo).
    pub async fn shutdown(&self) {
        let all: Vec<TenantConnectionHandle> = {
            let mut handles = self.handles.lock().expect("lock da tabela de pools envenenado");
            handles.drain().map(|(_, h)| h).collect()
        };

        for handle in all {
            handle.pool.close().await;
        }
    }

    /// Quantos tenants têm pool viva neste processo.
    pub fn active_count(&self) -> usize {
        self.handles.lock().expect("lock da tabela de pools envenenado").len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> TenantPoolManager {
        let base = PgConnectOptions::new()
            .host("localhost")
            .username("postgres")
            .database("helpdesk");
        TenantPoolManager::new(
            base,
            2,
            Duration::from_secs(3),
            Duration::from_secs(30 * 60),
        )
    }

    fn tenant() -> TenantId {
        TenantId::parse("3f99462f-3621-4b1b-bea8-782acc50d62e").unwrap()
    }

    #[tokio::test]
    async fn acquire_reuses_the_same_handle() {
        let mgr = manager();
        let t = tenant();

        // Pools lazy não conectam em nada até a primeira query, então isso
        // roda sem um PostgreSQL de verdade.
        let a = mgr.acquire(&t);
        let _b = mgr.acquire(&t);
        assert_eq!(mgr.active_count(), 1);
        assert_eq!(a.tables.len(), 14);
    }

    #[tokio::test]
    async fn evict_removes_the_handle() {
        let mgr = manager();
        let t = tenant();

        mgr.acquire(&t);
        assert_eq!(mgr.active_count(), 1);

        mgr.evict(&t).await;
        assert_eq!(mgr.active_count(), 0);
    }

    #[tokio::test]
    async fn distinct_tenants_get_distinct_pools() {
        let mgr = manager();
        let a = tenant();
        let b = TenantId::parse("9b2d6a1e-08c4-4f4a-9d35-5b0c6de01a77").unwrap();

        mgr.acquire(&a);
        mgr.acquire(&b);
        assert_eq!(mgr.active_count(), 2);

        mgr.shutdown().await;
        assert_eq!(mgr.active_count(), 0);
    }
}
