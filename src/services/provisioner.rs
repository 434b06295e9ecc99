// src/services/provisioner.rs

use std::collections::HashMap;
use std::sync::Arc;

use sqlx::PgPool;
use tokio::sync::Mutex;

use crate::common::db_utils::{apply_idempotent, quote_ident};
use crate::common::error::AppError;
use crate::db::catalog_repo::CatalogRepository;
use crate::db::registry_repo::RegistryRepository;
use crate::models::tenancy::{SchemaName, TenantId};
use crate::schema::tables;
use crate::services::migrator::LegacyMigrator;
use crate::services::schema_cache::SchemaCache;

// ---
// O Provisioner: o coração do crate
// ---
// Orquestra existência → criação → migração legada → tabelas/índices →
// foreign keys → registro, nessa ordem, e SÓ marca o schema como válido no
// cache depois que todos os passos obrigatórios deram certo. Qualquer erro
// fatal aborta a chamada sem cachear nada — a próxima tentativa recomeça
// do zero em vez de acreditar num schema pela metade.
//
// Concorrência: dois primeiros-acessos simultâneos do MESMO tenant são
// colapsados em um único trabalho por um mutex por-tenant (single-flight).
// Entre processos não há lock nenhum: a corrida é resolvida pelo DDL
// idempotente ("IF NOT EXISTS" + constraint duplicada tratada por código
// de erro).
pub struct SchemaProvisioner {
    admin_pool: PgPool,
    catalog: CatalogRepository,
    registry: RegistryRepository,
    migrator: LegacyMigrator,
    cache: Arc<SchemaCache>,
    inflight: Mutex<HashMap<TenantId, Arc<Mutex<()>>>>,
}

impl SchemaProvisioner {
    pub fn new(
        admin_pool: PgPool,
        catalog: CatalogRepository,
        registry: RegistryRepository,
        migrator: LegacyMigrator,
        cache: Arc<SchemaCache>,
    ) -> Self {
        Self {
            admin_pool,
            catalog,
            registry,
            migrator,
            cache,
            inflight: Mutex::new(HashMap::new()),
        }
    }

    /// Garante que o schema do tenant existe, está migrado e completo.
    pub async fn provision(&self, tenant: &TenantId) -> Result<(), AppError> {
        // Aproveita o tráfego para a manutenção do cache (auto-limitada).
        self.cache.cleanup();

        // 1. Fast path: o cache diz que está válido e fresco.
        if let Some(entry) = self.cache.get(tenant) {
            if entry.is_valid {
                return Ok(());
            }
        }

        // Single-flight: primeiros-acessos concorrentes do mesmo tenant
        // compartilham UMA tentativa em vez de duplicar DDL.
        let guard = {
            let mut inflight = self.inflight.lock().await;
            inflight
                .entry(*tenant)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        let _flight = guard.lock().await;

        // Revalida depois de adquirir o lock: quem chegou primeiro pode já
        // ter provisionado enquanto esperávamos.
        if let Some(entry) = self.cache.get(tenant) {
            if entry.is_valid {
                self.release_flight(tenant).await;
                return Ok(());
            }
        }

        let result = self.provision_inner(tenant).await;
        self.release_flight(tenant).await;
        result
    }

    async fn provision_inner(&self, tenant: &TenantId) -> Result<(), AppError> {
        let schema = SchemaName::for_tenant(tenant);

        // 2. Consulta o catálogo. Se o cache divergir da realidade (ex.:
        // schema derrubado por outro processo), o cache é corrigido.
        let exists = self.catalog.schema_exists(&schema).await?;
        if !exists {
            self.cache.invalidate(tenant);
        }

        // 3. Cria o schema se não existir. Seguro de correr: dois processos
        // podem emitir isso ao mesmo tempo.
        if !exists {
            tracing::info!("Criando schema {}", schema);
            apply_idempotent(
                &self.admin_pool,
                &format!(
                    "CREATE SCHEMA IF NOT EXISTS {}",
                    quote_ident(schema.as_str())
                ),
            )
            .await
            .map_err(|source| AppError::SchemaCreationError {
                schema: schema.to_string(),
                source,
            })?;
        }

        // 4. Migração legada: detecta e repara drift. Falha aqui NÃO
        // aborta o provisionamento — os passos seguintes são idempotentes
        // e deixam o schema utilizável; fica o log para a operação.
        match self.migrator.detect_drift(&schema).await {
            Ok(true) => {
                tracing::info!("Drift legado detectado em {}; migrando", schema);
                if let Err(e) = self.migrator.migrate(&schema, tenant).await {
                    tracing::warn!("Migração legada de {} falhou: {}", schema, e);
                }
            }
            Ok(false) => {}
            Err(e) => {
                tracing::warn!("Detecção de drift em {} falhou: {}", schema, e);
            }
        }

        // 5. Tabelas obrigatórias, com coluna de isolamento e índices
        // compostos tenant-first. Tabela é fatal; índice é best-effort.
        for stmt in tables::create_table_statements(&schema, tenant) {
            apply_idempotent(&self.admin_pool, &stmt).await.map_err(|source| {
                AppError::SchemaCreationError {
                    schema: schema.to_string(),
                    source,
                }
            })?;
        }

        for stmt in tables::create_index_statements(&schema) {
            if let Err(e) = apply_idempotent(&self.admin_pool, &stmt).await {
                tracing::warn!("Índice auxiliar falhou em {} ({}); seguindo", schema, e);
            }
        }

        // 6. Foreign keys em passada best-effort: "constraint já existe" é
        // sucesso (outro processo chegou primeiro); qualquer outro erro é
        // fatal de verdade.
        for stmt in tables::foreign_key_statements(&schema) {
            apply_idempotent(&self.admin_pool, &stmt).await.map_err(|source| {
                AppError::SchemaCreationError {
                    schema: schema.to_string(),
                    source,
                }
            })?;
        }

        // Registra no schema compartilhado (idempotente via ON CONFLICT).
        self.registry.register(tenant, &schema).await?;

        // 7. Só agora, com TODOS os passos obrigatórios concluídos, o
        // schema é marcado como válido.
        self.cache.set(tenant, true);
        tracing::info!("Schema {} provisionado e válido", schema);

        Ok(())
    }

    // Remove o mutex por-tenant quando ninguém mais espera por ele, para o
    // mapa não crescer com tenants que só passaram uma vez.
    async fn release_flight(&self, tenant: &TenantId) {
        let mut inflight = self.inflight.lock().await;
        if let Some(guard) = inflight.get(tenant) {
            // strong_count == 2: o mapa e o clone desta chamada.
            if Arc::strong_count(guard) <= 2 {
                inflight.remove(tenant);
            }
        }
    }
}
