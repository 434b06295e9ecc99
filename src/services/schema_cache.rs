// src/services/schema_cache.rs

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::models::tenancy::TenantId;

// ---
// O cache de validação de schemas
// ---
// Sem ele, TODA operação de tenant iria reconsultar o catálogo (existência
// do schema + enumeração de tabelas), o que é caro e anula o ganho das
// pools. O TTL troca uma janela pequena de staleness por um corte drástico
// no volume de consultas de catálogo; o limite de tamanho segura a memória
// quando há churn de tenants.

/// Relógio injetável: em produção é o relógio do sistema, nos testes é um
/// relógio manual determinístico.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Uma observação: "este schema estava (in)válido no instante T".
#[derive(Debug, Clone, Copy)]
pub struct CacheEntry {
    pub is_valid: bool,
    pub observed_at: Instant,
}

struct CacheInner {
    entries: HashMap<TenantId, CacheEntry>,
    last_cleanup: Instant,
}

pub struct SchemaCache {
    inner: Mutex<CacheInner>,
    ttl: Duration,
    max_entries: usize,
    cleanup_interval: Duration,
    clock: Arc<dyn Clock>,
}

impl SchemaCache {
    pub fn new(
        ttl: Duration,
        max_entries: usize,
        cleanup_interval: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let now = clock.now();
        Self {
            inner: Mutex::new(CacheInner {
                entries: HashMap::new(),
                last_cleanup: now,
            }),
            ttl,
            max_entries,
            cleanup_interval,
            clock,
        }
    }

    /// Existe uma observação fresca para este tenant?
    pub fn has(&self, tenant: &TenantId) -> bool {
        self.get(tenant).is_some()
    }

    /// Devolve a observação se ainda estiver dentro do TTL. Entradas
    /// vencidas são removidas na hora, como se nunca existissem.
    pub fn get(&self, tenant: &TenantId) -> Option<CacheEntry> {
        let now = self.clock.now();
        let mut inner = self.inner.lock().expect("lock do cache envenenado");

        match inner.entries.get(tenant) {
            Some(entry) if now.duration_since(entry.observed_at) < self.ttl => Some(*entry),
            Some(_) => {
                inner.entries.remove(tenant);
                None
            }
            None => None,
        }
    }

    /// Grava uma observação. Se o cache estiver cheio, a observação mais
    /// antiga sai primeiro.
    pub fn set(&self, tenant: &TenantId, is_valid: bool) {
        let now = self.clock.now();
        let mut inner = self.inner.lock().expect("lock do cache envenenado");

        if !inner.entries.contains_key(tenant) && inner.entries.len() >= self.max_entries {
            // Eviction oldest-first
            if let Some(oldest) = inner
                .entries
                .iter()
                .min_by_key(|(_, e)| e.observed_at)
                .map(|(t, _)| *t)
            {
                inner.entries.remove(&oldest);
            }
        }

        inner.entries.insert(
            *tenant,
            CacheEntry {
                is_valid,
                observed_at: now,
            },
        );
    }

    /// Esquece um tenant (drop de schema, ou correção de divergência entre
    /// cache e catálogo).
    pub fn invalidate(&self, tenant: &TenantId) {
        let mut inner = self.inner.lock().expect("lock do cache envenenado");
        inner.entries.remove(tenant);
    }

    /// Varredura de manutenção: expira por TTL e reforça o teto de
    /// entradas. Auto-limitada — mesmo chamada a cada requisição, só roda
    /// de fato a cada `cleanup_interval`, para o custo de CPU não crescer
    /// com o tráfego.
    pub fn cleanup(&self) {
        let now = self.clock.now();
        let mut inner = self.inner.lock().expect("lock do cache envenenado");

        if now.duration_since(inner.last_cleanup) < self.cleanup_interval {
            return;
        }
        inner.last_cleanup = now;

        let ttl = self.ttl;
        inner
            .entries
            .retain(|_, e| now.duration_since(e.observed_at) < ttl);

        while inner.entries.len() > self.max_entries {
            if let Some(oldest) = inner
                .entries
                .iter()
                .min_by_key(|(_, e)| e.observed_at)
                .map(|(t, _)| *t)
            {
                inner.entries.remove(&oldest);
            } else {
                break;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("lock do cache envenenado").entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
