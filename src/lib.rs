// src/lib.rs
//
// Biblioteca de multi-tenancy: cada tenant vive no seu próprio schema do
// PostgreSQL. Este crate é o responsável por derivar o nome do schema,
// provisionar/validar/migrar as tabelas dele e entregar conexões já
// "apontadas" para o schema certo.

// Declaração dos nossos módulos
pub mod common;
pub mod config;
pub mod db;
pub mod models;
pub mod schema;
pub mod services;

// Re-exporta os tipos que a camada de rotas consome
pub use common::error::AppError;
pub use config::{AppConfig, AppState};
pub use db::pool_manager::TenantConnectionHandle;
pub use models::tenancy::{SchemaName, SchemaReport, Tenant, TenantId};
pub use services::tenancy_service::TenantService;
