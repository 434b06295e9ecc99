pub mod migrator;
pub use migrator::LegacyMigrator;
pub mod provisioner;
pub use provisioner::SchemaProvisioner;
pub mod schema_cache;
pub use schema_cache::{Clock, SchemaCache, SystemClock};
pub mod schema_validator;
pub use schema_validator::SchemaValidator;
pub mod tenancy_service;
pub use tenancy_service::TenantService;
