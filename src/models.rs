pub mod tenancy;
pub use tenancy::{SchemaName, SchemaReport, Tenant, TenantId};
