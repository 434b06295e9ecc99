// src/models/tenancy.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::{Uuid, Variant, Version};

use crate::common::error::AppError;

// ---
// 1. TenantId (A identidade do tenant)
// ---
// Um UUID v4 validado. Este é o ÚNICO caminho de entrada para o resto do
// crate: nenhum nome de schema é derivado sem passar por `parse`, porque o
// nome derivado acaba emendado em texto de DDL (identificadores não podem
// ser bind parameters em SQL padrão).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantId(Uuid);

impl TenantId {
    /// Valida e constrói a identidade. Síncrono, sem nenhum I/O.
    ///
    /// Aceita somente o formato canônico com hífens (36 caracteres), com o
    /// nibble de versão `4` e a variante RFC 4122. Qualquer outra coisa é
    /// rejeitada aqui, antes de chegar perto do banco.
    pub fn parse(raw: &str) -> Result<Self, AppError> {
        if !has_canonical_uuid_shape(raw) {
            return Err(AppError::InvalidIdentity(raw.to_string()));
        }

        let uuid =
            Uuid::parse_str(raw).map_err(|_| AppError::InvalidIdentity(raw.to_string()))?;

        if uuid.get_version() != Some(Version::Random) {
            return Err(AppError::InvalidIdentity(raw.to_string()));
        }
        if uuid.get_variant() != Variant::RFC4122 {
            return Err(AppError::InvalidIdentity(raw.to_string()));
        }

        Ok(Self(uuid))
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }

    /// Forma canônica (minúscula, com hífens, 36 caracteres) — é este o
    /// valor gravado na coluna de isolamento `tenant_id`.
    pub fn canonical(&self) -> String {
        self.0.to_string()
    }
}

impl std::fmt::Display for TenantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

// Checagem estrutural estrita: comprimento exato, hífens nas posições
// certas e hexadecimal em todas as outras. O `Uuid::parse_str` sozinho
// aceitaria formatos alternativos (com chaves, sem hífens), que NÃO
// queremos como identidade externa.
fn has_canonical_uuid_shape(raw: &str) -> bool {
    if raw.len() != 36 {
        return false;
    }
    raw.bytes().enumerate().all(|(i, b)| match i {
        8 | 13 | 18 | 23 => b == b'-',
        _ => b.is_ascii_hexdigit(),
    })
}

// ---
// 2. SchemaName (O nome do namespace)
// ---
// Função pura e determinística da identidade: "tenant_" + uuid com os
// hífens trocados por underscores. Nunca é consultado nem armazenado em
// separado — sempre derivado.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SchemaName(String);

impl SchemaName {
    pub fn for_tenant(tenant: &TenantId) -> Self {
        Self(format!("tenant_{}", tenant.canonical().replace('-', "_")))
    }

    /// Reconstrói a partir do catálogo (usado só pelo `list`). Aceita
    /// apenas nomes que este crate teria gerado.
    pub fn from_catalog(name: &str) -> Option<Self> {
        let rest = name.strip_prefix("tenant_")?;
        let candidate = rest.replace('_', "-");
        TenantId::parse(&candidate).ok()?;
        Some(Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SchemaName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ---
// 3. Tenant (A linha do registro compartilhado)
// ---
// Registro cross-tenant que vive no schema compartilhado (`public`),
// mantido pelo provisionamento. O nome do schema gravado aqui é redundante
// por construção (sempre derivável do id) e serve para inspeção manual.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Tenant {
    pub id: Uuid,
    pub schema_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---
// 4. SchemaReport (O laudo do health-check)
// ---
// Resultado da validação out-of-band: o que falta para o schema ser
// considerado íntegro. "Não existe" é resposta válida, não erro.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaReport {
    pub schema_name: String,
    pub schema_exists: bool,
    pub missing_tables: Vec<String>,
    pub tables_missing_isolation: Vec<String>,
}

impl SchemaReport {
    pub fn is_valid(&self) -> bool {
        self.schema_exists
            && self.missing_tables.is_empty()
            && self.tables_missing_isolation.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = "3f99462f-3621-4b1b-bea8-782acc50d62e";

    #[test]
    fn schema_name_is_deterministic() {
        let tenant = TenantId::parse(VALID).unwrap();
        let a = SchemaName::for_tenant(&tenant);
        let b = SchemaName::for_tenant(&tenant);
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "tenant_3f99462f_3621_4b1b_bea8_782acc50d62e");
    }

    #[test]
    fn uppercase_input_normalizes_to_one_schema() {
        let lower = TenantId::parse(VALID).unwrap();
        let upper = TenantId::parse(&VALID.to_uppercase()).unwrap();
        assert_eq!(
            SchemaName::for_tenant(&lower),
            SchemaName::for_tenant(&upper)
        );
    }

    #[test]
    fn rejects_wrong_length() {
        assert!(TenantId::parse("").is_err());
        assert!(TenantId::parse("3f99462f-3621-4b1b-bea8-782acc50d62").is_err());
        assert!(TenantId::parse("3f99462f-3621-4b1b-bea8-782acc50d62ef").is_err());
    }

    #[test]
    fn rejects_wrong_version_nibble() {
        // Versão 1 no lugar da 4
        assert!(TenantId::parse("3f99462f-3621-1b1b-bea8-782acc50d62e").is_err());
    }

    #[test]
    fn rejects_wrong_variant_nibble() {
        // 'c' não é uma variante RFC 4122
        assert!(TenantId::parse("3f99462f-3621-4b1b-cea8-782acc50d62e").is_err());
    }

    #[test]
    fn rejects_non_hex_characters() {
        assert!(TenantId::parse("3f99462g-3621-4b1b-bea8-782acc50d62e").is_err());
    }

    #[test]
    fn rejects_alternate_uuid_formats() {
        // Sem hífens e com chaves: formatos que o parser do uuid aceitaria
        assert!(TenantId::parse("3f99462f36214b1bbea8782acc50d62e").is_err());
        assert!(TenantId::parse("{3f99462f-3621-4b1b-bea8-782acc50d62e}").is_err());
    }

    #[test]
    fn rejects_injection_attempts() {
        assert!(TenantId::parse("tenant_x; DROP SCHEMA public CASCADE").is_err());
        assert!(TenantId::parse("3f99462f-3621-4b1b-bea8-782acc50d62e;").is_err());
        assert!(TenantId::parse("\"; DROP TABLE tickets; --").is_err());
    }

    #[test]
    fn from_catalog_roundtrips_generated_names() {
        let tenant = TenantId::parse(VALID).unwrap();
        let schema = SchemaName::for_tenant(&tenant);
        assert_eq!(SchemaName::from_catalog(schema.as_str()), Some(schema));
    }

    #[test]
    fn from_catalog_rejects_foreign_names() {
        assert!(SchemaName::from_catalog("public").is_none());
        assert!(SchemaName::from_catalog("tenant_nao_e_uuid").is_none());
        // Prefixo certo mas nibble de versão errado
        assert!(
            SchemaName::from_catalog("tenant_3f99462f_3621_1b1b_bea8_782acc50d62e").is_none()
        );
    }
}
