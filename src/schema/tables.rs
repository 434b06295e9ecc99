// src/schema/tables.rs
//
// O catálogo de DDL do schema de cada tenant: as tabelas obrigatórias, os
// índices compostos tenant-first e as foreign keys. Tudo aqui é gerado como
// statement idempotente ("IF NOT EXISTS" ou aplicado via helper que engole
// "já existe"), porque dois processos podem provisionar o mesmo tenant ao
// mesmo tempo sem nenhum lock distribuído.

use crate::common::db_utils::quote_ident;
use crate::models::tenancy::{SchemaName, TenantId};

/// A coluna de isolamento obrigatória em TODAS as tabelas de tenant.
/// Defesa em profundidade: mesmo com um schema por tenant, cada linha
/// carrega (e valida) a identidade do dono.
pub const ISOLATION_COLUMN: &str = "tenant_id";

/// As tabelas que todo schema de tenant precisa ter. A ordem importa para a
/// criação (referenciadas antes de quem referencia), não para a validação.
pub const REQUIRED_TABLES: [&str; 14] = [
    "customers",
    "customer_contacts",
    "ticket_statuses",
    "ticket_priorities",
    "channels",
    "channel_accounts",
    "tickets",
    "ticket_messages",
    "attachments",
    "notes",
    "tags",
    "ticket_tags",
    "invitations",
    "gdpr_requests",
];

/// Subconjunto "core" usado na detecção de drift legado: schemas criados
/// antes da coluna de isolamento ser obrigatória tinham só estas tabelas.
pub const LEGACY_CORE_TABLES: [&str; 3] = ["customers", "tickets", "ticket_messages"];

/// Flags booleanas que passaram a ser obrigatórias depois que schemas
/// antigos já existiam. O migrador legado faz o backfill delas com um
/// default seguro.
pub struct BooleanBackfill {
    pub table: &'static str,
    pub column: &'static str,
    pub default_value: &'static str,
}

pub const BOOLEAN_BACKFILLS: [BooleanBackfill; 3] = [
    BooleanBackfill {
        table: "tickets",
        column: "is_archived",
        default_value: "FALSE",
    },
    BooleanBackfill {
        table: "customers",
        column: "gdpr_consent",
        default_value: "FALSE",
    },
    BooleanBackfill {
        table: "channels",
        column: "is_active",
        default_value: "TRUE",
    },
];

/// Nome da constraint de tamanho da coluna de isolamento. É nomeada (em vez
/// de inline anônima) para que o migrador consiga recriá-la de forma
/// idempotente em schemas legados.
pub fn isolation_check_name(table: &str) -> String {
    format!("chk_{table}_tenant_id")
}

// A definição da coluna de isolamento: o default é a identidade do próprio
// tenant, então inserts que não informam tenant_id continuam corretos.
fn isolation_column_def(tenant: &TenantId) -> String {
    format!(
        "{ISOLATION_COLUMN} VARCHAR(36) NOT NULL DEFAULT '{}'",
        tenant.canonical()
    )
}

fn isolation_check_def(table: &str) -> String {
    format!(
        "CONSTRAINT {} CHECK (char_length({ISOLATION_COLUMN}) = 36)",
        isolation_check_name(table)
    )
}

/// Os CREATE TABLE IF NOT EXISTS de todas as tabelas obrigatórias, já com o
/// schema citado e a coluna de isolamento embutida.
pub fn create_table_statements(schema: &SchemaName, tenant: &TenantId) -> Vec<String> {
    let s = quote_ident(schema.as_str());
    let iso = |table: &str| format!("{},\n    {}", isolation_column_def(tenant), isolation_check_def(table));

    vec![
        // --- Clientes ---
        format!(
            r#"CREATE TABLE IF NOT EXISTS {s}.customers (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    {iso},
    name VARCHAR(255) NOT NULL,
    email VARCHAR(255) NOT NULL,
    phone VARCHAR(32),
    gdpr_consent BOOLEAN NOT NULL DEFAULT FALSE,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
)"#,
            iso = iso("customers")
        ),
        // Contatos extras de um cliente (e-mails e telefones adicionais)
        format!(
            r#"CREATE TABLE IF NOT EXISTS {s}.customer_contacts (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    {iso},
    customer_id UUID NOT NULL,
    kind VARCHAR(16) NOT NULL,
    value VARCHAR(255) NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
)"#,
            iso = iso("customer_contacts")
        ),
        // --- Lookups de tickets ---
        format!(
            r#"CREATE TABLE IF NOT EXISTS {s}.ticket_statuses (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    {iso},
    name VARCHAR(64) NOT NULL,
    color VARCHAR(7),
    is_closed BOOLEAN NOT NULL DEFAULT FALSE,
    position INTEGER NOT NULL DEFAULT 0
)"#,
            iso = iso("ticket_statuses")
        ),
        format!(
            r#"CREATE TABLE IF NOT EXISTS {s}.ticket_priorities (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    {iso},
    name VARCHAR(64) NOT NULL,
    level INTEGER NOT NULL DEFAULT 0
)"#,
            iso = iso("ticket_priorities")
        ),
        // --- Canais de atendimento (e-mail, WhatsApp, Telegram...) ---
        format!(
            r#"CREATE TABLE IF NOT EXISTS {s}.channels (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    {iso},
    kind VARCHAR(32) NOT NULL,
    display_name VARCHAR(128) NOT NULL,
    is_active BOOLEAN NOT NULL DEFAULT TRUE,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
)"#,
            iso = iso("channels")
        ),
        format!(
            r#"CREATE TABLE IF NOT EXISTS {s}.channel_accounts (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    {iso},
    channel_id UUID NOT NULL,
    external_id VARCHAR(255) NOT NULL,
    webhook_token VARCHAR(128),
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
)"#,
            iso = iso("channel_accounts")
        ),
        // --- Tickets ---
        format!(
            r#"CREATE TABLE IF NOT EXISTS {s}.tickets (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    {iso},
    customer_id UUID NOT NULL,
    channel_id UUID,
    status_id UUID,
    priority_id UUID,
    subject VARCHAR(512) NOT NULL,
    is_archived BOOLEAN NOT NULL DEFAULT FALSE,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
)"#,
            iso = iso("tickets")
        ),
        format!(
            r#"CREATE TABLE IF NOT EXISTS {s}.ticket_messages (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    {iso},
    ticket_id UUID NOT NULL,
    direction VARCHAR(8) NOT NULL DEFAULT 'in',
    body TEXT NOT NULL,
    author_name VARCHAR(255),
    sent_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
)"#,
            iso = iso("ticket_messages")
        ),
        format!(
            r#"CREATE TABLE IF NOT EXISTS {s}.attachments (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    {iso},
    message_id UUID NOT NULL,
    file_name VARCHAR(255) NOT NULL,
    content_type VARCHAR(128),
    byte_size BIGINT NOT NULL DEFAULT 0,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
)"#,
            iso = iso("attachments")
        ),
        // Notas internas dos atendentes (invisíveis para o cliente)
        format!(
            r#"CREATE TABLE IF NOT EXISTS {s}.notes (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    {iso},
    ticket_id UUID NOT NULL,
    body TEXT NOT NULL,
    author_name VARCHAR(255),
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
)"#,
            iso = iso("notes")
        ),
        // --- Tags ---
        format!(
            r#"CREATE TABLE IF NOT EXISTS {s}.tags (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    {iso},
    name VARCHAR(64) NOT NULL,
    color VARCHAR(7),
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
)"#,
            iso = iso("tags")
        ),
        // Tabela-ponte ticket <-> tag
        format!(
            r#"CREATE TABLE IF NOT EXISTS {s}.ticket_tags (
    {iso},
    ticket_id UUID NOT NULL,
    tag_id UUID NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    PRIMARY KEY (ticket_id, tag_id)
)"#,
            iso = iso("ticket_tags")
        ),
        // --- Convites de usuários ---
        format!(
            r#"CREATE TABLE IF NOT EXISTS {s}.invitations (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    {iso},
    email VARCHAR(255) NOT NULL,
    role VARCHAR(32) NOT NULL DEFAULT 'agent',
    token VARCHAR(128) NOT NULL,
    accepted BOOLEAN NOT NULL DEFAULT FALSE,
    expires_at TIMESTAMPTZ,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
)"#,
            iso = iso("invitations")
        ),
        // --- Pedidos GDPR (exportação / esquecimento) ---
        format!(
            r#"CREATE TABLE IF NOT EXISTS {s}.gdpr_requests (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    {iso},
    customer_id UUID NOT NULL,
    kind VARCHAR(16) NOT NULL,
    status VARCHAR(16) NOT NULL DEFAULT 'pending',
    processed_at TIMESTAMPTZ,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
)"#,
            iso = iso("gdpr_requests")
        ),
    ]
}

/// Índices compostos tenant-first: todo caminho quente filtra primeiro por
/// tenant, então o planner sempre tem um índice que começa em tenant_id.
pub fn create_index_statements(schema: &SchemaName) -> Vec<String> {
    let s = quote_ident(schema.as_str());
    vec![
        format!("CREATE UNIQUE INDEX IF NOT EXISTS idx_customers_tenant_email ON {s}.customers (tenant_id, email)"),
        format!("CREATE INDEX IF NOT EXISTS idx_customer_contacts_tenant_customer ON {s}.customer_contacts (tenant_id, customer_id)"),
        format!("CREATE INDEX IF NOT EXISTS idx_channel_accounts_tenant_channel ON {s}.channel_accounts (tenant_id, channel_id)"),
        format!("CREATE INDEX IF NOT EXISTS idx_tickets_tenant_status ON {s}.tickets (tenant_id, status_id)"),
        format!("CREATE INDEX IF NOT EXISTS idx_tickets_tenant_customer ON {s}.tickets (tenant_id, customer_id)"),
        format!("CREATE INDEX IF NOT EXISTS idx_tickets_tenant_created ON {s}.tickets (tenant_id, created_at)"),
        format!("CREATE INDEX IF NOT EXISTS idx_ticket_messages_tenant_ticket ON {s}.ticket_messages (tenant_id, ticket_id)"),
        format!("CREATE INDEX IF NOT EXISTS idx_attachments_tenant_message ON {s}.attachments (tenant_id, message_id)"),
        format!("CREATE INDEX IF NOT EXISTS idx_notes_tenant_ticket ON {s}.notes (tenant_id, ticket_id)"),
        format!("CREATE INDEX IF NOT EXISTS idx_invitations_tenant_email ON {s}.invitations (tenant_id, email)"),
        format!("CREATE INDEX IF NOT EXISTS idx_gdpr_requests_tenant_customer ON {s}.gdpr_requests (tenant_id, customer_id)"),
    ]
}

/// Foreign keys entre as tabelas do tenant. O PostgreSQL não tem
/// "ADD CONSTRAINT IF NOT EXISTS", então estes statements passam pelo
/// `apply_idempotent` (código 42710 = sucesso).
pub fn foreign_key_statements(schema: &SchemaName) -> Vec<String> {
    let s = quote_ident(schema.as_str());
    vec![
        format!("ALTER TABLE {s}.customer_contacts ADD CONSTRAINT fk_customer_contacts_customer FOREIGN KEY (customer_id) REFERENCES {s}.customers (id) ON DELETE CASCADE"),
        format!("ALTER TABLE {s}.channel_accounts ADD CONSTRAINT fk_channel_accounts_channel FOREIGN KEY (channel_id) REFERENCES {s}.channels (id) ON DELETE CASCADE"),
        format!("ALTER TABLE {s}.tickets ADD CONSTRAINT fk_tickets_customer FOREIGN KEY (customer_id) REFERENCES {s}.customers (id) ON DELETE CASCADE"),
        format!("ALTER TABLE {s}.tickets ADD CONSTRAINT fk_tickets_channel FOREIGN KEY (channel_id) REFERENCES {s}.channels (id) ON DELETE SET NULL"),
        format!("ALTER TABLE {s}.tickets ADD CONSTRAINT fk_tickets_status FOREIGN KEY (status_id) REFERENCES {s}.ticket_statuses (id) ON DELETE SET NULL"),
        format!("ALTER TABLE {s}.tickets ADD CONSTRAINT fk_tickets_priority FOREIGN KEY (priority_id) REFERENCES {s}.ticket_priorities (id) ON DELETE SET NULL"),
        format!("ALTER TABLE {s}.ticket_messages ADD CONSTRAINT fk_ticket_messages_ticket FOREIGN KEY (ticket_id) REFERENCES {s}.tickets (id) ON DELETE CASCADE"),
        format!("ALTER TABLE {s}.attachments ADD CONSTRAINT fk_attachments_message FOREIGN KEY (message_id) REFERENCES {s}.ticket_messages (id) ON DELETE CASCADE"),
        format!("ALTER TABLE {s}.notes ADD CONSTRAINT fk_notes_ticket FOREIGN KEY (ticket_id) REFERENCES {s}.tickets (id) ON DELETE CASCADE"),
        format!("ALTER TABLE {s}.ticket_tags ADD CONSTRAINT fk_ticket_tags_ticket FOREIGN KEY (ticket_id) REFERENCES {s}.tickets (id) ON DELETE CASCADE"),
        format!("ALTER TABLE {s}.ticket_tags ADD CONSTRAINT fk_ticket_tags_tag FOREIGN KEY (tag_id) REFERENCES {s}.tags (id) ON DELETE CASCADE"),
        format!("ALTER TABLE {s}.gdpr_requests ADD CONSTRAINT fk_gdpr_requests_customer FOREIGN KEY (customer_id) REFERENCES {s}.customers (id) ON DELETE CASCADE"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_schema() -> (SchemaName, TenantId) {
        let tenant = TenantId::parse("3f99462f-3621-4b1b-bea8-782acc50d62e").unwrap();
        (SchemaName::for_tenant(&tenant), tenant)
    }

    #[test]
    fn every_required_table_has_a_create_statement() {
        let (schema, tenant) = sample_schema();
        let stmts = create_table_statements(&schema, &tenant);
        assert_eq!(stmts.len(), REQUIRED_TABLES.len());
        for table in REQUIRED_TABLES {
            assert!(
                stmts.iter().any(|s| s.contains(&format!(".{table} ("))),
                "faltou CREATE TABLE para {table}"
            );
        }
    }

    #[test]
    fn every_create_statement_is_idempotent_and_isolated() {
        let (schema, tenant) = sample_schema();
        for stmt in create_table_statements(&schema, &tenant) {
            assert!(stmt.starts_with("CREATE TABLE IF NOT EXISTS"));
            assert!(stmt.contains("tenant_id VARCHAR(36) NOT NULL"));
            assert!(stmt.contains("char_length(tenant_id) = 36"));
            // O default da coluna de isolamento é a identidade do tenant
            assert!(stmt.contains("DEFAULT '3f99462f-3621-4b1b-bea8-782acc50d62e'"));
        }
    }

    #[test]
    fn statements_use_the_quoted_schema() {
        let (schema, tenant) = sample_schema();
        let quoted = format!("\"{}\"", schema.as_str());
        let all = create_table_statements(&schema, &tenant)
            .into_iter()
            .chain(create_index_statements(&schema))
            .chain(foreign_key_statements(&schema));
        for stmt in all {
            assert!(stmt.contains(&quoted), "schema sem citação em: {stmt}");
        }
    }

    #[test]
    fn indexes_are_tenant_first() {
        let (schema, _) = sample_schema();
        for stmt in create_index_statements(&schema) {
            assert!(stmt.contains("IF NOT EXISTS"));
            assert!(
                stmt.contains("(tenant_id, "),
                "índice não começa por tenant_id: {stmt}"
            );
        }
    }

    #[test]
    fn foreign_keys_only_reference_required_tables() {
        let (schema, _) = sample_schema();
        for stmt in foreign_key_statements(&schema) {
            let referenced = stmt
                .split("REFERENCES ")
                .nth(1)
                .and_then(|rest| rest.split(" (").next())
                .and_then(|qualified| qualified.split('.').nth(1))
                .expect("statement de FK sem REFERENCES");
            assert!(
                REQUIRED_TABLES.iter().any(|t| *t == referenced),
                "FK referencia tabela desconhecida: {referenced}"
            );
        }
    }

    #[test]
    fn legacy_core_is_a_subset_of_required() {
        for table in LEGACY_CORE_TABLES {
            assert!(REQUIRED_TABLES.contains(&table));
        }
    }

    #[test]
    fn backfills_target_required_tables() {
        for bf in &BOOLEAN_BACKFILLS {
            assert!(REQUIRED_TABLES.contains(&bf.table));
            assert!(matches!(bf.default_value, "TRUE" | "FALSE"));
        }
    }
}
