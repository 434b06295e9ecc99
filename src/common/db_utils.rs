// src/common/db_utils.rs

use sqlx::{Executor, Postgres};

// ---
// Helpers de DDL: a parte "perigosa" do crate mora aqui
// ---
// Identificadores (nomes de schema) não podem ser passados como parâmetro
// de query em DDL, então em algum momento eles viram texto SQL. A defesa
// primária é a validação estrita do UUID em `TenantId::parse`; estes
// helpers são a defesa em profundidade.

/// Cita um identificador para uso seguro em DDL, dobrando aspas internas.
/// Equivalente ao `quote_ident` do próprio PostgreSQL.
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

// Códigos SQLSTATE do PostgreSQL para objetos que já existem.
// Comparar por código (e não por texto da mensagem) é o que nos permite
// engolir a corrida "dois processos criaram a mesma constraint" sem
// mascarar falhas reais.
const SQLSTATE_DUPLICATE_SCHEMA: &str = "42P06";
const SQLSTATE_DUPLICATE_TABLE: &str = "42P07";
const SQLSTATE_DUPLICATE_COLUMN: &str = "42701";
const SQLSTATE_DUPLICATE_OBJECT: &str = "42710";

/// Verifica se o erro é "objeto já existe" (schema, tabela, coluna ou
/// constraint), pelo código SQLSTATE.
pub fn is_already_exists(err: &sqlx::Error) -> bool {
    if let Some(db_err) = err.as_database_error() {
        if let Some(code) = db_err.code() {
            return matches!(
                &*code,
                SQLSTATE_DUPLICATE_SCHEMA
                    | SQLSTATE_DUPLICATE_TABLE
                    | SQLSTATE_DUPLICATE_COLUMN
                    | SQLSTATE_DUPLICATE_OBJECT
            );
        }
    }
    false
}

/// Executa um statement de DDL tratando "já existe" como sucesso.
///
/// Retorna `Ok(true)` se o statement aplicou de fato, `Ok(false)` se o
/// objeto já existia (outra task ou outro processo chegou primeiro) e
/// `Err` para qualquer falha genuína.
pub async fn apply_idempotent<'e, E>(executor: E, sql: &str) -> Result<bool, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    match sqlx::query(sql).execute(executor).await {
        Ok(_) => Ok(true),
        Err(e) if is_already_exists(&e) => Ok(false),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quote_ident_wraps_in_double_quotes() {
        assert_eq!(quote_ident("tenant_abc"), "\"tenant_abc\"");
    }

    #[test]
    fn quote_ident_escapes_embedded_quotes() {
        // Mesmo que a validação nunca deixe isso chegar aqui, a citação
        // precisa neutralizar aspas embutidas.
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
    }

    #[test]
    fn non_database_errors_are_not_already_exists() {
        assert!(!is_already_exists(&sqlx::Error::PoolTimedOut));
        assert!(!is_already_exists(&sqlx::Error::RowNotFound));
    }
}
