// src/common/error.rs

use thiserror::Error;

// Nosso tipo de erro, com `thiserror` para melhor ergonomia.
//
// A taxonomia segue o ciclo de vida de um schema de tenant: a identidade é
// rejeitada antes de qualquer I/O, erros de DDL são fatais para a chamada
// (mas seguros de repetir, porque todo DDL aqui é idempotente) e erros de
// migração legada são não-fatais para quem provisiona.
#[derive(Debug, Error)]
pub enum AppError {
    // A identidade do tenant não é um UUID v4 válido. Rejeitada de forma
    // síncrona, sem nunca tocar no banco.
    #[error("Identidade de tenant inválida: {0:?}")]
    InvalidIdentity(String),

    // Falha de DDL ao criar o schema ou as tabelas dele.
    #[error("Falha ao provisionar o schema {schema}: {source}")]
    SchemaCreationError {
        schema: String,
        #[source]
        source: sqlx::Error,
    },

    // Falha na migração legada (caminho com backup E fallback direto).
    // Quem chama decide se isso aborta o fluxo — o Provisioner não aborta.
    #[error("Falha na migração legada do schema {schema}: {source}")]
    MigrationError {
        schema: String,
        #[source]
        source: sqlx::Error,
    },

    // Esgotou o tempo de espera por uma conexão da pool. Retryable.
    #[error("Timeout ao adquirir conexão da pool")]
    PoolTimeout,

    // Variante para os demais erros de banco de dados (sqlx)
    #[error("Erro de banco de dados")]
    DatabaseError(sqlx::Error),

    // Variante genérica para qualquer outro erro inesperado
    // `anyhow::Error` é ótimo para capturar o contexto do erro.
    #[error("Erro interno")]
    InternalServerError(#[from] anyhow::Error),
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        // Separa o timeout de aquisição (retryable pelo caller) dos demais.
        match e {
            sqlx::Error::PoolTimedOut => AppError::PoolTimeout,
            other => AppError::DatabaseError(other),
        }
    }
}

impl AppError {
    /// Indica se vale a pena o caller tentar de novo: problemas de
    /// infraestrutura sim, identidade malformada não.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::PoolTimeout
                | AppError::DatabaseError(_)
                | AppError::SchemaCreationError { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_timeout_is_mapped_and_retryable() {
        let err: AppError = sqlx::Error::PoolTimedOut.into();
        assert!(matches!(err, AppError::PoolTimeout));
        assert!(err.is_retryable());
    }

    #[test]
    fn invalid_identity_is_not_retryable() {
        let err = AppError::InvalidIdentity("abc".to_string());
        assert!(!err.is_retryable());
    }
}
