// tests/provisioning.rs
//
// Testes de integração contra um PostgreSQL real. Todos são `#[ignore]`
// para a suíte passar sem cluster; rode com:
//
//     DATABASE_URL=postgres://... cargo test -- --ignored
//
// Cada teste usa um tenant novo (UUID aleatório) e derruba o schema no
// fim, então podem rodar em paralelo contra o mesmo banco.

use uuid::Uuid;

use tenancy::{AppState, SchemaName, TenantId};

async fn state() -> AppState {
    // Logger compacto, igual ao do processo real; try_init porque os
    // testes rodam em paralelo no mesmo binário.
    tracing_subscriber::fmt()
        .with_target(false)
        .compact()
        .try_init()
        .ok();

    AppState::new()
        .await
        .expect("falha ao montar o AppState (DATABASE_URL está definida?)")
}

fn fresh_tenant() -> TenantId {
    TenantId::parse(&Uuid::new_v4().to_string()).unwrap()
}

#[tokio::test]
#[ignore = "requer um PostgreSQL acessível via DATABASE_URL"]
async fn provision_twice_is_idempotent() {
    let state = state().await;
    let tenant = fresh_tenant();

    state.tenant_service.provision_tenant_schema(&tenant).await.unwrap();
    // A segunda chamada não pode devolver erro de objeto duplicado
    state.tenant_service.provision_tenant_schema(&tenant).await.unwrap();

    assert!(state.tenant_service.is_schema_valid(&tenant).await.unwrap());

    state.tenant_service.drop_tenant_schema(&tenant).await.unwrap();
}

#[tokio::test]
#[ignore = "requer um PostgreSQL acessível via DATABASE_URL"]
async fn validator_flags_a_missing_table() {
    let state = state().await;
    let tenant = fresh_tenant();
    let schema = SchemaName::for_tenant(&tenant);

    state.tenant_service.provision_tenant_schema(&tenant).await.unwrap();

    // Derruba uma tabela obrigatória pelas costas do serviço
    sqlx::query(&format!("DROP TABLE \"{}\".gdpr_requests", schema.as_str()))
        .execute(&state.admin_pool)
        .await
        .unwrap();

    let report = state.tenant_service.schema_report(&tenant).await.unwrap();
    assert!(!report.is_valid());
    assert_eq!(report.missing_tables, vec!["gdpr_requests".to_string()]);

    state.tenant_service.drop_tenant_schema(&tenant).await.unwrap();
}

#[tokio::test]
#[ignore = "requer um PostgreSQL acessível via DATABASE_URL"]
async fn drop_evicts_and_reacquire_reprovisions() {
    let state = state().await;
    let tenant = fresh_tenant();

    state.tenant_service.provision_tenant_schema(&tenant).await.unwrap();
    state.tenant_service.drop_tenant_schema(&tenant).await.unwrap();

    assert!(!state.tenant_service.is_schema_valid(&tenant).await.unwrap());

    // O próximo acesso reconstrói tudo a partir do zero
    let handle = state
        .tenant_service
        .acquire_tenant_connection(&tenant)
        .await
        .unwrap();

    // A conexão resolve nomes sem qualificar: o search_path aponta para o
    // schema do tenant
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM customers")
        .fetch_one(&handle.pool)
        .await
        .unwrap();
    assert_eq!(count, 0);

    state.tenant_service.drop_tenant_schema(&tenant).await.unwrap();
}

#[tokio::test]
#[ignore = "requer um PostgreSQL acessível via DATABASE_URL"]
async fn tenants_only_see_their_own_rows() {
    let state = state().await;
    let tenant_a = fresh_tenant();
    let tenant_b = fresh_tenant();

    let handle_a = state
        .tenant_service
        .acquire_tenant_connection(&tenant_a)
        .await
        .unwrap();
    let handle_b = state
        .tenant_service
        .acquire_tenant_connection(&tenant_b)
        .await
        .unwrap();

    // Mesmo e-mail nos dois tenants: tabelas homônimas, schemas distintos
    for handle in [&handle_a, &handle_b] {
        sqlx::query("INSERT INTO customers (name, email) VALUES ($1, $2)")
            .bind("Cliente")
            .bind("cliente@example.com")
            .execute(&handle.pool)
            .await
            .unwrap();
    }

    // Cada um enxerga exatamente a sua linha, com o seu tenant_id
    // (preenchido pelo DEFAULT da coluna de isolamento)
    for (handle, tenant) in [(&handle_a, &tenant_a), (&handle_b, &tenant_b)] {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT tenant_id FROM customers WHERE email = $1")
                .bind("cliente@example.com")
                .fetch_all(&handle.pool)
                .await
                .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].0, tenant.canonical());
    }

    state.tenant_service.drop_tenant_schema(&tenant_a).await.unwrap();
    state.tenant_service.drop_tenant_schema(&tenant_b).await.unwrap();
}

#[tokio::test]
#[ignore = "requer um PostgreSQL acessível via DATABASE_URL"]
async fn legacy_schema_is_repaired_additively() {
    let state = state().await;
    let tenant = fresh_tenant();
    let schema = SchemaName::for_tenant(&tenant);
    let quoted = format!("\"{}\"", schema.as_str());

    // Monta um schema "antigo": tabela core sem a coluna de isolamento e
    // sem as flags que viraram obrigatórias
    sqlx::query(&format!("CREATE SCHEMA {quoted}"))
        .execute(&state.admin_pool)
        .await
        .unwrap();
    sqlx::query(&format!(
        "CREATE TABLE {quoted}.customers (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            name VARCHAR(255) NOT NULL,
            email VARCHAR(255) NOT NULL
        )"
    ))
    .execute(&state.admin_pool)
    .await
    .unwrap();
    sqlx::query(&format!(
        "INSERT INTO {quoted}.customers (name, email) VALUES ('Antigo', 'antigo@example.com')"
    ))
    .execute(&state.admin_pool)
    .await
    .unwrap();

    // O provisionamento detecta o drift e repara sem perder a linha
    state.tenant_service.provision_tenant_schema(&tenant).await.unwrap();

    let (tenant_id, gdpr_consent): (String, bool) = sqlx::query_as(&format!(
        "SELECT tenant_id, gdpr_consent FROM {quoted}.customers WHERE email = 'antigo@example.com'"
    ))
    .fetch_one(&state.admin_pool)
    .await
    .unwrap();

    // A linha legada ganhou o dono certo e o default seguro da flag
    assert_eq!(tenant_id, tenant.canonical());
    assert!(!gdpr_consent);

    assert!(state.tenant_service.is_schema_valid(&tenant).await.unwrap());

    state.tenant_service.drop_tenant_schema(&tenant).await.unwrap();
}

#[tokio::test]
#[ignore = "requer um PostgreSQL acessível via DATABASE_URL"]
async fn list_includes_provisioned_tenants() {
    let state = state().await;
    let tenant = fresh_tenant();
    let schema = SchemaName::for_tenant(&tenant);

    state.tenant_service.provision_tenant_schema(&tenant).await.unwrap();

    let schemas = state.tenant_service.list_tenant_schemas().await.unwrap();
    assert!(schemas.iter().any(|s| s == &schema));

    let registered = state.tenant_service.list_registered_tenants().await.unwrap();
    assert!(registered.iter().any(|t| t.id == tenant.as_uuid()));

    state.tenant_service.drop_tenant_schema(&tenant).await.unwrap();

    let schemas = state.tenant_service.list_tenant_schemas().await.unwrap();
    assert!(!schemas.iter().any(|s| s == &schema));
}
