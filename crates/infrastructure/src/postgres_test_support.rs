use grantry_domain::{AccessGrant, AccessGrantId, ProtectedResourceId, UserId};
use sqlx::PgPool;
use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

pub(crate) async fn test_pool() -> Option<PgPool> {
    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        return None;
    };

    let pool = match PgPoolOptions::new()
        .max_connections(4)
        .connect(database_url.as_str())
        .await
    {
        Ok(pool) => pool,
        Err(error) => panic!("failed to connect to DATABASE_URL in test: {error}"),
    };

    if let Err(error) = MIGRATOR.run(&pool).await {
        panic!("failed to run migrations for postgres provisioning tests: {error}");
    }

    Some(pool)
}

pub(crate) async fn insert_user(pool: &PgPool, external_username: Option<&str>) -> UserId {
    let user_id = UserId::new();
    let insert = sqlx::query(
        r#"
        INSERT INTO users (id, email, external_username)
        VALUES ($1, $2, $3)
        "#,
    )
    .bind(user_id.as_uuid())
    .bind(format!("{user_id}@example.com"))
    .bind(external_username)
    .execute(pool)
    .await;
    assert!(insert.is_ok());

    user_id
}

pub(crate) async fn insert_resource(
    pool: &PgPool,
    name: &str,
    is_active: bool,
) -> ProtectedResourceId {
    let resource_id = ProtectedResourceId::new();
    let insert = sqlx::query(
        r#"
        INSERT INTO protected_resources (id, name, upstream_resource_id, is_active)
        VALUES ($1, $2, $3, $4)
        "#,
    )
    .bind(resource_id.as_uuid())
    .bind(name)
    .bind(format!("upstream-{resource_id}"))
    .bind(is_active)
    .execute(pool)
    .await;
    assert!(insert.is_ok());

    resource_id
}

pub(crate) async fn insert_pending_grant(
    pool: &PgPool,
    user_id: UserId,
    resource_id: ProtectedResourceId,
) -> AccessGrant {
    let grant = AccessGrant::pending(user_id, resource_id, chrono::Utc::now());
    let insert = sqlx::query(
        r#"
        INSERT INTO access_grants (id, user_id, resource_id, status, created_at)
        VALUES ($1, $2, $3, 'pending', $4)
        "#,
    )
    .bind(grant.id().as_uuid())
    .bind(user_id.as_uuid())
    .bind(resource_id.as_uuid())
    .bind(grant.created_at())
    .execute(pool)
    .await;
    assert!(insert.is_ok());

    grant
}

pub(crate) async fn job_statuses_for_grant(pool: &PgPool, grant_id: AccessGrantId) -> Vec<String> {
    let statuses = sqlx::query_scalar::<_, String>(
        r#"
        SELECT status
        FROM provisioning_jobs
        WHERE access_grant_id = $1
        ORDER BY created_at ASC
        "#,
    )
    .bind(grant_id.as_uuid())
    .fetch_all(pool)
    .await;
    assert!(statuses.is_ok());

    statuses.unwrap_or_default()
}

pub(crate) async fn audit_actions_for(pool: &PgPool, resource_id: &str) -> Vec<String> {
    let actions = sqlx::query_scalar::<_, String>(
        r#"
        SELECT action
        FROM audit_log_entries
        WHERE resource_id = $1
        ORDER BY id ASC
        "#,
    )
    .bind(resource_id)
    .fetch_all(pool)
    .await;
    assert!(actions.is_ok());

    actions.unwrap_or_default()
}
