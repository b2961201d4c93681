use redis::AsyncCommands;

use crate::dto::DependencyStatusResponse;

pub(super) async fn check_postgres(pool: sqlx::PgPool) -> DependencyStatusResponse {
    let check = sqlx::query_scalar::<_, i32>("SELECT 1")
        .fetch_one(&pool)
        .await;

    match check {
        Ok(_) => DependencyStatusResponse {
            status: "ok",
            detail: None,
        },
        Err(error) => DependencyStatusResponse {
            status: "error",
            detail: Some(format!("postgres check failed: {error}")),
        },
    }
}

pub(super) async fn check_redis(redis_client: Option<redis::Client>) -> DependencyStatusResponse {
    let Some(redis_client) = redis_client else {
        return DependencyStatusResponse {
            status: "disabled",
            detail: None,
        };
    };

    let mut connection = match redis_client.get_multiplexed_async_connection().await {
        Ok(connection) => connection,
        Err(error) => {
            return DependencyStatusResponse {
                status: "error",
                detail: Some(format!("redis connection failed: {error}")),
            };
        }
    };

    match connection.ping::<String>().await {
        Ok(value) if value.eq_ignore_ascii_case("pong") => DependencyStatusResponse {
            status: "ok",
            detail: None,
        },
        Ok(value) => DependencyStatusResponse {
            status: "error",
            detail: Some(format!("unexpected redis ping response: {value}")),
        },
        Err(error) => DependencyStatusResponse {
            status: "error",
            detail: Some(format!("redis ping failed: {error}")),
        },
    }
}
