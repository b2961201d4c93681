use axum::Json;
use axum::extract::State;

use crate::dto::HealthResponse;
use crate::error::ApiResult;
use crate::state::AppState;

mod checks;

use checks::{check_postgres, check_redis};

/// Provisioning state (always fresh), cached stats and dependency checks.
/// A DEGRADED provisioning state is still served with 200.
pub async fn health_handler(State(state): State<AppState>) -> ApiResult<Json<HealthResponse>> {
    let view = state.provisioning_status_service.status(true).await?;
    let postgres = check_postgres(state.postgres_pool.clone()).await;
    let redis = check_redis(state.redis_client.clone()).await;

    Ok(Json(HealthResponse {
        provisioning: view.into(),
        postgres,
        redis,
    }))
}
