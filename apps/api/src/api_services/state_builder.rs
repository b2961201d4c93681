use grantry_application::{FanoutService, ProvisioningStatusService};
use grantry_core::AppError;
use sqlx::PgPool;

use crate::api_config::ApiConfig;
use crate::state::AppState;

use super::redis::build_redis_client;

mod caches;
mod provisioning;
mod repositories;

pub fn build_app_state(pool: PgPool, config: &ApiConfig) -> Result<AppState, AppError> {
    let redis_client = config
        .redis_url
        .as_deref()
        .map(build_redis_client)
        .transpose()?;

    let repositories = repositories::build_repository_set(&pool);
    let services = provisioning::build_provisioning_services(config, &repositories)?;
    let stats_cache = caches::build_provisioning_stats_cache(redis_client.clone());

    Ok(AppState {
        fanout_service: FanoutService::new(repositories.fanout_repository.clone()),
        credential_service: services.credential_service,
        manual_task_service: services.manual_task_service,
        provisioning_job_service: services.job_service,
        provisioning_status_service: ProvisioningStatusService::new(
            services.state_service,
            repositories.access_grant_repository.clone(),
        )
        .with_stats_cache(stats_cache, config.status_cache_ttl_seconds),
        admin_api_token: config.admin_api_token.clone(),
        payment_webhook_secret: config.payment_webhook_secret.clone(),
        postgres_pool: pool,
        redis_client,
    })
}
