use axum::Router;
use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};

use crate::state::AppState;
use crate::{handlers, middleware};

pub(super) fn build_admin_routes(app_state: AppState) -> Router<AppState> {
    Router::new()
        .route(
            "/api/admin/credentials",
            get(handlers::credentials::credential_status_handler)
                .post(handlers::credentials::store_credentials_handler),
        )
        .route(
            "/api/admin/access-grants/{grant_id}/retry",
            post(handlers::access_grants::retry_access_grant_handler),
        )
        .route(
            "/api/admin/access-grants/{grant_id}/revoke",
            post(handlers::access_grants::revoke_access_grant_handler),
        )
        .route(
            "/api/admin/access-grants/{grant_id}/manual-fallback",
            post(handlers::access_grants::manual_fallback_handler),
        )
        .route(
            "/api/admin/manual-tasks",
            get(handlers::manual_tasks::list_manual_tasks_handler),
        )
        .route(
            "/api/admin/manual-tasks/{task_id}/complete",
            post(handlers::manual_tasks::complete_manual_task_handler),
        )
        .route(
            "/api/admin/manual-tasks/{task_id}/fail",
            post(handlers::manual_tasks::fail_manual_task_handler),
        )
        .route(
            "/api/admin/provisioning/status",
            get(handlers::provisioning::provisioning_status_handler),
        )
        .route_layer(from_fn_with_state(
            app_state,
            middleware::require_admin_token,
        ))
}
