use axum::Json;
use axum::extract::State;

use crate::dto::ProvisioningStatusResponse;
use crate::error::ApiResult;
use crate::state::AppState;

pub async fn provisioning_status_handler(
    State(state): State<AppState>,
) -> ApiResult<Json<ProvisioningStatusResponse>> {
    let view = state.provisioning_status_service.status(false).await?;

    Ok(Json(view.into()))
}
