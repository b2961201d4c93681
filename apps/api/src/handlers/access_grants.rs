use axum::Json;
use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use grantry_core::OperatorIdentity;
use grantry_domain::AccessGrantId;

use crate::dto::{JobEnqueuedResponse, ManualFallbackResponse};
use crate::error::ApiResult;
use crate::state::AppState;

pub async fn retry_access_grant_handler(
    State(state): State<AppState>,
    Extension(operator): Extension<OperatorIdentity>,
    Path(grant_id): Path<String>,
) -> ApiResult<(StatusCode, Json<JobEnqueuedResponse>)> {
    let grant_id = grant_id.parse::<AccessGrantId>()?;
    let job_id = state
        .provisioning_job_service
        .retry_grant(&operator, grant_id)
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(JobEnqueuedResponse::new(grant_id, job_id)),
    ))
}

pub async fn revoke_access_grant_handler(
    State(state): State<AppState>,
    Extension(operator): Extension<OperatorIdentity>,
    Path(grant_id): Path<String>,
) -> ApiResult<(StatusCode, Json<JobEnqueuedResponse>)> {
    let grant_id = grant_id.parse::<AccessGrantId>()?;
    let job_id = state
        .provisioning_job_service
        .request_revoke(&operator, grant_id)
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(JobEnqueuedResponse::new(grant_id, job_id)),
    ))
}

pub async fn manual_fallback_handler(
    State(state): State<AppState>,
    Extension(operator): Extension<OperatorIdentity>,
    Path(grant_id): Path<String>,
) -> ApiResult<(StatusCode, Json<ManualFallbackResponse>)> {
    let grant_id = grant_id.parse::<AccessGrantId>()?;
    let task = state
        .manual_task_service
        .create_operator_fallback(&operator, grant_id)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ManualFallbackResponse {
            access_grant_id: grant_id.to_string(),
            task: task.into(),
        }),
    ))
}
