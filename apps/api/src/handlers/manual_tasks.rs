use axum::Json;
use axum::extract::{Extension, Path, State};
use grantry_core::OperatorIdentity;
use grantry_domain::ManualTaskId;

use crate::dto::{CloseManualTaskRequest, ManualTaskResponse};
use crate::error::ApiResult;
use crate::state::AppState;

pub async fn list_manual_tasks_handler(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<ManualTaskResponse>>> {
    let tasks = state.manual_task_service.list_pending().await?;

    Ok(Json(tasks.into_iter().map(ManualTaskResponse::from).collect()))
}

pub async fn complete_manual_task_handler(
    State(state): State<AppState>,
    Extension(operator): Extension<OperatorIdentity>,
    Path(task_id): Path<String>,
    payload: Option<Json<CloseManualTaskRequest>>,
) -> ApiResult<Json<ManualTaskResponse>> {
    let task_id = task_id.parse::<ManualTaskId>()?;
    let notes = close_notes(payload);
    let task = state
        .manual_task_service
        .complete_task(&operator, task_id, notes)
        .await?;

    Ok(Json(task.into()))
}

pub async fn fail_manual_task_handler(
    State(state): State<AppState>,
    Extension(operator): Extension<OperatorIdentity>,
    Path(task_id): Path<String>,
    payload: Option<Json<CloseManualTaskRequest>>,
) -> ApiResult<Json<ManualTaskResponse>> {
    let task_id = task_id.parse::<ManualTaskId>()?;
    let notes = close_notes(payload);
    let task = state
        .manual_task_service
        .fail_task(&operator, task_id, notes)
        .await?;

    Ok(Json(task.into()))
}

fn close_notes(payload: Option<Json<CloseManualTaskRequest>>) -> Option<String> {
    payload
        .and_then(|Json(request)| request.notes)
        .map(|notes| notes.trim().to_owned())
        .filter(|notes| !notes.is_empty())
}
