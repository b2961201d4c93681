use grantry_domain::ManualTask;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use super::common::format_timestamp;

/// Operator-actionable manual task.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/manual-task-response.ts"
)]
pub struct ManualTaskResponse {
    pub id: String,
    pub task_type: String,
    pub target_username: String,
    pub resource_id: String,
    pub access_grant_id: Option<String>,
    pub origin: String,
    pub status: String,
    pub completed_by: Option<String>,
    pub completed_at: Option<String>,
    pub notes: Option<String>,
    pub created_at: String,
}

impl From<ManualTask> for ManualTaskResponse {
    fn from(task: ManualTask) -> Self {
        let parts = task.parts();
        Self {
            id: parts.id.to_string(),
            task_type: parts.task_type.as_str().to_owned(),
            target_username: parts.target_username.clone(),
            resource_id: parts.resource_id.to_string(),
            access_grant_id: parts.access_grant_id.map(|grant_id| grant_id.to_string()),
            origin: parts.origin.as_str().to_owned(),
            status: parts.status.as_str().to_owned(),
            completed_by: parts.completed_by.clone(),
            completed_at: parts.completed_at.map(format_timestamp),
            notes: parts.notes.clone(),
            created_at: format_timestamp(parts.created_at),
        }
    }
}

/// Body for closing a manual task.
#[derive(Debug, Default, Deserialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/close-manual-task-request.ts"
)]
pub struct CloseManualTaskRequest {
    #[serde(default)]
    pub notes: Option<String>,
}
