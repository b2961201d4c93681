use grantry_domain::{AccessGrantId, JobId};
use serde::Serialize;
use ts_rs::TS;

use super::manual_tasks::ManualTaskResponse;

/// A provisioning job enqueued for one grant.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/job-enqueued-response.ts"
)]
pub struct JobEnqueuedResponse {
    pub access_grant_id: String,
    pub job_id: String,
}

impl JobEnqueuedResponse {
    #[must_use]
    pub fn new(access_grant_id: AccessGrantId, job_id: JobId) -> Self {
        Self {
            access_grant_id: access_grant_id.to_string(),
            job_id: job_id.to_string(),
        }
    }
}

/// Manual task opened by an explicit operator fallback.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/manual-fallback-response.ts"
)]
pub struct ManualFallbackResponse {
    pub access_grant_id: String,
    pub task: ManualTaskResponse,
}
