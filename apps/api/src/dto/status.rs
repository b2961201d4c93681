use grantry_application::{ProvisioningStats, ProvisioningStatusView};
use serde::Serialize;
use serde_json::Value;
use ts_rs::TS;

use super::common::format_timestamp;

/// Grant and manual task counters.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/provisioning-stats-response.ts"
)]
pub struct ProvisioningStatsResponse {
    pub pending: u64,
    pub failed: u64,
    pub granted: u64,
    pub revoked: u64,
    pub manual_task_count: u64,
}

impl From<ProvisioningStats> for ProvisioningStatsResponse {
    fn from(stats: ProvisioningStats) -> Self {
        Self {
            pending: stats.pending,
            failed: stats.failed,
            granted: stats.granted,
            revoked: stats.revoked,
            manual_task_count: stats.manual_task_count,
        }
    }
}

/// Provisioning state with counters.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/provisioning-status-response.ts"
)]
pub struct ProvisioningStatusResponse {
    /// `HEALTHY` or `DEGRADED`.
    pub state: String,
    pub reason: Option<String>,
    pub incident_id: Option<String>,
    pub degraded_at: Option<String>,
    pub healthy_at: Option<String>,
    pub recovered_by: Option<String>,
    #[ts(type = "Record<string, unknown>")]
    pub metadata: Value,
    pub stats: ProvisioningStatsResponse,
}

impl From<ProvisioningStatusView> for ProvisioningStatusResponse {
    fn from(view: ProvisioningStatusView) -> Self {
        let state = view.state;
        Self {
            state: state.status.as_str().to_owned(),
            reason: state.reason,
            incident_id: state.incident_id.map(|incident_id| incident_id.to_string()),
            degraded_at: state.degraded_at.map(format_timestamp),
            healthy_at: state.healthy_at.map(format_timestamp),
            recovered_by: state.recovered_by,
            metadata: Value::Object(state.metadata),
            stats: view.stats.into(),
        }
    }
}

/// Reachability of one backing service.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/dependency-status-response.ts"
)]
pub struct DependencyStatusResponse {
    /// `ok`, `error` or `disabled`.
    pub status: &'static str,
    pub detail: Option<String>,
}

/// Public health payload: provisioning status plus dependency checks.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/health-response.ts"
)]
pub struct HealthResponse {
    #[serde(flatten)]
    #[ts(flatten)]
    pub provisioning: ProvisioningStatusResponse,
    pub postgres: DependencyStatusResponse,
    pub redis: DependencyStatusResponse,
}
