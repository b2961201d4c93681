use chrono::Utc;
use grantry_application::{CredentialStatus, RecoveryReport, StoreCredentialsResult};
use grantry_domain::{CredentialMetadata, RecoverTransition};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use super::common::format_timestamp;

/// Operator credential submission. Secrets never appear in debug output.
#[derive(Deserialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/store-credentials-request.ts"
)]
pub struct StoreCredentialsRequest {
    pub session_id: String,
    pub session_signature: String,
    #[serde(default)]
    pub api_url: Option<String>,
}

impl std::fmt::Debug for StoreCredentialsRequest {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("StoreCredentialsRequest")
            .field("api_url", &self.api_url)
            .finish_non_exhaustive()
    }
}

/// Credential metadata; secrets are never returned.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/credential-metadata-response.ts"
)]
pub struct CredentialMetadataResponse {
    pub id: String,
    pub api_url: String,
    pub is_active: bool,
    pub validated_at: Option<String>,
    pub last_used_at: Option<String>,
    pub created_by: String,
    pub created_at: String,
    pub age_hours: i64,
    /// `fresh`, `aging` or `stale`.
    pub age_warning: String,
}

impl From<CredentialStatus> for CredentialMetadataResponse {
    fn from(status: CredentialStatus) -> Self {
        Self::from_parts(status.metadata, status.age_hours, status.age_warning.as_str())
    }
}

impl From<CredentialMetadata> for CredentialMetadataResponse {
    fn from(metadata: CredentialMetadata) -> Self {
        let now = Utc::now();
        let age_hours = metadata.age_hours(now);
        let age_warning = metadata.age_warning(now);
        Self::from_parts(metadata, age_hours, age_warning.as_str())
    }
}

impl CredentialMetadataResponse {
    fn from_parts(metadata: CredentialMetadata, age_hours: i64, age_warning: &str) -> Self {
        Self {
            id: metadata.id.to_string(),
            api_url: metadata.api_url,
            is_active: metadata.is_active,
            validated_at: metadata.validated_at.map(format_timestamp),
            last_used_at: metadata.last_used_at.map(format_timestamp),
            created_by: metadata.created_by,
            created_at: format_timestamp(metadata.created_at),
            age_hours,
            age_warning: age_warning.to_owned(),
        }
    }
}

/// Active credential lookup.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/credential-status-response.ts"
)]
pub struct CredentialStatusResponse {
    pub configured: bool,
    pub credential: Option<CredentialMetadataResponse>,
}

impl From<Option<CredentialStatus>> for CredentialStatusResponse {
    fn from(status: Option<CredentialStatus>) -> Self {
        Self {
            configured: status.is_some(),
            credential: status.map(CredentialMetadataResponse::from),
        }
    }
}

/// Provisioning recovery that followed a credential submission.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/recovery-response.ts"
)]
pub struct RecoveryResponse {
    /// `recovered` or `already_healthy`.
    pub transition: String,
    pub incident_id: Option<String>,
    pub state: String,
    /// Grants requeued; absent when the resume pass failed.
    pub requeued: Option<u32>,
    pub requeue_failures: Option<u32>,
}

impl From<RecoveryReport> for RecoveryResponse {
    fn from(report: RecoveryReport) -> Self {
        let (transition, incident_id) = match report.transition {
            RecoverTransition::Recovered { incident_id } => ("recovered", incident_id),
            RecoverTransition::AlreadyHealthy => ("already_healthy", None),
        };

        Self {
            transition: transition.to_owned(),
            incident_id: incident_id.map(|incident_id| incident_id.to_string()),
            state: report.state.status.as_str().to_owned(),
            requeued: report
                .resume
                .map(|summary| u32::try_from(summary.requeued).unwrap_or(u32::MAX)),
            requeue_failures: report
                .resume
                .map(|summary| u32::try_from(summary.failed).unwrap_or(u32::MAX)),
        }
    }
}

/// Stored credential plus the recovery it triggered.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/store-credentials-response.ts"
)]
pub struct StoreCredentialsResponse {
    pub credential: CredentialMetadataResponse,
    pub recovery: RecoveryResponse,
}

impl From<StoreCredentialsResult> for StoreCredentialsResponse {
    fn from(result: StoreCredentialsResult) -> Self {
        Self {
            credential: result.metadata.into(),
            recovery: result.recovery.into(),
        }
    }
}
