use std::sync::Arc;

use grantry_core::AppResult;
use grantry_domain::{AuditAction, IncidentId, ProvisioningAction, RetryPolicy};
use serde_json::json;

use crate::provisioning_ports::{
    AccessGrantRepository, AuditEvent, AuditRepository, EnqueueProvisioningJob, JobQueue,
};

/// Counts from one resume pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResumeSummary {
    /// Grants requeued with a fresh job.
    pub requeued: usize,
    /// Grants whose enqueue failed.
    pub failed: usize,
}

/// Re-enqueues pending work after provisioning recovers.
#[derive(Clone)]
pub struct ResumeService {
    grant_repository: Arc<dyn AccessGrantRepository>,
    job_queue: Arc<dyn JobQueue>,
    audit_repository: Arc<dyn AuditRepository>,
    retry_policy: RetryPolicy,
}

impl ResumeService {
    /// Creates a resume service.
    #[must_use]
    pub fn new(
        grant_repository: Arc<dyn AccessGrantRepository>,
        job_queue: Arc<dyn JobQueue>,
        audit_repository: Arc<dyn AuditRepository>,
        retry_policy: RetryPolicy,
    ) -> Self {
        Self {
            grant_repository,
            job_queue,
            audit_repository,
            retry_policy,
        }
    }

    /// Requeues every resumable PENDING grant with a fresh job id and the
    /// short resume delay, then records one audit entry with the counts.
    pub async fn resume_pending(
        &self,
        subject: &str,
        incident_id: Option<IncidentId>,
    ) -> AppResult<ResumeSummary> {
        let grant_ids = self.grant_repository.list_resumable_grant_ids().await?;
        let mut summary = ResumeSummary::default();

        for grant_id in grant_ids {
            let enqueued = self
                .job_queue
                .enqueue(EnqueueProvisioningJob {
                    access_grant_id: grant_id,
                    action: ProvisioningAction::Grant,
                    delay: self.retry_policy.resume_delay,
                })
                .await;

            match enqueued {
                Ok(job_id) => {
                    summary.requeued += 1;
                    tracing::debug!(grant_id = %grant_id, job_id = %job_id, "requeued pending grant");
                }
                Err(error) => {
                    summary.failed += 1;
                    tracing::warn!(grant_id = %grant_id, error = %error, "failed to requeue pending grant");
                }
            }
        }

        self.audit_repository
            .append_event(
                AuditEvent::new(
                    subject,
                    AuditAction::ProvisioningResumed,
                    "provisioning_state",
                    "provisioning_state",
                )
                .with_detail(json!({
                    "requeued": summary.requeued,
                    "failed": summary.failed,
                    "incident_id": incident_id.map(|id| id.to_string()),
                })),
            )
            .await?;

        tracing::info!(
            requeued = summary.requeued,
            failed = summary.failed,
            "resumed pending provisioning work"
        );

        Ok(summary)
    }
}
