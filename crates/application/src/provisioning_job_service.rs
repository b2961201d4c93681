//! Job processor: the single place that turns provider outcomes into grant
//! and provisioning state changes.

use std::sync::Arc;

use chrono::Utc;
use grantry_core::{AppError, AppResult, OperatorIdentity};
use grantry_domain::{
    AccessGrant, AccessGrantId, AccessGrantStatus, AuditAction, JobId, ManualTaskOrigin,
    ManualTaskType, ProvisioningAction, RetryPolicy,
};
use serde_json::json;

use crate::manual_task_service::{CreateManualTaskInput, ManualTaskService};
use crate::provider_selector::{ProviderOperation, ProviderSelector};
use crate::provisioning_ports::{
    AccessGrantRepository, AccessNotice, AlertUrgency, AuditEvent, ClaimedProvisioningJob,
    EnqueueProvisioningJob, GrantTarget, GrantWriteFence, JobDisposition, JobQueue, OperatorAlert,
    ProviderOutcome, ProvisioningNotifier, ProvisioningRequest,
};
use crate::provisioning_state_service::ProvisioningStateService;

mod operator;
mod process;

/// Application service that processes provisioning jobs.
#[derive(Clone)]
pub struct ProvisioningJobService {
    grant_repository: Arc<dyn AccessGrantRepository>,
    job_queue: Arc<dyn JobQueue>,
    notifier: Arc<dyn ProvisioningNotifier>,
    state_service: ProvisioningStateService,
    manual_task_service: ManualTaskService,
    provider_selector: ProviderSelector,
    retry_policy: RetryPolicy,
    actor: OperatorIdentity,
}

impl ProvisioningJobService {
    /// Creates a job service with the default retry policy.
    #[must_use]
    pub fn new(
        grant_repository: Arc<dyn AccessGrantRepository>,
        job_queue: Arc<dyn JobQueue>,
        notifier: Arc<dyn ProvisioningNotifier>,
        state_service: ProvisioningStateService,
        manual_task_service: ManualTaskService,
        provider_selector: ProviderSelector,
    ) -> Self {
        Self {
            grant_repository,
            job_queue,
            notifier,
            state_service,
            manual_task_service,
            provider_selector,
            retry_policy: RetryPolicy::default(),
            actor: OperatorIdentity::system("provisioning-worker"),
        }
    }

    /// Overrides the retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    /// Returns the retry policy in effect.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry_policy
    }

    async fn notify_customer(&self, target: &GrantTarget, granted: bool, reason: Option<String>) {
        let notice = AccessNotice {
            user_id: target.grant.user_id(),
            email: target.user_email.clone(),
            access_grant_id: target.grant.id(),
            resource_name: target.resource.name.clone(),
            reason,
        };

        let sent = if granted {
            self.notifier.access_granted(&notice).await
        } else {
            self.notifier.access_failed(&notice).await
        };

        if let Err(error) = sent {
            tracing::warn!(
                grant_id = %target.grant.id(),
                error = %error,
                "failed to send customer provisioning notice"
            );
        }
    }

    async fn alert_operator(&self, alert: OperatorAlert) {
        if let Err(error) = self.notifier.operator_alert(&alert).await {
            tracing::warn!(
                urgency = alert.urgency.as_str(),
                error = %error,
                "failed to send operator alert"
            );
        }
    }
}

#[cfg(test)]
mod tests;
