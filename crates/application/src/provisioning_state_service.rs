//! Provisioning health transitions.
//!
//! The two transitions have deliberately different entry points: degrading
//! is crate-private and only reachable from job processing, while recovery
//! requires a [`CredentialValidated`] proof that only the credential service
//! can mint.

use std::sync::Arc;

use grantry_core::{AppResult, OperatorIdentity};
use grantry_domain::{DegradeTransition, ProvisioningState, RecoverTransition};
use serde_json::Value;

use crate::credential_service::CredentialValidated;
use crate::provisioning_ports::{
    AlertUrgency, OperatorAlert, ProvisioningNotifier, ProvisioningStateRepository,
};
use crate::resume_service::{ResumeService, ResumeSummary};

/// Outcome of an operator-confirmed recovery.
#[derive(Debug, Clone, PartialEq)]
pub struct RecoveryReport {
    /// State after recovery.
    pub state: ProvisioningState,
    /// What the transition did.
    pub transition: RecoverTransition,
    /// Requeue counts, when the resume pass ran.
    pub resume: Option<ResumeSummary>,
}

/// Application service for the provisioning state singleton.
#[derive(Clone)]
pub struct ProvisioningStateService {
    repository: Arc<dyn ProvisioningStateRepository>,
    notifier: Arc<dyn ProvisioningNotifier>,
    resume_service: ResumeService,
}

impl ProvisioningStateService {
    /// Creates a provisioning state service.
    #[must_use]
    pub fn new(
        repository: Arc<dyn ProvisioningStateRepository>,
        notifier: Arc<dyn ProvisioningNotifier>,
        resume_service: ResumeService,
    ) -> Self {
        Self {
            repository,
            notifier,
            resume_service,
        }
    }

    /// Reads the current state.
    pub async fn current_state(&self) -> AppResult<ProvisioningState> {
        self.repository.load_state().await
    }

    pub(crate) async fn transition_to_degraded(
        &self,
        reason: &str,
        metadata: Value,
        subject: &str,
    ) -> AppResult<DegradeTransition> {
        let (state, transition) = self.repository.degrade(reason, metadata, subject).await?;

        if transition.is_new_incident() {
            tracing::warn!(
                incident_id = %transition.incident_id(),
                reason = %reason,
                "provisioning entered degraded state"
            );

            let alert = OperatorAlert::new(
                AlertUrgency::Critical,
                "Provisioning degraded",
                format!(
                    "Automated provisioning is paused (incident {}). Reason: {}. Submit fresh upstream credentials to recover.",
                    transition.incident_id(),
                    state.reason.as_deref().unwrap_or(reason)
                ),
            );
            if let Err(error) = self.notifier.operator_alert(&alert).await {
                tracing::warn!(error = %error, "failed to send degraded alert");
            }
        } else {
            tracing::debug!(
                incident_id = %transition.incident_id(),
                reason = %reason,
                "provisioning already degraded"
            );
        }

        Ok(transition)
    }

    /// Returns to HEALTHY after a successful credential validation and
    /// requeues pending work.
    pub async fn transition_to_healthy(
        &self,
        proof: &CredentialValidated,
        triggered_by: &OperatorIdentity,
    ) -> AppResult<RecoveryReport> {
        let (state, transition) = self.repository.recover(triggered_by.subject()).await?;

        let incident_id = match transition {
            RecoverTransition::Recovered { incident_id } => {
                tracing::info!(
                    credential_id = %proof.credential_id(),
                    recovered_by = %triggered_by.subject(),
                    "provisioning recovered"
                );
                incident_id
            }
            RecoverTransition::AlreadyHealthy => None,
        };

        let resume = match self
            .resume_service
            .resume_pending(triggered_by.subject(), incident_id)
            .await
        {
            Ok(summary) => Some(summary),
            Err(error) => {
                tracing::error!(error = %error, "failed to resume pending grants after recovery");
                None
            }
        };

        Ok(RecoveryReport {
            state,
            transition,
            resume,
        })
    }
}
