use std::sync::Arc;

use async_trait::async_trait;
use grantry_application::{AccessNotice, EmailService, OperatorAlert, ProvisioningNotifier};
use grantry_core::AppResult;

/// Provisioning notifier that sends plain-text emails.
///
/// Customer notices go to the address on the grant's user; operator alerts go
/// to one configured operator inbox. Missing recipients are logged and
/// skipped.
#[derive(Clone)]
pub struct EmailProvisioningNotifier {
    email_service: Arc<dyn EmailService>,
    operator_email: Option<String>,
}

impl EmailProvisioningNotifier {
    /// Creates a notifier over an email transport.
    #[must_use]
    pub fn new(email_service: Arc<dyn EmailService>, operator_email: Option<String>) -> Self {
        Self {
            email_service,
            operator_email: operator_email.filter(|address| !address.trim().is_empty()),
        }
    }

    async fn send_customer_notice(
        &self,
        notice: &AccessNotice,
        subject: &str,
        text_body: String,
    ) -> AppResult<()> {
        let Some(email) = notice.email.as_deref() else {
            tracing::warn!(
                user_id = %notice.user_id,
                grant_id = %notice.access_grant_id,
                "customer has no email address, skipping access notice"
            );
            return Ok(());
        };

        self.email_service
            .send_email(email, subject, text_body.as_str(), None)
            .await
    }
}

#[async_trait]
impl ProvisioningNotifier for EmailProvisioningNotifier {
    async fn access_granted(&self, notice: &AccessNotice) -> AppResult<()> {
        let subject = format!("Your access to {} is ready", notice.resource_name);
        let body = format!(
            "Your access to {} has been activated. It may take a few minutes to appear in your account.",
            notice.resource_name
        );
        self.send_customer_notice(notice, subject.as_str(), body).await
    }

    async fn access_failed(&self, notice: &AccessNotice) -> AppResult<()> {
        let subject = format!("We could not activate {}", notice.resource_name);
        let mut body = format!(
            "We were unable to activate your access to {}. Our team has been notified and will follow up.",
            notice.resource_name
        );
        if let Some(reason) = notice.reason.as_deref() {
            body.push_str("\n\nReason: ");
            body.push_str(reason);
        }
        self.send_customer_notice(notice, subject.as_str(), body).await
    }

    async fn operator_alert(&self, alert: &OperatorAlert) -> AppResult<()> {
        let Some(operator_email) = self.operator_email.as_deref() else {
            tracing::warn!(
                urgency = alert.urgency.as_str(),
                subject = %alert.subject,
                "OPERATOR_EMAIL is not set, operator alert only logged"
            );
            return Ok(());
        };

        let subject = format!(
            "[{}] {}",
            alert.urgency.as_str().to_uppercase(),
            alert.subject
        );
        self.email_service
            .send_email(operator_email, subject.as_str(), alert.body.as_str(), None)
            .await
    }
}
