use async_trait::async_trait;
use grantry_core::AppResult;
use grantry_domain::{AccessGrantId, UserId};

/// Operator alert urgency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AlertUrgency {
    /// Informational, e.g. a manual task was created.
    Info,
    /// Repeated failures on one grant.
    Warning,
    /// A grant failed or a provisioning incident started.
    Critical,
}

impl AlertUrgency {
    /// Returns stable transport value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Critical => "critical",
        }
    }
}

/// Operator-facing alert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorAlert {
    /// Urgency tier.
    pub urgency: AlertUrgency,
    /// One-line summary.
    pub subject: String,
    /// Details.
    pub body: String,
}

impl OperatorAlert {
    /// Creates an alert.
    #[must_use]
    pub fn new(urgency: AlertUrgency, subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            urgency,
            subject: subject.into(),
            body: body.into(),
        }
    }
}

/// Customer-facing access notice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessNotice {
    /// Customer.
    pub user_id: UserId,
    /// Customer email, when known.
    pub email: Option<String>,
    /// Grant the notice is about.
    pub access_grant_id: AccessGrantId,
    /// Resource display name.
    pub resource_name: String,
    /// Failure reason for failure notices.
    pub reason: Option<String>,
}

/// Port for provisioning notifications.
///
/// Notification failures are logged by callers and never change grant state.
#[async_trait]
pub trait ProvisioningNotifier: Send + Sync {
    /// Tells a customer their access is live.
    async fn access_granted(&self, notice: &AccessNotice) -> AppResult<()>;

    /// Tells a customer their access could not be provisioned.
    async fn access_failed(&self, notice: &AccessNotice) -> AppResult<()>;

    /// Alerts operators.
    async fn operator_alert(&self, alert: &OperatorAlert) -> AppResult<()>;
}

/// Port for sending emails. Infrastructure provides SMTP or console implementations.
#[async_trait]
pub trait EmailService: Send + Sync {
    /// Sends a plain-text or HTML email.
    async fn send_email(
        &self,
        to: &str,
        subject: &str,
        text_body: &str,
        html_body: Option<&str>,
    ) -> AppResult<()>;
}
