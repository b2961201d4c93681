//! Email service for local development. Emails go to the tracing output.

use async_trait::async_trait;
use grantry_application::EmailService;
use grantry_core::AppResult;
use tracing::info;

/// Logs outgoing emails instead of sending them.
#[derive(Clone, Default)]
pub struct ConsoleEmailService;

impl ConsoleEmailService {
    /// Creates a new console email service.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl EmailService for ConsoleEmailService {
    async fn send_email(
        &self,
        to: &str,
        subject: &str,
        text_body: &str,
        html_body: Option<&str>,
    ) -> AppResult<()> {
        info!(
            to,
            subject,
            has_html = html_body.is_some(),
            body = text_body,
            "email (console delivery)"
        );

        Ok(())
    }
}
