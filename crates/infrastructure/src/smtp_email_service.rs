//! SMTP email delivery for provisioning notifications.

use async_trait::async_trait;
use lettre::message::{Mailbox, MultiPart, header::ContentType};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use grantry_application::EmailService;
use grantry_core::{AppError, AppResult};

/// SMTP connection settings.
#[derive(Clone)]
pub struct SmtpEmailConfig {
    /// SMTP relay hostname.
    pub host: String,
    /// SMTP relay port.
    pub port: u16,
    /// SMTP username.
    pub username: String,
    /// SMTP password.
    pub password: String,
    /// Sender address, e.g. `Grantry <access@example.com>`.
    pub from_address: String,
}

impl std::fmt::Debug for SmtpEmailConfig {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("SmtpEmailConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("from_address", &self.from_address)
            .finish_non_exhaustive()
    }
}

/// Email service that relays through an authenticated SMTP server.
#[derive(Clone)]
pub struct SmtpEmailService {
    from: Mailbox,
    mailer: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpEmailService {
    /// Builds the relay transport and validates the sender address.
    pub fn new(config: SmtpEmailConfig) -> AppResult<Self> {
        let from = config.from_address.parse::<Mailbox>().map_err(|error| {
            AppError::Validation(format!(
                "invalid SMTP_FROM_ADDRESS '{}': {error}",
                config.from_address
            ))
        })?;

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
            .map_err(|error| {
                AppError::Validation(format!(
                    "failed to create SMTP transport for '{}': {error}",
                    config.host
                ))
            })?
            .port(config.port)
            .credentials(Credentials::new(config.username, config.password))
            .build();

        Ok(Self { from, mailer })
    }
}

#[async_trait]
impl EmailService for SmtpEmailService {
    async fn send_email(
        &self,
        to: &str,
        subject: &str,
        text_body: &str,
        html_body: Option<&str>,
    ) -> AppResult<()> {
        let recipient = to.parse::<Mailbox>().map_err(|error| {
            AppError::Validation(format!("invalid recipient address '{to}': {error}"))
        })?;

        let builder = Message::builder()
            .from(self.from.clone())
            .to(recipient)
            .subject(subject);

        let message = match html_body {
            Some(html_body) => builder.multipart(MultiPart::alternative_plain_html(
                text_body.to_owned(),
                html_body.to_owned(),
            )),
            None => builder
                .header(ContentType::TEXT_PLAIN)
                .body(text_body.to_owned()),
        }
        .map_err(|error| AppError::Internal(format!("failed to build email: {error}")))?;

        self.mailer
            .send(message)
            .await
            .map_err(|error| AppError::Internal(format!("failed to send email to '{to}': {error}")))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{SmtpEmailConfig, SmtpEmailService};

    fn config(from_address: &str) -> SmtpEmailConfig {
        SmtpEmailConfig {
            host: "smtp.example.com".to_owned(),
            port: 587,
            username: "mailer".to_owned(),
            password: "secret".to_owned(),
            from_address: from_address.to_owned(),
        }
    }

    #[test]
    fn rejects_invalid_sender() {
        assert!(SmtpEmailService::new(config("not an address")).is_err());
    }

    #[test]
    fn debug_output_hides_credentials() {
        let rendered = format!("{:?}", config("Grantry <access@example.com>"));
        assert!(!rendered.contains("secret"));
        assert!(rendered.contains("smtp.example.com"));
    }
}
