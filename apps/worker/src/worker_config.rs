use std::env;
use std::time::Duration;

use grantry_application::{PrimaryProviderSetting, ProviderKind, UpstreamSession};
use grantry_core::{AppError, AppResult};

#[derive(Debug, Clone)]
pub struct SmtpRuntimeConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from_address: String,
}

#[derive(Debug, Clone)]
pub enum EmailProviderConfig {
    Console,
    Smtp(SmtpRuntimeConfig),
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub database_url: String,
    pub credential_encryption_key: String,
    pub upstream_api_url: String,
    pub environment_session: Option<UpstreamSession>,
    pub upstream_timeout: Duration,
    pub primary_provider: PrimaryProviderSetting,
    pub fallback_provider: ProviderKind,
    pub max_attempts: u32,
    pub email_provider: EmailProviderConfig,
    pub operator_email: Option<String>,
    pub worker_id: String,
    pub claim_limit: usize,
    pub lease_seconds: u32,
    pub poll_interval: Duration,
}

impl WorkerConfig {
    pub fn load() -> AppResult<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> AppResult<Self> {
        let optional = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
        };
        let required = |name: &str| {
            optional(name).ok_or_else(|| AppError::Validation(format!("{name} is required")))
        };

        let database_url = required("DATABASE_URL")?;
        let credential_encryption_key = required("CREDENTIAL_ENCRYPTION_KEY")?;
        let upstream_api_url = required("UPSTREAM_API_URL")?;
        let environment_session = match (
            optional("UPSTREAM_SESSION_ID"),
            optional("UPSTREAM_SESSION_SIGNATURE"),
        ) {
            (Some(session_id), Some(session_signature)) => Some(UpstreamSession {
                api_url: upstream_api_url.clone(),
                session_id,
                session_signature,
            }),
            (None, None) => None,
            _ => {
                return Err(AppError::Validation(
                    "UPSTREAM_SESSION_ID and UPSTREAM_SESSION_SIGNATURE must be set together"
                        .to_owned(),
                ));
            }
        };
        let upstream_timeout_seconds =
            parse_u32("UPSTREAM_TIMEOUT_SECONDS", optional("UPSTREAM_TIMEOUT_SECONDS"), 30)?;

        let primary_provider = PrimaryProviderSetting::parse(
            optional("PROVISIONING_PRIMARY_PROVIDER")
                .unwrap_or_else(|| "auto".to_owned())
                .as_str(),
        )
        .map_err(|error| {
            AppError::Validation(format!("invalid PROVISIONING_PRIMARY_PROVIDER: {error}"))
        })?;
        let fallback_provider = ProviderKind::parse(
            optional("PROVISIONING_FALLBACK_PROVIDER")
                .unwrap_or_else(|| "manual".to_owned())
                .as_str(),
        )
        .map_err(|error| {
            AppError::Validation(format!("invalid PROVISIONING_FALLBACK_PROVIDER: {error}"))
        })?;
        let max_attempts =
            parse_u32("PROVISIONING_MAX_ATTEMPTS", optional("PROVISIONING_MAX_ATTEMPTS"), 5)?;

        let email_provider = match optional("EMAIL_PROVIDER")
            .unwrap_or_else(|| "console".to_owned())
            .as_str()
        {
            "console" => EmailProviderConfig::Console,
            "smtp" => {
                let port = required("SMTP_PORT")?
                    .parse::<u16>()
                    .map_err(|error| AppError::Validation(format!("invalid SMTP_PORT: {error}")))?;
                EmailProviderConfig::Smtp(SmtpRuntimeConfig {
                    host: required("SMTP_HOST")?,
                    port,
                    username: required("SMTP_USERNAME")?,
                    password: required("SMTP_PASSWORD")?,
                    from_address: required("SMTP_FROM_ADDRESS")?,
                })
            }
            other => {
                return Err(AppError::Validation(format!(
                    "EMAIL_PROVIDER must be either 'console' or 'smtp', got '{other}'"
                )));
            }
        };

        let worker_id = optional("WORKER_ID")
            .unwrap_or_else(|| format!("worker-{}", std::process::id()));
        let claim_limit = optional("WORKER_CLAIM_LIMIT")
            .map(|value| {
                value.parse::<usize>().map_err(|error| {
                    AppError::Validation(format!("invalid WORKER_CLAIM_LIMIT: {error}"))
                })
            })
            .transpose()?
            .unwrap_or(10);
        let lease_seconds = parse_u32("WORKER_LEASE_SECONDS", optional("WORKER_LEASE_SECONDS"), 120)?;
        let poll_interval_ms =
            parse_u32("WORKER_POLL_INTERVAL_MS", optional("WORKER_POLL_INTERVAL_MS"), 1500)?;

        for (name, value) in [
            ("UPSTREAM_TIMEOUT_SECONDS", upstream_timeout_seconds),
            ("PROVISIONING_MAX_ATTEMPTS", max_attempts),
            ("WORKER_LEASE_SECONDS", lease_seconds),
            ("WORKER_POLL_INTERVAL_MS", poll_interval_ms),
        ] {
            if value == 0 {
                return Err(AppError::Validation(format!(
                    "{name} must be greater than zero"
                )));
            }
        }

        if claim_limit == 0 {
            return Err(AppError::Validation(
                "WORKER_CLAIM_LIMIT must be greater than zero".to_owned(),
            ));
        }

        if lease_seconds <= upstream_timeout_seconds {
            return Err(AppError::Validation(format!(
                "WORKER_LEASE_SECONDS ({lease_seconds}) must exceed UPSTREAM_TIMEOUT_SECONDS ({upstream_timeout_seconds})"
            )));
        }

        Ok(Self {
            database_url,
            credential_encryption_key,
            upstream_api_url,
            environment_session,
            upstream_timeout: Duration::from_secs(u64::from(upstream_timeout_seconds)),
            primary_provider,
            fallback_provider,
            max_attempts,
            email_provider,
            operator_email: optional("OPERATOR_EMAIL"),
            worker_id,
            claim_limit,
            lease_seconds,
            poll_interval: Duration::from_millis(u64::from(poll_interval_ms)),
        })
    }
}

fn parse_u32(name: &str, value: Option<String>, default: u32) -> AppResult<u32> {
    value
        .map(|value| {
            value
                .parse::<u32>()
                .map_err(|error| AppError::Validation(format!("invalid {name}: {error}")))
        })
        .transpose()
        .map(|parsed| parsed.unwrap_or(default))
}
