use std::env;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use grantry_application::{PrimaryProviderSetting, ProviderKind, UpstreamSession};
use grantry_core::AppError;
use tracing_subscriber::EnvFilter;

const MIN_ADMIN_TOKEN_LENGTH: usize = 32;

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
pub struct UpstreamConfig {
    pub api_url: String,
    pub environment_session: Option<UpstreamSession>,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub migrate_only: bool,
    pub database_url: String,
    pub credential_encryption_key: String,
    pub upstream: UpstreamConfig,
    pub primary_provider: PrimaryProviderSetting,
    pub fallback_provider: ProviderKind,
    pub max_attempts: u32,
    pub email_provider: EmailProviderConfig,
    pub operator_email: Option<String>,
    pub api_host: String,
    pub api_port: u16,
    pub admin_api_token: String,
    pub payment_webhook_secret: String,
    pub redis_url: Option<String>,
    pub status_cache_ttl_seconds: u32,
    pub frontend_url: String,
}

impl ApiConfig {
    pub fn load() -> Result<Self, AppError> {
        let migrate_only = env::args().nth(1).as_deref() == Some("migrate");
        let mut config = Self::from_lookup(|name| env::var(name).ok())?;
        config.migrate_only = migrate_only;

        Ok(config)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let env = EnvReader { lookup: &lookup };

        let database_url = env.required("DATABASE_URL")?;
        let credential_encryption_key = env.required_non_empty("CREDENTIAL_ENCRYPTION_KEY")?;
        let upstream_api_url = env.required_non_empty("UPSTREAM_API_URL")?;
        let upstream_timeout_seconds = env.parse_u32("UPSTREAM_TIMEOUT_SECONDS", 30)?;
        if upstream_timeout_seconds == 0 {
            return Err(AppError::Validation(
                "UPSTREAM_TIMEOUT_SECONDS must be greater than zero".to_owned(),
            ));
        }
        let upstream = UpstreamConfig {
            environment_session: env.environment_session(upstream_api_url.as_str())?,
            api_url: upstream_api_url,
            timeout: Duration::from_secs(u64::from(upstream_timeout_seconds)),
        };

        let primary_provider = PrimaryProviderSetting::parse(
            env.optional("PROVISIONING_PRIMARY_PROVIDER")
                .unwrap_or_else(|| "auto".to_owned())
                .as_str(),
        )
        .map_err(|error| {
            AppError::Validation(format!("invalid PROVISIONING_PRIMARY_PROVIDER: {error}"))
        })?;
        let fallback_provider = ProviderKind::parse(
            env.optional("PROVISIONING_FALLBACK_PROVIDER")
                .unwrap_or_else(|| "manual".to_owned())
                .as_str(),
        )
        .map_err(|error| {
            AppError::Validation(format!("invalid PROVISIONING_FALLBACK_PROVIDER: {error}"))
        })?;
        let max_attempts = env.parse_u32("PROVISIONING_MAX_ATTEMPTS", 5)?;
        if max_attempts == 0 {
            return Err(AppError::Validation(
                "PROVISIONING_MAX_ATTEMPTS must be greater than zero".to_owned(),
            ));
        }

        let email_provider = match env
            .optional("EMAIL_PROVIDER")
            .unwrap_or_else(|| "console".to_owned())
            .as_str()
        {
            "console" => EmailProviderConfig::Console,
            "smtp" => {
                let port = env
                    .required_non_empty("SMTP_PORT")?
                    .parse::<u16>()
                    .map_err(|error| AppError::Validation(format!("invalid SMTP_PORT: {error}")))?;
                EmailProviderConfig::Smtp(SmtpRuntimeConfig {
                    host: env.required_non_empty("SMTP_HOST")?,
                    port,
                    username: env.required_non_empty("SMTP_USERNAME")?,
                    password: env.required_non_empty("SMTP_PASSWORD")?,
                    from_address: env.required_non_empty("SMTP_FROM_ADDRESS")?,
                })
            }
            other => {
                return Err(AppError::Validation(format!(
                    "EMAIL_PROVIDER must be either 'console' or 'smtp', got '{other}'"
                )));
            }
        };

        let api_host = env
            .optional("API_HOST")
            .unwrap_or_else(|| "127.0.0.1".to_owned());
        let api_port = env
            .optional("API_PORT")
            .and_then(|value| value.parse::<u16>().ok())
            .unwrap_or(3001);

        let admin_api_token = env.required("ADMIN_API_TOKEN")?;
        if admin_api_token.trim().len() < MIN_ADMIN_TOKEN_LENGTH {
            return Err(AppError::Validation(format!(
                "ADMIN_API_TOKEN must be at least {MIN_ADMIN_TOKEN_LENGTH} characters"
            )));
        }

        Ok(Self {
            migrate_only: false,
            database_url,
            credential_encryption_key,
            upstream,
            primary_provider,
            fallback_provider,
            max_attempts,
            email_provider,
            operator_email: env.optional("OPERATOR_EMAIL"),
            api_host,
            api_port,
            admin_api_token: admin_api_token.trim().to_owned(),
            payment_webhook_secret: env.required_non_empty("PAYMENT_WEBHOOK_SECRET")?,
            redis_url: env.optional("REDIS_URL"),
            status_cache_ttl_seconds: env.parse_u32("STATUS_CACHE_TTL_SECONDS", 5)?,
            frontend_url: env
                .optional("FRONTEND_URL")
                .unwrap_or_else(|| "http://localhost:3000".to_owned()),
        })
    }

    pub fn socket_address(&self) -> Result<SocketAddr, AppError> {
        let host = IpAddr::from_str(&self.api_host).map_err(|error| {
            AppError::Internal(format!("invalid API_HOST '{}': {error}", self.api_host))
        })?;
        Ok(SocketAddr::from((host, self.api_port)))
    }
}

pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

struct EnvReader<'a, F> {
    lookup: &'a F,
}

impl<F: Fn(&str) -> Option<String>> EnvReader<'_, F> {
    fn optional(&self, name: &str) -> Option<String> {
        (self.lookup)(name)
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty())
    }

    fn required(&self, name: &str) -> Result<String, AppError> {
        (self.lookup)(name).ok_or_else(|| AppError::Validation(format!("{name} is required")))
    }

    fn required_non_empty(&self, name: &str) -> Result<String, AppError> {
        let value = self.required(name)?;
        if value.trim().is_empty() {
            return Err(AppError::Validation(format!("{name} must not be empty")));
        }

        Ok(value)
    }

    fn parse_u32(&self, name: &str, default: u32) -> Result<u32, AppError> {
        match self.optional(name) {
            Some(value) => value
                .parse::<u32>()
                .map_err(|error| AppError::Validation(format!("invalid {name}: {error}"))),
            None => Ok(default),
        }
    }

    fn environment_session(&self, api_url: &str) -> Result<Option<UpstreamSession>, AppError> {
        match (
            self.optional("UPSTREAM_SESSION_ID"),
            self.optional("UPSTREAM_SESSION_SIGNATURE"),
        ) {
            (Some(session_id), Some(session_signature)) => Ok(Some(UpstreamSession {
                api_url: api_url.to_owned(),
                session_id,
                session_signature,
            })),
            (None, None) => Ok(None),
            _ => Err(AppError::Validation(
                "UPSTREAM_SESSION_ID and UPSTREAM_SESSION_SIGNATURE must be set together"
                    .to_owned(),
            )),
        }
    }
}
