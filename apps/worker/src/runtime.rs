use std::sync::Arc;

use grantry_application::{
    CredentialService, EmailService, ManualAccessProvider, ManualTaskService, ProviderSelector,
    ProvisioningJobService, ProvisioningNotifier, ProvisioningStateService, ResumeService,
};
use grantry_core::AppResult;
use grantry_domain::RetryPolicy;
use grantry_infrastructure::{
    AesSecretEncryptor, BrowserAutomationProvider, ConsoleEmailService,
    EmailProvisioningNotifier, HttpAccessProvider, HttpCredentialValidator,
    PostgresAccessGrantRepository, PostgresAuditRepository, PostgresCredentialRepository,
    PostgresManualTaskRepository, PostgresProvisioningJobQueue,
    PostgresProvisioningStateRepository, SmtpEmailConfig, SmtpEmailService,
    build_upstream_http_client,
};
use sqlx::PgPool;

use crate::worker_config::{EmailProviderConfig, WorkerConfig};

/// Builds the job processor with the same provider chain as the API.
pub fn build_job_service(pool: PgPool, config: &WorkerConfig) -> AppResult<ProvisioningJobService> {
    let grant_repository = Arc::new(PostgresAccessGrantRepository::new(pool.clone()));
    let job_queue = Arc::new(PostgresProvisioningJobQueue::new(pool.clone()));
    let audit_repository = Arc::new(PostgresAuditRepository::new(pool.clone()));
    let notifier: Arc<dyn ProvisioningNotifier> = Arc::new(EmailProvisioningNotifier::new(
        build_email_service(config)?,
        config.operator_email.clone(),
    ));
    let retry_policy = RetryPolicy::with_max_attempts(config.max_attempts);

    let state_service = ProvisioningStateService::new(
        Arc::new(PostgresProvisioningStateRepository::new(pool.clone())),
        notifier.clone(),
        ResumeService::new(
            grant_repository.clone(),
            job_queue.clone(),
            audit_repository.clone(),
            retry_policy,
        ),
    );

    let http_client = build_upstream_http_client(config.upstream_timeout)?;
    let mut credential_service = CredentialService::new(
        Arc::new(PostgresCredentialRepository::new(pool.clone())),
        Arc::new(AesSecretEncryptor::from_hex(
            config.credential_encryption_key.as_str(),
        )?),
        Arc::new(HttpCredentialValidator::new(http_client.clone())),
        audit_repository,
        state_service.clone(),
        config.upstream_api_url.clone(),
    );
    if let Some(session) = config.environment_session.clone() {
        credential_service = credential_service.with_environment_session(session);
    }

    let manual_task_service = ManualTaskService::new(
        Arc::new(PostgresManualTaskRepository::new(pool)),
        grant_repository.clone(),
        notifier.clone(),
    );
    let provider_selector = ProviderSelector::new(
        Arc::new(ManualAccessProvider::new(manual_task_service.clone())),
        config.primary_provider,
        config.fallback_provider,
    )
    .with_provider(Arc::new(HttpAccessProvider::new(
        http_client,
        Arc::new(credential_service),
    )))
    .with_provider(Arc::new(BrowserAutomationProvider::new()));

    Ok(ProvisioningJobService::new(
        grant_repository,
        job_queue,
        notifier,
        state_service,
        manual_task_service,
        provider_selector,
    )
    .with_retry_policy(retry_policy))
}

fn build_email_service(config: &WorkerConfig) -> AppResult<Arc<dyn EmailService>> {
    let service: Arc<dyn EmailService> = match &config.email_provider {
        EmailProviderConfig::Console => Arc::new(ConsoleEmailService::new()),
        EmailProviderConfig::Smtp(smtp) => Arc::new(SmtpEmailService::new(SmtpEmailConfig {
            host: smtp.host.clone(),
            port: smtp.port,
            username: smtp.username.clone(),
            password: smtp.password.clone(),
            from_address: smtp.from_address.clone(),
        })?),
    };

    Ok(service)
}
