use std::sync::Arc;

use grantry_application::{
    CredentialService, ManualAccessProvider, ManualTaskService, ProviderSelector,
    ProvisioningJobService, ProvisioningNotifier, ProvisioningStateService, ResumeService,
};
use grantry_core::AppResult;
use grantry_domain::RetryPolicy;
use grantry_infrastructure::{
    AesSecretEncryptor, BrowserAutomationProvider, EmailProvisioningNotifier,
    HttpAccessProvider, HttpCredentialValidator, build_upstream_http_client,
};

use crate::api_config::ApiConfig;

use super::super::email::build_email_service;
use super::repositories::RepositorySet;

pub(super) struct ProvisioningServices {
    pub(super) state_service: ProvisioningStateService,
    pub(super) credential_service: CredentialService,
    pub(super) manual_task_service: ManualTaskService,
    pub(super) job_service: ProvisioningJobService,
}

pub(super) fn build_provisioning_services(
    config: &ApiConfig,
    repositories: &RepositorySet,
) -> AppResult<ProvisioningServices> {
    let notifier: Arc<dyn ProvisioningNotifier> = Arc::new(EmailProvisioningNotifier::new(
        build_email_service(config)?,
        config.operator_email.clone(),
    ));
    let retry_policy = RetryPolicy::with_max_attempts(config.max_attempts);

    let resume_service = ResumeService::new(
        repositories.access_grant_repository.clone(),
        repositories.job_queue.clone(),
        repositories.audit_repository.clone(),
        retry_policy,
    );
    let state_service = ProvisioningStateService::new(
        repositories.state_repository.clone(),
        notifier.clone(),
        resume_service,
    );

    let http_client = build_upstream_http_client(config.upstream.timeout)?;
    let mut credential_service = CredentialService::new(
        repositories.credential_repository.clone(),
        Arc::new(AesSecretEncryptor::from_hex(
            config.credential_encryption_key.as_str(),
        )?),
        Arc::new(HttpCredentialValidator::new(http_client.clone())),
        repositories.audit_repository.clone(),
        state_service.clone(),
        config.upstream.api_url.clone(),
    );
    if let Some(session) = config.upstream.environment_session.clone() {
        credential_service = credential_service.with_environment_session(session);
    }

    let manual_task_service = ManualTaskService::new(
        repositories.manual_task_repository.clone(),
        repositories.access_grant_repository.clone(),
        notifier.clone(),
    );
    let provider_selector = ProviderSelector::new(
        Arc::new(ManualAccessProvider::new(manual_task_service.clone())),
        config.primary_provider,
        config.fallback_provider,
    )
    .with_provider(Arc::new(HttpAccessProvider::new(
        http_client,
        Arc::new(credential_service.clone()),
    )))
    .with_provider(Arc::new(BrowserAutomationProvider::new()));

    let job_service = ProvisioningJobService::new(
        repositories.access_grant_repository.clone(),
        repositories.job_queue.clone(),
        notifier,
        state_service.clone(),
        manual_task_service.clone(),
        provider_selector,
    )
    .with_retry_policy(retry_policy);

    Ok(ProvisioningServices {
        state_service,
        credential_service,
        manual_task_service,
        job_service,
    })
}
