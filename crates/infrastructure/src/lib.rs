//! Infrastructure adapters for application ports.

#![forbid(unsafe_code)]

mod aes_secret_encryptor;
mod browser_automation_provider;
mod console_email_service;
mod email_provisioning_notifier;
mod http_access_provider;
mod http_credential_validator;
mod in_memory_provisioning_stats_cache;
mod postgres_access_grant_repository;
mod postgres_audit_repository;
mod postgres_credential_repository;
mod postgres_fanout_repository;
mod postgres_manual_task_repository;
mod postgres_provisioning_job_queue;
mod postgres_provisioning_state_repository;
mod redis_provisioning_stats_cache;
mod smtp_email_service;
mod upstream_http;

#[cfg(test)]
mod postgres_test_support;

pub use aes_secret_encryptor::AesSecretEncryptor;
pub use browser_automation_provider::BrowserAutomationProvider;
pub use console_email_service::ConsoleEmailService;
pub use email_provisioning_notifier::EmailProvisioningNotifier;
pub use http_access_provider::HttpAccessProvider;
pub use http_credential_validator::HttpCredentialValidator;
pub use in_memory_provisioning_stats_cache::InMemoryProvisioningStatsCache;
pub use postgres_access_grant_repository::PostgresAccessGrantRepository;
pub use postgres_audit_repository::PostgresAuditRepository;
pub use postgres_credential_repository::PostgresCredentialRepository;
pub use postgres_fanout_repository::PostgresFanoutRepository;
pub use postgres_manual_task_repository::PostgresManualTaskRepository;
pub use postgres_provisioning_job_queue::PostgresProvisioningJobQueue;
pub use postgres_provisioning_state_repository::PostgresProvisioningStateRepository;
pub use redis_provisioning_stats_cache::RedisProvisioningStatsCache;
pub use smtp_email_service::{SmtpEmailConfig, SmtpEmailService};
pub use upstream_http::build_upstream_http_client;
