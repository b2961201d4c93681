use std::sync::Arc;

use grantry_infrastructure::{
    PostgresAccessGrantRepository, PostgresAuditRepository, PostgresCredentialRepository,
    PostgresFanoutRepository, PostgresManualTaskRepository, PostgresProvisioningJobQueue,
    PostgresProvisioningStateRepository,
};
use sqlx::PgPool;

pub(super) struct RepositorySet {
    pub(super) access_grant_repository: Arc<PostgresAccessGrantRepository>,
    pub(super) audit_repository: Arc<PostgresAuditRepository>,
    pub(super) credential_repository: Arc<PostgresCredentialRepository>,
    pub(super) fanout_repository: Arc<PostgresFanoutRepository>,
    pub(super) manual_task_repository: Arc<PostgresManualTaskRepository>,
    pub(super) job_queue: Arc<PostgresProvisioningJobQueue>,
    pub(super) state_repository: Arc<PostgresProvisioningStateRepository>,
}

pub(super) fn build_repository_set(pool: &PgPool) -> RepositorySet {
    RepositorySet {
        access_grant_repository: Arc::new(PostgresAccessGrantRepository::new(pool.clone())),
        audit_repository: Arc::new(PostgresAuditRepository::new(pool.clone())),
        credential_repository: Arc::new(PostgresCredentialRepository::new(pool.clone())),
        fanout_repository: Arc::new(PostgresFanoutRepository::new(pool.clone())),
        manual_task_repository: Arc::new(PostgresManualTaskRepository::new(pool.clone())),
        job_queue: Arc::new(PostgresProvisioningJobQueue::new(pool.clone())),
        state_repository: Arc::new(PostgresProvisioningStateRepository::new(pool.clone())),
    }
}
