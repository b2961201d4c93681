use super::*;

impl ProvisioningJobService {
    /// Resets a FAILED (or stuck PENDING) grant and enqueues a fresh job.
    pub async fn retry_grant(
        &self,
        actor: &OperatorIdentity,
        grant_id: AccessGrantId,
    ) -> AppResult<JobId> {
        let mut grant = self.find_grant(grant_id).await?;
        let previous_status = grant.status();
        grant.reset_for_retry()?;

        self.grant_repository
            .save_grant(
                &grant,
                Some(
                    AuditEvent::new(
                        actor.subject(),
                        AuditAction::AccessGrantRetryRequested,
                        "access_grant",
                        grant_id,
                    )
                    .with_detail(json!({ "previous_status": previous_status.as_str() })),
                ),
            )
            .await?;

        let job_id = self
            .job_queue
            .enqueue(EnqueueProvisioningJob {
                access_grant_id: grant_id,
                action: ProvisioningAction::Grant,
                delay: std::time::Duration::ZERO,
            })
            .await?;

        tracing::info!(
            grant_id = %grant_id,
            job_id = %job_id,
            operator = %actor.subject(),
            "access grant requeued by operator"
        );

        Ok(job_id)
    }

    /// Enqueues a revoke job for a GRANTED grant.
    pub async fn request_revoke(
        &self,
        actor: &OperatorIdentity,
        grant_id: AccessGrantId,
    ) -> AppResult<JobId> {
        let grant = self.find_grant(grant_id).await?;
        if grant.status() != AccessGrantStatus::Granted {
            return Err(AppError::Conflict(format!(
                "access grant '{grant_id}' cannot be revoked from status '{}'",
                grant.status().as_str()
            )));
        }

        self.grant_repository
            .save_grant(
                &grant,
                Some(AuditEvent::new(
                    actor.subject(),
                    AuditAction::AccessGrantRevokeRequested,
                    "access_grant",
                    grant_id,
                )),
            )
            .await?;

        let job_id = self
            .job_queue
            .enqueue(EnqueueProvisioningJob {
                access_grant_id: grant_id,
                action: ProvisioningAction::Revoke,
                delay: std::time::Duration::ZERO,
            })
            .await?;

        tracing::info!(
            grant_id = %grant_id,
            job_id = %job_id,
            operator = %actor.subject(),
            "access revocation requested"
        );

        Ok(job_id)
    }

    async fn find_grant(&self, grant_id: AccessGrantId) -> AppResult<AccessGrant> {
        self.grant_repository
            .find_grant(grant_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("access grant '{grant_id}' not found")))
    }
}
