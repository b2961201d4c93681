use super::*;

impl ProvisioningJobService {
    /// Claims due jobs for one worker.
    pub async fn claim_jobs_for_worker(
        &self,
        worker_id: &str,
        limit: usize,
        lease_seconds: u32,
    ) -> AppResult<Vec<ClaimedProvisioningJob>> {
        if worker_id.trim().is_empty() {
            return Err(AppError::Validation(
                "worker_id must not be empty".to_owned(),
            ));
        }

        if limit == 0 {
            return Err(AppError::Validation(
                "limit must be greater than zero".to_owned(),
            ));
        }

        if lease_seconds == 0 {
            return Err(AppError::Validation(
                "lease_seconds must be greater than zero".to_owned(),
            ));
        }

        self.job_queue
            .claim_jobs(worker_id, limit, lease_seconds)
            .await
    }

    /// Processes one claimed job and finalizes its queue state.
    pub async fn execute_claimed_job(
        &self,
        worker_id: &str,
        job: ClaimedProvisioningJob,
    ) -> AppResult<JobDisposition> {
        if worker_id.trim().is_empty() {
            return Err(AppError::Validation(
                "worker_id must not be empty".to_owned(),
            ));
        }

        if job.lease_token.trim().is_empty() {
            return Err(AppError::Validation(
                "claimed provisioning job lease_token must not be empty".to_owned(),
            ));
        }

        let job_id = job.job_id;
        let lease_token = job.lease_token.as_str();

        match self.process_job(&job).await {
            Ok(disposition) => {
                match disposition {
                    JobDisposition::Completed => {
                        self.job_queue
                            .complete_job(job_id, worker_id, lease_token)
                            .await?
                    }
                    JobDisposition::Retry { delay } => {
                        self.job_queue
                            .retry_job(job_id, worker_id, lease_token, delay, "retryable failure")
                            .await?
                    }
                    JobDisposition::Defer { delay } => {
                        self.job_queue
                            .defer_job(job_id, worker_id, lease_token, delay, "provisioning degraded")
                            .await?
                    }
                    JobDisposition::Failed => {
                        self.job_queue
                            .fail_job(job_id, worker_id, lease_token, "provisioning failed")
                            .await?
                    }
                }

                Ok(disposition)
            }
            Err(error) => {
                let delay = self
                    .retry_policy
                    .retry_delay(job.attempts.saturating_add(1));
                let error_message = error.to_string();
                if let Err(mark_error) = self
                    .job_queue
                    .retry_job(job_id, worker_id, lease_token, delay, error_message.as_str())
                    .await
                {
                    return Err(AppError::Internal(format!(
                        "failed to process provisioning job '{job_id}': {error}; additionally failed to reschedule queue job: {mark_error}"
                    )));
                }

                Err(error)
            }
        }
    }

    /// Processes one job without touching queue state.
    pub async fn process_job(&self, job: &ClaimedProvisioningJob) -> AppResult<JobDisposition> {
        let Some(target) = self
            .grant_repository
            .find_grant_target(job.access_grant_id)
            .await?
        else {
            tracing::warn!(
                job_id = %job.job_id,
                grant_id = %job.access_grant_id,
                "provisioning job references a missing access grant"
            );
            return Ok(JobDisposition::Completed);
        };

        if target.grant.job_id() != Some(job.job_id) {
            tracing::debug!(
                job_id = %job.job_id,
                grant_id = %job.access_grant_id,
                "skipping superseded provisioning job"
            );
            return Ok(JobDisposition::Completed);
        }

        match job.action {
            ProvisioningAction::Grant => self.process_grant(job, target).await,
            ProvisioningAction::Revoke => self.process_revoke(job, target).await,
        }
    }

    async fn process_grant(
        &self,
        job: &ClaimedProvisioningJob,
        mut target: GrantTarget,
    ) -> AppResult<JobDisposition> {
        let grant_id = target.grant.id();
        if !target.grant.is_pending() {
            tracing::debug!(
                grant_id = %grant_id,
                status = target.grant.status().as_str(),
                "access grant is no longer pending"
            );
            return Ok(JobDisposition::Completed);
        }

        if self
            .manual_task_service
            .is_awaiting_manual(grant_id, ManualTaskType::Grant)
            .await?
        {
            tracing::debug!(grant_id = %grant_id, "access grant is awaiting manual provisioning");
            return Ok(JobDisposition::Completed);
        }

        let state = self.state_service.current_state().await?;
        if state.is_degraded() {
            let reason = format!(
                "provisioning degraded: {}",
                state.reason.as_deref().unwrap_or("upstream unavailable")
            );
            return self.defer_grant(job, &mut target.grant, reason).await;
        }

        let Some(username) = usable_username(&target) else {
            return self
                .fail_grant(job, target, "missing upstream username".to_owned())
                .await;
        };

        if !target.resource.auto_provisioning_enabled {
            return self
                .hand_off_grant(
                    job,
                    target,
                    username,
                    ManualTaskOrigin::AutoProvisioningDisabled,
                )
                .await;
        }

        let validation = self
            .run_provider(job, ProviderOperation::ValidateUsername(username.as_str()))
            .await;
        if validation != ProviderOutcome::Succeeded {
            return self.apply_grant_outcome(job, target, validation).await;
        }

        let request = ProvisioningRequest {
            access_grant_id: grant_id,
            username,
            resource_id: target.resource.id,
            upstream_resource_id: target.resource.upstream_resource_id.clone(),
        };
        let outcome = self
            .run_provider(job, ProviderOperation::Grant(&request))
            .await;
        self.apply_grant_outcome(job, target, outcome).await
    }

    async fn apply_grant_outcome(
        &self,
        job: &ClaimedProvisioningJob,
        mut target: GrantTarget,
        outcome: ProviderOutcome,
    ) -> AppResult<JobDisposition> {
        let now = Utc::now();
        let grant_id = target.grant.id();

        match outcome {
            ProviderOutcome::Succeeded => {
                target.grant.mark_granted(now)?;
                if !self
                    .save_owned(
                        job,
                        &target.grant,
                        AccessGrantStatus::Pending,
                        Some(
                            AuditEvent::new(
                                self.actor.subject(),
                                AuditAction::AccessGrantGranted,
                                "access_grant",
                                grant_id,
                            )
                            .with_detail(json!({
                                "job_id": job.job_id.to_string(),
                                "retry_count": target.grant.retry_count(),
                            })),
                        ),
                    )
                    .await?
                {
                    return Ok(JobDisposition::Completed);
                }

                tracing::info!(grant_id = %grant_id, job_id = %job.job_id, "access granted");
                self.notify_customer(&target, true, None).await;
                Ok(JobDisposition::Completed)
            }
            ProviderOutcome::RequiresManual { reason } => {
                target.grant.record_manual_handoff(now)?;
                if !self
                    .save_owned(
                        job,
                        &target.grant,
                        AccessGrantStatus::Pending,
                        Some(
                            AuditEvent::new(
                                self.actor.subject(),
                                AuditAction::AccessGrantAwaitingManual,
                                "access_grant",
                                grant_id,
                            )
                            .with_detail(json!({ "reason": reason })),
                        ),
                    )
                    .await?
                {
                    return Ok(JobDisposition::Completed);
                }

                tracing::info!(grant_id = %grant_id, reason = %reason, "access grant awaiting manual provisioning");
                Ok(JobDisposition::Completed)
            }
            ProviderOutcome::AuthError { status, reason } => {
                self.enter_degraded(job, grant_id, status, reason.as_str())
                    .await?;
                self.defer_grant(
                    job,
                    &mut target.grant,
                    format!("upstream authentication failed: {reason}"),
                )
                .await
            }
            ProviderOutcome::InvalidInput { reason } => {
                self.fail_grant(job, target, format!("invalid provisioning input: {reason}"))
                    .await
            }
            ProviderOutcome::TransientFailure { reason } => {
                let retry_count = target.grant.record_failed_attempt(reason.clone(), now)?;

                if self.retry_policy.is_exhausted(retry_count) {
                    return self.fail_grant(job, target, reason).await;
                }

                if !self
                    .save_owned(job, &target.grant, AccessGrantStatus::Pending, None)
                    .await?
                {
                    return Ok(JobDisposition::Completed);
                }

                tracing::warn!(
                    grant_id = %grant_id,
                    job_id = %job.job_id,
                    retry_count,
                    reason = %reason,
                    "provisioning attempt failed, will retry"
                );

                if self.retry_policy.should_escalate(retry_count) {
                    self.alert_operator(OperatorAlert::new(
                        AlertUrgency::Warning,
                        format!("Access grant {grant_id} keeps failing"),
                        format!(
                            "Attempt {retry_count} of {} failed for access grant {grant_id}: {reason}",
                            self.retry_policy.max_attempts
                        ),
                    ))
                    .await;
                }

                Ok(JobDisposition::Retry {
                    delay: self.retry_policy.retry_delay(retry_count),
                })
            }
        }
    }

    async fn defer_grant(
        &self,
        job: &ClaimedProvisioningJob,
        grant: &mut AccessGrant,
        reason: String,
    ) -> AppResult<JobDisposition> {
        grant.record_deferral(reason.clone(), Utc::now())?;
        if !self
            .save_owned(job, grant, AccessGrantStatus::Pending, None)
            .await?
        {
            return Ok(JobDisposition::Completed);
        }

        let delay = self.retry_policy.defer_delay(job.deferrals);
        tracing::info!(
            grant_id = %grant.id(),
            job_id = %job.job_id,
            deferrals = job.deferrals,
            delay_seconds = delay.as_secs(),
            reason = %reason,
            "deferring provisioning job"
        );

        Ok(JobDisposition::Defer { delay })
    }

    async fn fail_grant(
        &self,
        job: &ClaimedProvisioningJob,
        mut target: GrantTarget,
        reason: String,
    ) -> AppResult<JobDisposition> {
        let grant_id = target.grant.id();
        target.grant.mark_failed(reason.clone(), Utc::now())?;
        if !self
            .save_owned(
                job,
                &target.grant,
                AccessGrantStatus::Pending,
                Some(
                    AuditEvent::new(
                        self.actor.subject(),
                        AuditAction::AccessGrantFailed,
                        "access_grant",
                        grant_id,
                    )
                    .with_detail(json!({
                        "job_id": job.job_id.to_string(),
                        "retry_count": target.grant.retry_count(),
                        "reason": reason,
                    })),
                ),
            )
            .await?
        {
            return Ok(JobDisposition::Completed);
        }

        tracing::error!(
            grant_id = %grant_id,
            job_id = %job.job_id,
            retry_count = target.grant.retry_count(),
            reason = %reason,
            "access grant failed"
        );

        self.notify_customer(&target, false, Some(reason.clone()))
            .await;
        self.alert_operator(OperatorAlert::new(
            AlertUrgency::Critical,
            format!("Access grant {grant_id} failed"),
            format!(
                "Access grant {grant_id} for resource '{}' failed after {} attempt(s): {reason}",
                target.resource.name,
                target.grant.retry_count()
            ),
        ))
        .await;

        Ok(JobDisposition::Failed)
    }

    async fn hand_off_grant(
        &self,
        job: &ClaimedProvisioningJob,
        mut target: GrantTarget,
        username: String,
        origin: ManualTaskOrigin,
    ) -> AppResult<JobDisposition> {
        let grant_id = target.grant.id();
        let creation = self
            .manual_task_service
            .create_pending(
                self.actor.subject(),
                CreateManualTaskInput {
                    task_type: ManualTaskType::Grant,
                    target_username: username,
                    resource_id: target.resource.id,
                    access_grant_id: Some(grant_id),
                    origin,
                },
            )
            .await?;

        target.grant.record_manual_handoff(Utc::now())?;
        let audit = creation.is_new().then(|| {
            AuditEvent::new(
                self.actor.subject(),
                AuditAction::AccessGrantAwaitingManual,
                "access_grant",
                grant_id,
            )
            .with_detail(json!({
                "task_id": creation.task().id().to_string(),
                "origin": origin.as_str(),
            }))
        });
        if !self
            .save_owned(job, &target.grant, AccessGrantStatus::Pending, audit)
            .await?
        {
            return Ok(JobDisposition::Completed);
        }

        tracing::info!(
            grant_id = %grant_id,
            task_id = %creation.task().id(),
            origin = origin.as_str(),
            "access grant awaiting manual provisioning"
        );

        Ok(JobDisposition::Completed)
    }

    async fn process_revoke(
        &self,
        job: &ClaimedProvisioningJob,
        mut target: GrantTarget,
    ) -> AppResult<JobDisposition> {
        let grant_id = target.grant.id();
        if target.grant.status() != AccessGrantStatus::Granted {
            tracing::debug!(
                grant_id = %grant_id,
                status = target.grant.status().as_str(),
                "access grant is not granted, nothing to revoke"
            );
            return Ok(JobDisposition::Completed);
        }

        if self
            .manual_task_service
            .is_awaiting_manual(grant_id, ManualTaskType::Revoke)
            .await?
        {
            return Ok(JobDisposition::Completed);
        }

        let state = self.state_service.current_state().await?;
        if state.is_degraded() {
            target.grant.record_revoke_attempt(Utc::now())?;
            if !self
                .save_owned(job, &target.grant, AccessGrantStatus::Granted, None)
                .await?
            {
                return Ok(JobDisposition::Completed);
            }
            return Ok(JobDisposition::Defer {
                delay: self.retry_policy.defer_delay(job.deferrals),
            });
        }

        let Some(username) = usable_username(&target) else {
            return self
                .fail_revoke(job, &mut target.grant, "missing upstream username")
                .await;
        };

        if !target.resource.auto_provisioning_enabled {
            self.manual_task_service
                .create_pending(
                    self.actor.subject(),
                    CreateManualTaskInput {
                        task_type: ManualTaskType::Revoke,
                        target_username: username,
                        resource_id: target.resource.id,
                        access_grant_id: Some(grant_id),
                        origin: ManualTaskOrigin::AutoProvisioningDisabled,
                    },
                )
                .await?;
            return Ok(JobDisposition::Completed);
        }

        let request = ProvisioningRequest {
            access_grant_id: grant_id,
            username,
            resource_id: target.resource.id,
            upstream_resource_id: target.resource.upstream_resource_id.clone(),
        };
        let outcome = self
            .run_provider(job, ProviderOperation::Revoke(&request))
            .await;
        let now = Utc::now();

        match outcome {
            ProviderOutcome::Succeeded => {
                target.grant.mark_revoked(now)?;
                if !self
                    .save_owned(
                        job,
                        &target.grant,
                        AccessGrantStatus::Granted,
                        Some(
                            AuditEvent::new(
                                self.actor.subject(),
                                AuditAction::AccessGrantRevoked,
                                "access_grant",
                                grant_id,
                            )
                            .with_detail(json!({ "job_id": job.job_id.to_string() })),
                        ),
                    )
                    .await?
                {
                    return Ok(JobDisposition::Completed);
                }
                tracing::info!(grant_id = %grant_id, job_id = %job.job_id, "access revoked");
                Ok(JobDisposition::Completed)
            }
            ProviderOutcome::RequiresManual { reason } => {
                tracing::info!(grant_id = %grant_id, reason = %reason, "revocation awaiting manual action");
                Ok(JobDisposition::Completed)
            }
            ProviderOutcome::AuthError { status, reason } => {
                self.enter_degraded(job, grant_id, status, reason.as_str())
                    .await?;
                target.grant.record_revoke_attempt(now)?;
                if !self
                    .save_owned(job, &target.grant, AccessGrantStatus::Granted, None)
                    .await?
                {
                    return Ok(JobDisposition::Completed);
                }
                Ok(JobDisposition::Defer {
                    delay: self.retry_policy.defer_delay(job.deferrals),
                })
            }
            ProviderOutcome::InvalidInput { reason } => {
                self.fail_revoke(job, &mut target.grant, reason.as_str())
                    .await
            }
            ProviderOutcome::TransientFailure { reason } => {
                let attempts = job.attempts.saturating_add(1);
                if self.retry_policy.is_exhausted(attempts) {
                    return self
                        .fail_revoke(job, &mut target.grant, reason.as_str())
                        .await;
                }

                target.grant.record_revoke_attempt(now)?;
                if !self
                    .save_owned(job, &target.grant, AccessGrantStatus::Granted, None)
                    .await?
                {
                    return Ok(JobDisposition::Completed);
                }

                if self.retry_policy.should_escalate(attempts) {
                    self.alert_operator(OperatorAlert::new(
                        AlertUrgency::Warning,
                        format!("Revocation of access grant {grant_id} keeps failing"),
                        format!("Revoke attempt {attempts} failed: {reason}"),
                    ))
                    .await;
                }

                Ok(JobDisposition::Retry {
                    delay: self.retry_policy.retry_delay(attempts),
                })
            }
        }
    }

    async fn fail_revoke(
        &self,
        job: &ClaimedProvisioningJob,
        grant: &mut AccessGrant,
        reason: &str,
    ) -> AppResult<JobDisposition> {
        let grant_id = grant.id();
        grant.record_revoke_attempt(Utc::now())?;
        if !self
            .save_owned(
                job,
                grant,
                AccessGrantStatus::Granted,
                Some(
                    AuditEvent::new(
                        self.actor.subject(),
                        AuditAction::AccessGrantRevokeFailed,
                        "access_grant",
                        grant_id,
                    )
                    .with_detail(json!({
                        "job_id": job.job_id.to_string(),
                        "attempts": job.attempts.saturating_add(1),
                        "reason": reason,
                    })),
                ),
            )
            .await?
        {
            return Ok(JobDisposition::Completed);
        }

        tracing::error!(
            grant_id = %grant_id,
            job_id = %job.job_id,
            reason = %reason,
            "access revocation failed"
        );

        self.alert_operator(OperatorAlert::new(
            AlertUrgency::Critical,
            format!("Revocation of access grant {grant_id} failed"),
            format!("Access is still active upstream and must be removed by hand: {reason}"),
        ))
        .await;

        Ok(JobDisposition::Failed)
    }

    /// Writes grant state on behalf of `job`. `false` means the grant changed
    /// hands while the job ran and the job's result must be dropped.
    async fn save_owned(
        &self,
        job: &ClaimedProvisioningJob,
        grant: &AccessGrant,
        expected_status: AccessGrantStatus,
        audit: Option<AuditEvent>,
    ) -> AppResult<bool> {
        let saved = self
            .grant_repository
            .save_grant_for_job(
                grant,
                GrantWriteFence {
                    job_id: job.job_id,
                    expected_status,
                },
                audit,
            )
            .await?;

        if !saved {
            tracing::info!(
                grant_id = %grant.id(),
                job_id = %job.job_id,
                "access grant changed hands during the job, dropping its result"
            );
        }

        Ok(saved)
    }

    async fn enter_degraded(
        &self,
        job: &ClaimedProvisioningJob,
        grant_id: AccessGrantId,
        status: Option<u16>,
        reason: &str,
    ) -> AppResult<()> {
        let metadata = json!({
            "status": status,
            "access_grant_id": grant_id.to_string(),
            "job_id": job.job_id.to_string(),
        });

        self.state_service
            .transition_to_degraded(
                format!("upstream authentication failed: {reason}").as_str(),
                metadata,
                self.actor.subject(),
            )
            .await?;
        Ok(())
    }

    /// Runs one provider call; provider errors count as transient failures.
    async fn run_provider(
        &self,
        job: &ClaimedProvisioningJob,
        operation: ProviderOperation<'_>,
    ) -> ProviderOutcome {
        match self
            .provider_selector
            .execute_with_fallback(operation)
            .await
        {
            Ok(execution) => {
                tracing::debug!(
                    job_id = %job.job_id,
                    provider = execution.provider.as_str(),
                    outcome = ?execution.outcome,
                    "provider call finished"
                );
                execution.outcome
            }
            Err(error) => ProviderOutcome::TransientFailure {
                reason: error.to_string(),
            },
        }
    }
}

fn usable_username(target: &GrantTarget) -> Option<String> {
    target
        .external_username
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_owned)
}
