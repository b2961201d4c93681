use grantry_core::OperatorIdentity;
use grantry_domain::{
    AccessGrantStatus, AuditAction, ManualTaskOrigin, ProvisioningAction, ProvisioningStatus,
    UserId,
};

use crate::provisioning_ports::{
    AlertUrgency, ClaimedProvisioningJob, EnqueueProvisioningJob, JobDisposition, JobQueue, ProviderKind, ProviderOutcome,
};
use crate::test_support::{Harness, ScriptedProvider, StoredJobStatus, session_expired, timeout};

fn harness_with_default(outcome: ProviderOutcome) -> Harness {
    Harness::new(ScriptedProvider::new(ProviderKind::AutomatedApi, outcome))
}

fn operator() -> OperatorIdentity {
    OperatorIdentity::new("ops@example.com", "Ops")
}

#[tokio::test]
async fn successful_grant_sets_granted_and_notifies_customer() {
    let harness = harness_with_default(ProviderOutcome::Succeeded);
    let job = harness.seed_grant(true).await;

    let disposition = harness.job_service.process_job(&job).await;
    assert_eq!(disposition.ok(), Some(JobDisposition::Completed));

    let grant = harness.store.grant(job.access_grant_id).await;
    assert_eq!(grant.status(), AccessGrantStatus::Granted);
    assert!(grant.granted_at().is_some());
    assert!(grant.failure_reason().is_none());
    assert_eq!(harness.notifier.granted.lock().await.len(), 1);
    assert!(
        harness
            .store
            .audit_actions()
            .await
            .contains(&AuditAction::AccessGrantGranted)
    );
}

#[tokio::test]
async fn transient_failures_retry_then_fail_at_attempt_cap() {
    let harness = harness_with_default(timeout());
    let job = harness.seed_grant(true).await;

    for expected_retry_count in 1..=4 {
        let disposition = harness.job_service.process_job(&job).await;
        assert!(matches!(disposition, Ok(JobDisposition::Retry { .. })));

        let grant = harness.store.grant(job.access_grant_id).await;
        assert_eq!(grant.status(), AccessGrantStatus::Pending);
        assert_eq!(grant.retry_count(), expected_retry_count);
        assert!(grant.failure_reason().is_some());
        assert_eq!(
            harness.store.provisioning_state().await.status,
            ProvisioningStatus::Healthy
        );
    }

    let disposition = harness.job_service.process_job(&job).await;
    assert_eq!(disposition.ok(), Some(JobDisposition::Failed));

    let grant = harness.store.grant(job.access_grant_id).await;
    assert_eq!(grant.status(), AccessGrantStatus::Failed);
    assert_eq!(grant.retry_count(), 5);
    assert_eq!(harness.notifier.failed.lock().await.len(), 1);

    let alerts = harness.notifier.alerts.lock().await;
    let warnings = alerts
        .iter()
        .filter(|alert| alert.urgency == AlertUrgency::Warning)
        .count();
    assert_eq!(warnings, 2);
    assert_eq!(
        alerts.last().map(|alert| alert.urgency),
        Some(AlertUrgency::Critical)
    );
}

#[tokio::test]
async fn retry_delay_grows_with_retry_count() {
    let harness = harness_with_default(timeout());
    let job = harness.seed_grant(true).await;
    let policy = harness.job_service.retry_policy();

    let first = harness.job_service.process_job(&job).await;
    let second = harness.job_service.process_job(&job).await;
    assert_eq!(
        first.ok(),
        Some(JobDisposition::Retry {
            delay: policy.retry_delay(1)
        })
    );
    assert_eq!(
        second.ok(),
        Some(JobDisposition::Retry {
            delay: policy.retry_delay(2)
        })
    );
}

#[tokio::test]
async fn auth_error_degrades_and_defers_other_grants_without_counting() {
    let harness = harness_with_default(ProviderOutcome::Succeeded);
    harness.provider.push_outcome(session_expired()).await;
    let first_job = harness.seed_grant(true).await;
    let second_job = harness.seed_grant(true).await;

    let disposition = harness.job_service.process_job(&first_job).await;
    assert!(matches!(disposition, Ok(JobDisposition::Defer { .. })));

    let first_grant = harness.store.grant(first_job.access_grant_id).await;
    assert_eq!(first_grant.status(), AccessGrantStatus::Pending);
    assert_eq!(first_grant.retry_count(), 0);
    assert!(first_grant.failure_reason().is_some());

    let state = harness.store.provisioning_state().await;
    assert_eq!(state.status, ProvisioningStatus::Degraded);
    assert!(state.incident_id.is_some());
    assert_eq!(
        harness.notifier.alerts.lock().await.first().map(|alert| alert.urgency),
        Some(AlertUrgency::Critical)
    );

    let calls_before = harness.provider.call_count().await;
    let disposition = harness.job_service.process_job(&second_job).await;
    assert!(matches!(disposition, Ok(JobDisposition::Defer { .. })));
    assert_eq!(harness.provider.call_count().await, calls_before);

    let second_grant = harness.store.grant(second_job.access_grant_id).await;
    assert_eq!(second_grant.status(), AccessGrantStatus::Pending);
    assert_eq!(second_grant.retry_count(), 0);
    assert_eq!(harness.store.provisioning_state().await.incident_id, state.incident_id);
}

#[tokio::test]
async fn worker_loop_never_recovers_provisioning_on_its_own() {
    let harness = harness_with_default(ProviderOutcome::Succeeded);
    harness.provider.push_outcome(session_expired()).await;
    let job = harness.seed_grant(true).await;

    for _ in 0..10 {
        let claimed = harness
            .job_service
            .claim_jobs_for_worker("worker-1", 10, 60)
            .await;
        assert!(claimed.is_ok());
        for claimed_job in claimed.unwrap_or_default() {
            let disposition = harness
                .job_service
                .execute_claimed_job("worker-1", claimed_job)
                .await;
            assert!(matches!(disposition, Ok(JobDisposition::Defer { .. })));
        }
        assert_eq!(
            harness.store.provisioning_state().await.status,
            ProvisioningStatus::Degraded
        );
    }

    let grant = harness.store.grant(job.access_grant_id).await;
    assert_eq!(grant.status(), AccessGrantStatus::Pending);
    assert_eq!(grant.retry_count(), 0);

    let jobs = harness.store.jobs_for(job.access_grant_id).await;
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].attempts, 0);
    assert_eq!(jobs[0].deferrals, 10);
    assert!(
        !harness
            .store
            .audit_actions()
            .await
            .contains(&AuditAction::ProvisioningRecovered)
    );
}

#[tokio::test]
async fn disabled_auto_provisioning_waits_for_manual_and_never_fails() {
    let harness = harness_with_default(timeout());
    let job = harness.seed_grant(false).await;

    for _ in 0..6 {
        let disposition = harness.job_service.process_job(&job).await;
        assert_eq!(disposition.ok(), Some(JobDisposition::Completed));
    }

    let grant = harness.store.grant(job.access_grant_id).await;
    assert_eq!(grant.status(), AccessGrantStatus::Pending);
    assert_eq!(grant.retry_count(), 0);
    assert_eq!(harness.provider.call_count().await, 0);

    let tasks = harness.store.tasks().await;
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].origin(), ManualTaskOrigin::AutoProvisioningDisabled);
    assert_eq!(tasks[0].access_grant_id(), Some(job.access_grant_id));

    let awaiting = harness
        .store
        .audit_actions()
        .await
        .into_iter()
        .filter(|action| *action == AuditAction::AccessGrantAwaitingManual)
        .count();
    assert_eq!(awaiting, 1);
}

#[tokio::test]
async fn unconfigured_automated_provider_routes_to_manual_task() {
    let harness = Harness::new(
        ScriptedProvider::new(ProviderKind::AutomatedApi, ProviderOutcome::Succeeded)
            .unconfigured(),
    );
    let job = harness.seed_grant(true).await;

    let disposition = harness.job_service.process_job(&job).await;
    assert_eq!(disposition.ok(), Some(JobDisposition::Completed));
    assert_eq!(harness.provider.call_count().await, 0);

    let grant = harness.store.grant(job.access_grant_id).await;
    assert_eq!(grant.status(), AccessGrantStatus::Pending);
    let tasks = harness.store.tasks().await;
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].origin(), ManualTaskOrigin::ManualProvider);
}

#[tokio::test]
async fn invalid_input_fails_immediately() {
    let harness = harness_with_default(ProviderOutcome::InvalidInput {
        reason: "unknown upstream user".to_owned(),
    });
    let job = harness.seed_grant(true).await;

    let disposition = harness.job_service.process_job(&job).await;
    assert_eq!(disposition.ok(), Some(JobDisposition::Failed));

    let grant = harness.store.grant(job.access_grant_id).await;
    assert_eq!(grant.status(), AccessGrantStatus::Failed);
    assert_eq!(grant.retry_count(), 0);
    assert_eq!(harness.notifier.failed.lock().await.len(), 1);
}

#[tokio::test]
async fn missing_username_fails_without_provider_call() {
    let harness = harness_with_default(ProviderOutcome::Succeeded);
    let user_id = UserId::new();
    harness.store.add_user(user_id, None).await;
    let resource_id = harness.store.add_resource("Signals", true, true).await;
    let job = harness.store.seed_pending_grant(user_id, resource_id).await;

    let disposition = harness.job_service.process_job(&job).await;
    assert_eq!(disposition.ok(), Some(JobDisposition::Failed));
    assert_eq!(harness.provider.call_count().await, 0);
    assert_eq!(
        harness.store.grant(job.access_grant_id).await.status(),
        AccessGrantStatus::Failed
    );
}

#[tokio::test]
async fn superseded_job_is_completed_without_side_effects() {
    let harness = harness_with_default(ProviderOutcome::Succeeded);
    let stale_job = harness.seed_grant(true).await;

    let fresh_job_id = harness
        .store
        .enqueue(EnqueueProvisioningJob {
            access_grant_id: stale_job.access_grant_id,
            action: ProvisioningAction::Grant,
            delay: std::time::Duration::ZERO,
        })
        .await;
    assert!(fresh_job_id.is_ok());

    let disposition = harness.job_service.process_job(&stale_job).await;
    assert_eq!(disposition.ok(), Some(JobDisposition::Completed));
    assert_eq!(harness.provider.call_count().await, 0);
    assert_eq!(
        harness.store.grant(stale_job.access_grant_id).await.status(),
        AccessGrantStatus::Pending
    );

    let jobs = harness.store.jobs_for(stale_job.access_grant_id).await;
    assert_eq!(jobs[0].status, StoredJobStatus::Superseded);
    assert_eq!(jobs[1].status, StoredJobStatus::Pending);
}

#[tokio::test]
async fn operator_retry_resets_failed_grant_with_fresh_job() {
    let harness = harness_with_default(ProviderOutcome::InvalidInput {
        reason: "unknown upstream user".to_owned(),
    });
    let job = harness.seed_grant(true).await;
    let _ = harness.job_service.process_job(&job).await;

    let retried = harness
        .job_service
        .retry_grant(&operator(), job.access_grant_id)
        .await;
    assert!(retried.is_ok());
    let new_job_id = retried.unwrap_or_else(|_| unreachable!());
    assert_ne!(new_job_id, job.job_id);

    let grant = harness.store.grant(job.access_grant_id).await;
    assert_eq!(grant.status(), AccessGrantStatus::Pending);
    assert_eq!(grant.retry_count(), 0);
    assert_eq!(grant.job_id(), Some(new_job_id));
}

#[tokio::test]
async fn operator_retry_rejects_granted_grant() {
    let harness = harness_with_default(ProviderOutcome::Succeeded);
    let job = harness.seed_grant(true).await;
    let _ = harness.job_service.process_job(&job).await;

    let retried = harness
        .job_service
        .retry_grant(&operator(), job.access_grant_id)
        .await;
    assert!(retried.is_err());
}

#[tokio::test]
async fn revoke_request_revokes_granted_access() {
    let harness = harness_with_default(ProviderOutcome::Succeeded);
    let job = harness.seed_grant(true).await;
    let _ = harness.job_service.process_job(&job).await;

    let requested = harness
        .job_service
        .request_revoke(&operator(), job.access_grant_id)
        .await;
    assert!(requested.is_ok());

    let claimed = harness
        .job_service
        .claim_jobs_for_worker("worker-1", 10, 60)
        .await
        .unwrap_or_default();
    assert_eq!(claimed.len(), 1);
    assert_eq!(claimed[0].action, ProvisioningAction::Revoke);

    let disposition = harness
        .job_service
        .execute_claimed_job("worker-1", claimed[0].clone())
        .await;
    assert_eq!(disposition.ok(), Some(JobDisposition::Completed));

    let grant = harness.store.grant(job.access_grant_id).await;
    assert_eq!(grant.status(), AccessGrantStatus::Revoked);
    assert!(grant.revoked_at().is_some());
}

#[tokio::test]
async fn claim_rejects_blank_worker() {
    let harness = harness_with_default(ProviderOutcome::Succeeded);
    let claimed = harness.job_service.claim_jobs_for_worker(" ", 10, 60).await;
    assert!(claimed.is_err());
}

#[tokio::test]
async fn job_superseded_mid_call_cannot_overwrite_the_grant() {
    let harness = harness_with_default(ProviderOutcome::Succeeded);
    let first_job = harness.seed_grant(true).await;
    let gate = harness.provider.hold_next_grant().await;

    let service = harness.job_service.clone();
    let held_job = first_job.clone();
    let first_run = tokio::spawn(async move { service.process_job(&held_job).await });
    gate.entered.notified().await;

    let second_job_id = harness
        .job_service
        .retry_grant(&operator(), first_job.access_grant_id)
        .await;
    assert!(second_job_id.is_ok());
    let second_job = ClaimedProvisioningJob {
        job_id: second_job_id.unwrap_or_else(|_| unreachable!()),
        lease_token: "lease-second".to_owned(),
        ..first_job.clone()
    };

    harness.provider.push_outcome(timeout()).await;
    let second = harness.job_service.process_job(&second_job).await;
    assert!(matches!(second, Ok(JobDisposition::Retry { .. })));

    gate.release.notify_one();
    let first = first_run.await;
    assert!(matches!(first, Ok(Ok(JobDisposition::Completed))));

    let grant = harness.store.grant(first_job.access_grant_id).await;
    assert_eq!(grant.status(), AccessGrantStatus::Pending);
    assert_eq!(grant.retry_count(), 1);
    assert!(grant.granted_at().is_none());
    assert_eq!(grant.job_id(), Some(second_job.job_id));
    assert!(harness.notifier.granted.lock().await.is_empty());

    let finished = harness.job_service.process_job(&second_job).await;
    assert_eq!(finished.ok(), Some(JobDisposition::Completed));
    let grant = harness.store.grant(first_job.access_grant_id).await;
    assert_eq!(grant.status(), AccessGrantStatus::Granted);
    assert_eq!(harness.notifier.granted.lock().await.len(), 1);
}

#[tokio::test]
async fn in_flight_job_cannot_undo_an_operator_completed_grant() {
    let harness = harness_with_default(timeout());
    let job = harness.seed_grant(true).await;
    let gate = harness.provider.hold_next_grant().await;

    let service = harness.job_service.clone();
    let held_job = job.clone();
    let run = tokio::spawn(async move { service.process_job(&held_job).await });
    gate.entered.notified().await;

    let task = harness
        .manual_task_service
        .create_operator_fallback(&operator(), job.access_grant_id)
        .await;
    assert!(task.is_ok());
    let task = task.unwrap_or_else(|_| unreachable!());
    let completed = harness
        .manual_task_service
        .complete_task(&operator(), task.id(), None)
        .await;
    assert!(completed.is_ok());

    gate.release.notify_one();
    let outcome = run.await;
    assert!(matches!(outcome, Ok(Ok(JobDisposition::Completed))));

    let grant = harness.store.grant(job.access_grant_id).await;
    assert_eq!(grant.status(), AccessGrantStatus::Granted);
    assert_eq!(grant.retry_count(), 0);
    assert!(grant.failure_reason().is_none());
}

#[tokio::test]
async fn terminal_revoke_failure_is_audited_and_keeps_access_granted() {
    let harness = harness_with_default(ProviderOutcome::Succeeded);
    let job = harness.seed_grant(true).await;
    let _ = harness.job_service.process_job(&job).await;

    let requested = harness
        .job_service
        .request_revoke(&operator(), job.access_grant_id)
        .await;
    assert!(requested.is_ok());
    harness
        .provider
        .push_outcome(ProviderOutcome::InvalidInput {
            reason: "unknown upstream user".to_owned(),
        })
        .await;

    let claimed = harness
        .job_service
        .claim_jobs_for_worker("worker-1", 10, 60)
        .await
        .unwrap_or_default();
    assert_eq!(claimed.len(), 1);
    let disposition = harness
        .job_service
        .execute_claimed_job("worker-1", claimed[0].clone())
        .await;
    assert_eq!(disposition.ok(), Some(JobDisposition::Failed));

    let grant = harness.store.grant(job.access_grant_id).await;
    assert_eq!(grant.status(), AccessGrantStatus::Granted);
    assert!(
        harness
            .store
            .audit_actions()
            .await
            .contains(&AuditAction::AccessGrantRevokeFailed)
    );
    assert_eq!(
        harness.notifier.alerts.lock().await.last().map(|alert| alert.urgency),
        Some(AlertUrgency::Critical)
    );
}
