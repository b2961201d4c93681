use std::time::Duration;

use chrono::Utc;
use grantry_application::{
    AccessGrantRepository, AuditEvent, EnqueueProvisioningJob, GrantWriteFence, JobQueue,
    ProvisioningStatsRepository,
};
use grantry_domain::{AccessGrantStatus, AuditAction, ProvisioningAction};

use super::PostgresAccessGrantRepository;
use crate::PostgresProvisioningJobQueue;
use crate::postgres_test_support::{
    audit_actions_for, insert_pending_grant, insert_resource, insert_user, test_pool,
};

#[tokio::test]
async fn grant_target_joins_user_and_resource() {
    let Some(pool) = test_pool().await else {
        return;
    };

    let repository = PostgresAccessGrantRepository::new(pool.clone());
    let user_id = insert_user(&pool, Some("trader_joe")).await;
    let resource_id = insert_resource(&pool, "Signals", true).await;
    let grant = insert_pending_grant(&pool, user_id, resource_id).await;

    let target = repository.find_grant_target(grant.id()).await;
    assert!(target.is_ok());
    let target = target.unwrap_or_else(|_| unreachable!());
    assert!(target.is_some());
    let target = target.unwrap_or_else(|| unreachable!());

    assert_eq!(target.grant.id(), grant.id());
    assert_eq!(target.external_username.as_deref(), Some("trader_joe"));
    assert_eq!(target.resource.name, "Signals");
    assert_eq!(target.resource.upstream_resource_id, format!("upstream-{resource_id}"));
    assert!(target.resource.auto_provisioning_enabled);
}

#[tokio::test]
async fn save_grant_writes_state_and_audit_but_never_job_id() {
    let Some(pool) = test_pool().await else {
        return;
    };

    let repository = PostgresAccessGrantRepository::new(pool.clone());
    let queue = PostgresProvisioningJobQueue::new(pool.clone());
    let user_id = insert_user(&pool, Some("trader_joe")).await;
    let resource_id = insert_resource(&pool, "Signals", true).await;
    let grant = insert_pending_grant(&pool, user_id, resource_id).await;

    let job_id = queue
        .enqueue(EnqueueProvisioningJob {
            access_grant_id: grant.id(),
            action: ProvisioningAction::Grant,
            delay: Duration::from_secs(60),
        })
        .await;
    assert!(job_id.is_ok());
    let job_id = job_id.unwrap_or_else(|_| unreachable!());

    let mut granted = grant.clone();
    assert!(granted.mark_granted(Utc::now()).is_ok());
    let saved = repository
        .save_grant(
            &granted,
            Some(AuditEvent::new(
                "system:worker",
                AuditAction::AccessGrantGranted,
                "access_grant",
                grant.id(),
            )),
        )
        .await;
    assert!(saved.is_ok());

    let reloaded = repository.find_grant(grant.id()).await;
    assert!(reloaded.is_ok());
    let reloaded = reloaded.unwrap_or_default();
    assert!(reloaded.is_some());
    let reloaded = reloaded.unwrap_or_else(|| unreachable!());
    assert_eq!(reloaded.status(), AccessGrantStatus::Granted);
    assert!(reloaded.granted_at().is_some());
    assert_eq!(reloaded.job_id(), Some(job_id));

    let actions = audit_actions_for(&pool, grant.id().to_string().as_str()).await;
    assert_eq!(actions, vec!["access_grant.granted".to_owned()]);
}

#[tokio::test]
async fn job_writes_only_land_for_the_current_job_and_expected_status() {
    let Some(pool) = test_pool().await else {
        return;
    };

    let repository = PostgresAccessGrantRepository::new(pool.clone());
    let queue = PostgresProvisioningJobQueue::new(pool.clone());
    let user_id = insert_user(&pool, Some("trader_joe")).await;
    let resource_id = insert_resource(&pool, "Signals", true).await;
    let grant = insert_pending_grant(&pool, user_id, resource_id).await;

    let mut job_ids = Vec::new();
    for _ in 0..2 {
        let job_id = queue
            .enqueue(EnqueueProvisioningJob {
                access_grant_id: grant.id(),
                action: ProvisioningAction::Grant,
                delay: Duration::ZERO,
            })
            .await;
        assert!(job_id.is_ok());
        job_ids.push(job_id.unwrap_or_else(|_| unreachable!()));
    }

    let mut granted = grant.clone();
    assert!(granted.mark_granted(Utc::now()).is_ok());
    let audit = || {
        Some(AuditEvent::new(
            "system:worker",
            AuditAction::AccessGrantGranted,
            "access_grant",
            grant.id(),
        ))
    };

    let stale = repository
        .save_grant_for_job(
            &granted,
            GrantWriteFence {
                job_id: job_ids[0],
                expected_status: AccessGrantStatus::Pending,
            },
            audit(),
        )
        .await;
    assert_eq!(stale.ok(), Some(false));
    assert!(audit_actions_for(&pool, grant.id().to_string().as_str()).await.is_empty());

    let current = GrantWriteFence {
        job_id: job_ids[1],
        expected_status: AccessGrantStatus::Pending,
    };
    let saved = repository.save_grant_for_job(&granted, current, audit()).await;
    assert_eq!(saved.ok(), Some(true));

    let mut retried = grant.clone();
    assert!(retried.record_failed_attempt("timeout", Utc::now()).is_ok());
    let overwrite = repository.save_grant_for_job(&retried, current, None).await;
    assert_eq!(overwrite.ok(), Some(false));

    let reloaded = repository.find_grant(grant.id()).await.unwrap_or_default();
    assert_eq!(
        reloaded.map(|grant| grant.status()),
        Some(AccessGrantStatus::Granted)
    );
    assert_eq!(
        audit_actions_for(&pool, grant.id().to_string().as_str()).await,
        vec!["access_grant.granted".to_owned()]
    );
}

#[tokio::test]
async fn saving_unknown_grant_is_not_found() {
    let Some(pool) = test_pool().await else {
        return;
    };

    let repository = PostgresAccessGrantRepository::new(pool.clone());
    let user_id = insert_user(&pool, None).await;
    let resource_id = insert_resource(&pool, "Signals", true).await;
    let grant = grantry_domain::AccessGrant::pending(user_id, resource_id, Utc::now());

    let saved = repository.save_grant(&grant, None).await;
    assert!(matches!(saved, Err(grantry_core::AppError::NotFound(_))));
}

#[tokio::test]
async fn resumable_grants_exclude_grants_waiting_on_manual_tasks() {
    let Some(pool) = test_pool().await else {
        return;
    };

    let repository = PostgresAccessGrantRepository::new(pool.clone());
    let user_id = insert_user(&pool, Some("trader_joe")).await;
    let automated = insert_pending_grant(
        &pool,
        user_id,
        insert_resource(&pool, "Signals", true).await,
    )
    .await;
    let manual_resource = insert_resource(&pool, "Scanner", true).await;
    let waiting = insert_pending_grant(&pool, user_id, manual_resource).await;

    let task_insert = sqlx::query(
        r#"
        INSERT INTO manual_tasks (
            id,
            task_type,
            target_username,
            resource_id,
            access_grant_id,
            origin,
            status
        )
        VALUES (gen_random_uuid(), 'grant', 'trader_joe', $1, $2, 'manual_provider', 'pending')
        "#,
    )
    .bind(manual_resource.as_uuid())
    .bind(waiting.id().as_uuid())
    .execute(&pool)
    .await;
    assert!(task_insert.is_ok());

    let resumable = repository.list_resumable_grant_ids().await;
    assert!(resumable.is_ok());
    let resumable = resumable.unwrap_or_default();
    assert!(resumable.contains(&automated.id()));
    assert!(!resumable.contains(&waiting.id()));
}

#[tokio::test]
async fn provisioning_stats_include_failed_grants() {
    let Some(pool) = test_pool().await else {
        return;
    };

    let repository = PostgresAccessGrantRepository::new(pool.clone());
    let user_id = insert_user(&pool, Some("trader_joe")).await;
    let mut failed = insert_pending_grant(
        &pool,
        user_id,
        insert_resource(&pool, "Signals", true).await,
    )
    .await;
    assert!(failed.mark_failed("user not found", Utc::now()).is_ok());
    assert!(repository.save_grant(&failed, None).await.is_ok());

    let after = repository.provisioning_stats().await;
    assert!(after.is_ok());
    let after = after.unwrap_or_default();
    assert!(after.failed >= 1);
    assert!(after.pending + after.failed + after.granted + after.revoked >= 1);
}
