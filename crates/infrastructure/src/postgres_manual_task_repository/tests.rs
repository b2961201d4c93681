use chrono::Utc;
use grantry_application::{AuditEvent, ManualTaskCreation, ManualTaskRepository};
use grantry_core::AppError;
use grantry_domain::{
    AccessGrantStatus, AuditAction, ManualTask, ManualTaskOrigin, ManualTaskStatus,
    ManualTaskType,
};

use super::PostgresManualTaskRepository;
use crate::postgres_test_support::{
    audit_actions_for, insert_pending_grant, insert_resource, insert_user, test_pool,
};

fn created_audit(task: &ManualTask) -> AuditEvent {
    AuditEvent::new(
        "system:worker",
        AuditAction::ManualTaskCreated,
        "manual_task",
        task.id(),
    )
}

#[tokio::test]
async fn concurrent_creates_keep_one_pending_task_per_grant() {
    let Some(pool) = test_pool().await else {
        return;
    };

    let repository = PostgresManualTaskRepository::new(pool.clone());
    let user_id = insert_user(&pool, Some("trader_joe")).await;
    let resource_id = insert_resource(&pool, "Signals", true).await;
    let grant = insert_pending_grant(&pool, user_id, resource_id).await;

    let mut handles = Vec::new();
    for _ in 0..4 {
        let repository = repository.clone();
        let grant_id = grant.id();
        handles.push(tokio::spawn(async move {
            let task = ManualTask::new(
                ManualTaskType::Grant,
                "trader_joe",
                resource_id,
                Some(grant_id),
                ManualTaskOrigin::ManualProvider,
                Utc::now(),
            )?;
            let audit = created_audit(&task);
            repository.create_pending_task(task, audit).await
        }));
    }

    let mut created = Vec::new();
    let mut task_ids = Vec::new();
    for handle in handles {
        let joined = handle.await;
        assert!(joined.is_ok());
        let creation = joined.unwrap_or_else(|_| unreachable!());
        assert!(creation.is_ok());
        let creation = creation.unwrap_or_else(|_| unreachable!());
        task_ids.push(creation.task().id());
        if let ManualTaskCreation::Created(task) = creation {
            created.push(task);
        }
    }

    assert_eq!(created.len(), 1);
    assert!(task_ids.iter().all(|task_id| *task_id == created[0].id()));

    let pending = repository
        .find_pending_task_for_grant(grant.id(), ManualTaskType::Grant)
        .await;
    assert!(pending.is_ok());
    let pending = pending.unwrap_or_default();
    assert_eq!(pending.map(|task| task.id()), Some(created[0].id()));

    let actions = audit_actions_for(&pool, created[0].id().to_string().as_str()).await;
    assert_eq!(actions, vec!["manual_task.created".to_owned()]);
}

#[tokio::test]
async fn close_task_reconciles_grant_and_rejects_double_close() {
    let Some(pool) = test_pool().await else {
        return;
    };

    let repository = PostgresManualTaskRepository::new(pool.clone());
    let user_id = insert_user(&pool, Some("trader_joe")).await;
    let resource_id = insert_resource(&pool, "Signals", true).await;
    let grant = insert_pending_grant(&pool, user_id, resource_id).await;

    let task = ManualTask::new(
        ManualTaskType::Grant,
        "trader_joe",
        resource_id,
        Some(grant.id()),
        ManualTaskOrigin::OperatorFallback,
        Utc::now(),
    );
    assert!(task.is_ok());
    let task = task.unwrap_or_else(|_| unreachable!());
    let audit = created_audit(&task);
    assert!(repository.create_pending_task(task.clone(), audit).await.is_ok());

    let mut completed = task.clone();
    assert!(
        completed
            .complete("operator@example.com", Some("added by hand".to_owned()), Utc::now())
            .is_ok()
    );
    let mut granted = grant.clone();
    assert!(granted.mark_granted(Utc::now()).is_ok());

    let audit = vec![
        AuditEvent::new(
            "operator@example.com",
            AuditAction::ManualTaskCompleted,
            "manual_task",
            task.id(),
        ),
        AuditEvent::new(
            "operator@example.com",
            AuditAction::AccessGrantGranted,
            "access_grant",
            grant.id(),
        ),
    ];
    let closed = repository
        .close_task(&completed, Some(&granted), audit.clone())
        .await;
    assert!(closed.is_ok());

    let reloaded = repository.find_task(task.id()).await;
    assert!(reloaded.is_ok());
    let reloaded = reloaded.unwrap_or_default().unwrap_or_else(|| unreachable!());
    assert_eq!(reloaded.status(), ManualTaskStatus::Completed);
    assert_eq!(
        reloaded.parts().completed_by.as_deref(),
        Some("operator@example.com")
    );

    let status = sqlx::query_scalar::<_, String>("SELECT status FROM access_grants WHERE id = $1")
        .bind(grant.id().as_uuid())
        .fetch_one(&pool)
        .await;
    assert!(status.is_ok());
    assert_eq!(
        status.unwrap_or_default(),
        AccessGrantStatus::Granted.as_str()
    );

    let pending = repository.list_pending_tasks().await;
    assert!(pending.is_ok());
    assert!(
        pending
            .unwrap_or_default()
            .iter()
            .all(|pending_task| pending_task.id() != task.id())
    );

    let second = repository.close_task(&completed, Some(&granted), audit).await;
    assert!(matches!(second, Err(AppError::Conflict(_))));
}

#[tokio::test]
async fn unknown_task_is_none() {
    let Some(pool) = test_pool().await else {
        return;
    };

    let repository = PostgresManualTaskRepository::new(pool);
    let found = repository
        .find_task(grantry_domain::ManualTaskId::new())
        .await;
    assert!(found.is_ok());
    assert!(found.unwrap_or_default().is_none());
}
