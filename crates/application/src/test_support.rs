//! In-memory fakes shared by application service tests.
//!
//! `InMemoryStore` implements every persistence port over one mutex so that
//! multi-table operations (fan-out, enqueue, manual task close) stay atomic
//! the way the Postgres adapters are.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::{Mutex, Notify};

use grantry_core::{AppError, AppResult};
use grantry_domain::{
    AccessGrant, AccessGrantId, AccessGrantStatus, AuditAction, CredentialId, CredentialMetadata,
    DegradeTransition, EncryptedSecret, JobId, ManualTask, ManualTaskId, ManualTaskStatus,
    ManualTaskType, ProtectedResource, ProtectedResourceId, ProvisioningAction, ProvisioningState,
    PurchaseId, RecoverTransition, RetryPolicy, UserId,
};

use crate::manual_task_service::ManualTaskService;
use crate::provider_selector::{ManualAccessProvider, PrimaryProviderSetting, ProviderSelector};
use crate::provisioning_job_service::ProvisioningJobService;
use crate::provisioning_ports::{
    AccessGrantRepository, AccessNotice, AccessProvider, AuditEvent, AuditRepository,
    ClaimedProvisioningJob, CompletePurchaseInput, CredentialRepository, CredentialValidation,
    EnqueueProvisioningJob, FanoutOutcome, FanoutRepository, GrantTarget, GrantWriteFence,
    JobQueue, ManualTaskCreation, ManualTaskRepository, NewCredential, OperatorAlert,
    ProviderKind, ProviderOutcome, ProvisioningNotifier, ProvisioningRequest,
    ProvisioningStateRepository, ProvisioningStats, ProvisioningStatsRepository, SecretEncryptor,
    StoredCredential, UpstreamCredentialValidator, UpstreamSession,
};
use crate::provisioning_state_service::ProvisioningStateService;
use crate::resume_service::ResumeService;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StoredJobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Superseded,
}

#[derive(Debug, Clone)]
pub(crate) struct StoredJob {
    pub(crate) job_id: JobId,
    pub(crate) access_grant_id: AccessGrantId,
    pub(crate) action: ProvisioningAction,
    pub(crate) attempts: u32,
    pub(crate) deferrals: u32,
    pub(crate) status: StoredJobStatus,
    pub(crate) delay: Duration,
    pub(crate) lease_token: Option<String>,
}

struct StoredUser {
    email: String,
    external_username: Option<String>,
}

#[derive(Default)]
struct StoreState {
    users: HashMap<UserId, StoredUser>,
    resources: Vec<ProtectedResource>,
    grants: HashMap<AccessGrantId, AccessGrant>,
    jobs: Vec<StoredJob>,
    purchases: HashMap<String, PurchaseId>,
    tasks: Vec<ManualTask>,
    provisioning_state: ProvisioningState,
    audit: Vec<AuditEvent>,
    credentials: Vec<StoredCredential>,
    lease_counter: u64,
}

impl StoreState {
    fn enqueue(&mut self, job: EnqueueProvisioningJob) -> AppResult<JobId> {
        let grant = self
            .grants
            .get_mut(&job.access_grant_id)
            .ok_or_else(|| AppError::NotFound(format!("grant '{}'", job.access_grant_id)))?;

        for stored in self.jobs.iter_mut().filter(|stored| {
            stored.access_grant_id == job.access_grant_id
                && stored.status == StoredJobStatus::Pending
        }) {
            stored.status = StoredJobStatus::Superseded;
        }

        let job_id = JobId::new();
        grant.assign_job(job_id);
        self.jobs.push(StoredJob {
            job_id,
            access_grant_id: job.access_grant_id,
            action: job.action,
            attempts: 0,
            deferrals: 0,
            status: StoredJobStatus::Pending,
            delay: job.delay,
            lease_token: None,
        });

        Ok(job_id)
    }

    fn store_grant(&mut self, grant: &AccessGrant) -> AppResult<()> {
        let job_id = self
            .grants
            .get(&grant.id())
            .and_then(AccessGrant::job_id);
        let mut parts = grant.parts().clone();
        parts.job_id = job_id;
        self.grants.insert(grant.id(), AccessGrant::from_parts(parts)?);
        Ok(())
    }

    fn running_job(
        &mut self,
        job_id: JobId,
        lease_token: &str,
    ) -> AppResult<&mut StoredJob> {
        self.jobs
            .iter_mut()
            .find(|job| {
                job.job_id == job_id
                    && job.status == StoredJobStatus::Running
                    && job.lease_token.as_deref() == Some(lease_token)
            })
            .ok_or_else(|| AppError::Conflict(format!("job '{job_id}' is not leased")))
    }
}

#[derive(Default)]
pub(crate) struct InMemoryStore {
    inner: Mutex<StoreState>,
}

impl InMemoryStore {
    pub(crate) async fn add_user(&self, user_id: UserId, external_username: Option<&str>) {
        self.inner.lock().await.users.insert(
            user_id,
            StoredUser {
                email: format!("{user_id}@example.com"),
                external_username: external_username.map(str::to_owned),
            },
        );
    }

    pub(crate) async fn add_resource(
        &self,
        name: &str,
        is_active: bool,
        auto_provisioning_enabled: bool,
    ) -> ProtectedResourceId {
        let resource = ProtectedResource {
            id: ProtectedResourceId::new(),
            name: name.to_owned(),
            upstream_resource_id: format!("upstream-{name}"),
            is_active,
            auto_provisioning_enabled,
        };
        let id = resource.id;
        self.inner.lock().await.resources.push(resource);
        id
    }

    /// Seeds a PENDING grant with one queued job and returns the claimed job.
    pub(crate) async fn seed_pending_grant(
        &self,
        user_id: UserId,
        resource_id: ProtectedResourceId,
    ) -> ClaimedProvisioningJob {
        let mut state = self.inner.lock().await;
        let grant = AccessGrant::pending(user_id, resource_id, Utc::now());
        let grant_id = grant.id();
        state.grants.insert(grant_id, grant);
        let job_id = state
            .enqueue(EnqueueProvisioningJob {
                access_grant_id: grant_id,
                action: ProvisioningAction::Grant,
                delay: Duration::ZERO,
            })
            .unwrap_or_else(|_| unreachable!());

        ClaimedProvisioningJob {
            job_id,
            access_grant_id: grant_id,
            action: ProvisioningAction::Grant,
            attempts: 0,
            deferrals: 0,
            lease_token: "lease-seed".to_owned(),
        }
    }

    pub(crate) async fn grant(&self, grant_id: AccessGrantId) -> AccessGrant {
        self.inner
            .lock()
            .await
            .grants
            .get(&grant_id)
            .cloned()
            .unwrap_or_else(|| unreachable!())
    }

    pub(crate) async fn provisioning_state(&self) -> ProvisioningState {
        self.inner.lock().await.provisioning_state.clone()
    }

    pub(crate) async fn audit_actions(&self) -> Vec<AuditAction> {
        self.inner
            .lock()
            .await
            .audit
            .iter()
            .map(|event| event.action)
            .collect()
    }

    pub(crate) async fn jobs_for(&self, grant_id: AccessGrantId) -> Vec<StoredJob> {
        self.inner
            .lock()
            .await
            .jobs
            .iter()
            .filter(|job| job.access_grant_id == grant_id)
            .cloned()
            .collect()
    }

    pub(crate) async fn pending_job_count(&self) -> usize {
        self.inner
            .lock()
            .await
            .jobs
            .iter()
            .filter(|job| job.status == StoredJobStatus::Pending)
            .count()
    }

    pub(crate) async fn completed_purchase_count(&self) -> usize {
        self.inner.lock().await.purchases.len()
    }

    pub(crate) async fn grant_count_for_user(&self, user_id: UserId) -> usize {
        self.inner
            .lock()
            .await
            .grants
            .values()
            .filter(|grant| grant.user_id() == user_id)
            .count()
    }

    pub(crate) async fn tasks(&self) -> Vec<ManualTask> {
        self.inner.lock().await.tasks.clone()
    }

    pub(crate) async fn backdate_active_credential(&self, created_at: DateTime<Utc>) {
        let mut state = self.inner.lock().await;
        for credential in state
            .credentials
            .iter_mut()
            .filter(|credential| credential.metadata.is_active)
        {
            credential.metadata.created_at = created_at;
        }
    }
}

#[async_trait]
impl AuditRepository for InMemoryStore {
    async fn append_event(&self, event: AuditEvent) -> AppResult<()> {
        self.inner.lock().await.audit.push(event);
        Ok(())
    }
}

#[async_trait]
impl AccessGrantRepository for InMemoryStore {
    async fn find_grant(&self, grant_id: AccessGrantId) -> AppResult<Option<AccessGrant>> {
        Ok(self.inner.lock().await.grants.get(&grant_id).cloned())
    }

    async fn find_grant_target(&self, grant_id: AccessGrantId) -> AppResult<Option<GrantTarget>> {
        let state = self.inner.lock().await;
        let Some(grant) = state.grants.get(&grant_id).cloned() else {
            return Ok(None);
        };
        let user = state.users.get(&grant.user_id());
        let resource = state
            .resources
            .iter()
            .find(|resource| resource.id == grant.resource_id())
            .cloned()
            .ok_or_else(|| AppError::NotFound("resource".to_owned()))?;

        Ok(Some(GrantTarget {
            user_email: user.map(|user| user.email.clone()),
            external_username: user.and_then(|user| user.external_username.clone()),
            grant,
            resource,
        }))
    }

    async fn save_grant(&self, grant: &AccessGrant, audit: Option<AuditEvent>) -> AppResult<()> {
        let mut state = self.inner.lock().await;
        state.store_grant(grant)?;
        if let Some(audit) = audit {
            state.audit.push(audit);
        }
        Ok(())
    }

    async fn save_grant_for_job(
        &self,
        grant: &AccessGrant,
        fence: GrantWriteFence,
        audit: Option<AuditEvent>,
    ) -> AppResult<bool> {
        let mut state = self.inner.lock().await;
        let owned = state.grants.get(&grant.id()).is_some_and(|stored| {
            stored.job_id() == Some(fence.job_id) && stored.status() == fence.expected_status
        });
        if !owned {
            return Ok(false);
        }

        state.store_grant(grant)?;
        if let Some(audit) = audit {
            state.audit.push(audit);
        }
        Ok(true)
    }

    async fn list_resumable_grant_ids(&self) -> AppResult<Vec<AccessGrantId>> {
        let state = self.inner.lock().await;
        Ok(state
            .grants
            .values()
            .filter(|grant| grant.is_pending())
            .filter(|grant| {
                !state.tasks.iter().any(|task| {
                    task.access_grant_id() == Some(grant.id())
                        && task.status() == ManualTaskStatus::Pending
                })
            })
            .map(AccessGrant::id)
            .collect())
    }
}

#[async_trait]
impl JobQueue for InMemoryStore {
    async fn enqueue(&self, job: EnqueueProvisioningJob) -> AppResult<JobId> {
        self.inner.lock().await.enqueue(job)
    }

    async fn claim_jobs(
        &self,
        _worker_id: &str,
        limit: usize,
        _lease_seconds: u32,
    ) -> AppResult<Vec<ClaimedProvisioningJob>> {
        let mut state = self.inner.lock().await;
        let mut claimed = Vec::new();
        let mut counter = state.lease_counter;
        for job in state
            .jobs
            .iter_mut()
            .filter(|job| job.status == StoredJobStatus::Pending)
            .take(limit)
        {
            counter += 1;
            let lease_token = format!("lease-{counter}");
            job.status = StoredJobStatus::Running;
            job.lease_token = Some(lease_token.clone());
            claimed.push(ClaimedProvisioningJob {
                job_id: job.job_id,
                access_grant_id: job.access_grant_id,
                action: job.action,
                attempts: job.attempts,
                deferrals: job.deferrals,
                lease_token,
            });
        }
        state.lease_counter = counter;
        Ok(claimed)
    }

    async fn complete_job(
        &self,
        job_id: JobId,
        _worker_id: &str,
        lease_token: &str,
    ) -> AppResult<()> {
        let mut state = self.inner.lock().await;
        state.running_job(job_id, lease_token)?.status = StoredJobStatus::Completed;
        Ok(())
    }

    async fn retry_job(
        &self,
        job_id: JobId,
        _worker_id: &str,
        lease_token: &str,
        delay: Duration,
        _error_message: &str,
    ) -> AppResult<()> {
        let mut state = self.inner.lock().await;
        let job = state.running_job(job_id, lease_token)?;
        job.status = StoredJobStatus::Pending;
        job.attempts += 1;
        job.delay = delay;
        job.lease_token = None;
        Ok(())
    }

    async fn defer_job(
        &self,
        job_id: JobId,
        _worker_id: &str,
        lease_token: &str,
        delay: Duration,
        _reason: &str,
    ) -> AppResult<()> {
        let mut state = self.inner.lock().await;
        let job = state.running_job(job_id, lease_token)?;
        job.status = StoredJobStatus::Pending;
        job.deferrals += 1;
        job.delay = delay;
        job.lease_token = None;
        Ok(())
    }

    async fn fail_job(
        &self,
        job_id: JobId,
        _worker_id: &str,
        lease_token: &str,
        _error_message: &str,
    ) -> AppResult<()> {
        let mut state = self.inner.lock().await;
        state.running_job(job_id, lease_token)?.status = StoredJobStatus::Failed;
        Ok(())
    }
}

#[async_trait]
impl ManualTaskRepository for InMemoryStore {
    async fn create_pending_task(
        &self,
        task: ManualTask,
        audit: AuditEvent,
    ) -> AppResult<ManualTaskCreation> {
        let mut state = self.inner.lock().await;
        if task.access_grant_id().is_some()
            && let Some(existing) = state.tasks.iter().find(|existing| {
                existing.access_grant_id() == task.access_grant_id()
                    && existing.task_type() == task.task_type()
                    && existing.status() == ManualTaskStatus::Pending
            })
        {
            return Ok(ManualTaskCreation::AlreadyPending(existing.clone()));
        }

        state.tasks.push(task.clone());
        state.audit.push(audit);
        Ok(ManualTaskCreation::Created(task))
    }

    async fn find_pending_task_for_grant(
        &self,
        grant_id: AccessGrantId,
        task_type: ManualTaskType,
    ) -> AppResult<Option<ManualTask>> {
        Ok(self
            .inner
            .lock()
            .await
            .tasks
            .iter()
            .find(|task| {
                task.access_grant_id() == Some(grant_id)
                    && task.task_type() == task_type
                    && task.status() == ManualTaskStatus::Pending
            })
            .cloned())
    }

    async fn find_task(&self, task_id: ManualTaskId) -> AppResult<Option<ManualTask>> {
        Ok(self
            .inner
            .lock()
            .await
            .tasks
            .iter()
            .find(|task| task.id() == task_id)
            .cloned())
    }

    async fn list_pending_tasks(&self) -> AppResult<Vec<ManualTask>> {
        Ok(self
            .inner
            .lock()
            .await
            .tasks
            .iter()
            .filter(|task| task.status() == ManualTaskStatus::Pending)
            .cloned()
            .collect())
    }

    async fn close_task(
        &self,
        task: &ManualTask,
        grant: Option<&AccessGrant>,
        audit: Vec<AuditEvent>,
    ) -> AppResult<()> {
        let mut state = self.inner.lock().await;
        let stored = state
            .tasks
            .iter_mut()
            .find(|stored| stored.id() == task.id())
            .ok_or_else(|| AppError::NotFound(format!("manual task '{}'", task.id())))?;
        if stored.status() != ManualTaskStatus::Pending {
            return Err(AppError::Conflict(format!(
                "manual task '{}' is already closed",
                task.id()
            )));
        }
        *stored = task.clone();

        if let Some(grant) = grant {
            state.store_grant(grant)?;
        }
        state.audit.extend(audit);
        Ok(())
    }
}

#[async_trait]
impl FanoutRepository for InMemoryStore {
    async fn complete_purchase(&self, input: CompletePurchaseInput) -> AppResult<FanoutOutcome> {
        let mut state = self.inner.lock().await;
        let key = input.checkout_session_id.as_str().to_owned();
        if let Some(purchase_id) = state.purchases.get(&key) {
            return Ok(FanoutOutcome::AlreadyProcessed {
                purchase_id: Some(*purchase_id),
            });
        }

        let purchase_id = PurchaseId::new();
        state.purchases.insert(key, purchase_id);

        let resource_ids: Vec<ProtectedResourceId> = state
            .resources
            .iter()
            .filter(|resource| resource.is_active)
            .map(|resource| resource.id)
            .collect();

        let mut access_grant_ids = Vec::new();
        for resource_id in resource_ids {
            let existing = state
                .grants
                .values()
                .find(|grant| grant.user_id() == input.user_id && grant.resource_id() == resource_id)
                .cloned();

            let grant_id = match existing {
                Some(grant) if grant.status() == AccessGrantStatus::Granted => continue,
                Some(grant) => {
                    let mut parts = grant.parts().clone();
                    parts.status = AccessGrantStatus::Pending;
                    parts.retry_count = 0;
                    parts.failure_reason = None;
                    state.grants.insert(grant.id(), AccessGrant::from_parts(parts)?);
                    grant.id()
                }
                None => {
                    let grant = AccessGrant::pending(input.user_id, resource_id, Utc::now());
                    let grant_id = grant.id();
                    state.grants.insert(grant_id, grant);
                    grant_id
                }
            };

            state.enqueue(EnqueueProvisioningJob {
                access_grant_id: grant_id,
                action: ProvisioningAction::Grant,
                delay: Duration::ZERO,
            })?;
            access_grant_ids.push(grant_id);
        }

        state.audit.push(AuditEvent::new(
            input.subject,
            AuditAction::PurchaseCompleted,
            "purchase",
            purchase_id,
        ));

        Ok(FanoutOutcome::Processed {
            purchase_id,
            access_grant_ids,
        })
    }
}

#[async_trait]
impl ProvisioningStateRepository for InMemoryStore {
    async fn load_state(&self) -> AppResult<ProvisioningState> {
        Ok(self.inner.lock().await.provisioning_state.clone())
    }

    async fn degrade(
        &self,
        reason: &str,
        metadata: Value,
        subject: &str,
    ) -> AppResult<(ProvisioningState, DegradeTransition)> {
        let mut state = self.inner.lock().await;
        let transition = state
            .provisioning_state
            .degrade(reason, metadata, Utc::now());
        if transition.is_new_incident() {
            state.audit.push(AuditEvent::new(
                subject,
                AuditAction::ProvisioningDegraded,
                "provisioning_state",
                transition.incident_id(),
            ));
        }
        Ok((state.provisioning_state.clone(), transition))
    }

    async fn recover(&self, subject: &str) -> AppResult<(ProvisioningState, RecoverTransition)> {
        let mut state = self.inner.lock().await;
        let transition = state.provisioning_state.recover(subject, Utc::now());
        state.audit.push(AuditEvent::new(
            subject,
            AuditAction::ProvisioningRecovered,
            "provisioning_state",
            "provisioning_state",
        ));
        Ok((state.provisioning_state.clone(), transition))
    }
}

#[async_trait]
impl CredentialRepository for InMemoryStore {
    async fn find_active_credential(&self) -> AppResult<Option<StoredCredential>> {
        Ok(self
            .inner
            .lock()
            .await
            .credentials
            .iter()
            .find(|credential| credential.metadata.is_active)
            .cloned())
    }

    async fn replace_active_credential(
        &self,
        credential: NewCredential,
        audit: AuditEvent,
    ) -> AppResult<CredentialMetadata> {
        let mut state = self.inner.lock().await;
        for existing in state.credentials.iter_mut() {
            existing.metadata.is_active = false;
        }

        let metadata = CredentialMetadata {
            id: CredentialId::new(),
            api_url: credential.api_url,
            is_active: true,
            validated_at: Some(credential.validated_at),
            last_used_at: None,
            created_by: credential.created_by,
            created_at: Utc::now(),
        };
        state.credentials.push(StoredCredential {
            metadata: metadata.clone(),
            secrets: credential.secrets,
        });
        let mut audit = audit;
        audit.resource_id = metadata.id.to_string();
        state.audit.push(audit);
        Ok(metadata)
    }

    async fn touch_last_used(&self, used_at: DateTime<Utc>) -> AppResult<()> {
        let mut state = self.inner.lock().await;
        for credential in state
            .credentials
            .iter_mut()
            .filter(|credential| credential.metadata.is_active)
        {
            credential.metadata.last_used_at = Some(used_at);
        }
        Ok(())
    }
}

#[async_trait]
impl ProvisioningStatsRepository for InMemoryStore {
    async fn provisioning_stats(&self) -> AppResult<ProvisioningStats> {
        let state = self.inner.lock().await;
        let mut stats = ProvisioningStats::default();
        for grant in state.grants.values() {
            match grant.status() {
                AccessGrantStatus::Pending => stats.pending += 1,
                AccessGrantStatus::Granted => stats.granted += 1,
                AccessGrantStatus::Failed => stats.failed += 1,
                AccessGrantStatus::Revoked => stats.revoked += 1,
            }
        }
        stats.manual_task_count = state
            .tasks
            .iter()
            .filter(|task| task.status() == ManualTaskStatus::Pending)
            .count() as u64;
        Ok(stats)
    }
}

#[derive(Default)]
pub(crate) struct RecordingNotifier {
    pub(crate) granted: Mutex<Vec<AccessNotice>>,
    pub(crate) failed: Mutex<Vec<AccessNotice>>,
    pub(crate) alerts: Mutex<Vec<OperatorAlert>>,
}

#[async_trait]
impl ProvisioningNotifier for RecordingNotifier {
    async fn access_granted(&self, notice: &AccessNotice) -> AppResult<()> {
        self.granted.lock().await.push(notice.clone());
        Ok(())
    }

    async fn access_failed(&self, notice: &AccessNotice) -> AppResult<()> {
        self.failed.lock().await.push(notice.clone());
        Ok(())
    }

    async fn operator_alert(&self, alert: &OperatorAlert) -> AppResult<()> {
        self.alerts.lock().await.push(alert.clone());
        Ok(())
    }
}

/// Parks the next grant call until released.
#[derive(Clone, Default)]
pub(crate) struct GrantGate {
    pub(crate) entered: Arc<Notify>,
    pub(crate) release: Arc<Notify>,
}

/// Provider returning scripted grant outcomes, then a default.
pub(crate) struct ScriptedProvider {
    kind: ProviderKind,
    configured: bool,
    grant_outcomes: Mutex<VecDeque<ProviderOutcome>>,
    default_outcome: Mutex<ProviderOutcome>,
    grant_gate: Mutex<Option<GrantGate>>,
    pub(crate) calls: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    pub(crate) fn new(kind: ProviderKind, default_outcome: ProviderOutcome) -> Self {
        Self {
            kind,
            configured: true,
            grant_outcomes: Mutex::new(VecDeque::new()),
            default_outcome: Mutex::new(default_outcome),
            grant_gate: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn unconfigured(mut self) -> Self {
        self.configured = false;
        self
    }

    pub(crate) async fn push_outcome(&self, outcome: ProviderOutcome) {
        self.grant_outcomes.lock().await.push_back(outcome);
    }

    pub(crate) async fn set_default(&self, outcome: ProviderOutcome) {
        *self.default_outcome.lock().await = outcome;
    }

    /// The next `grant_access` call signals `entered` and waits for `release`.
    pub(crate) async fn hold_next_grant(&self) -> GrantGate {
        let gate = GrantGate::default();
        *self.grant_gate.lock().await = Some(gate.clone());
        gate
    }

    pub(crate) async fn call_count(&self) -> usize {
        self.calls.lock().await.len()
    }

    async fn next_outcome(&self) -> ProviderOutcome {
        match self.grant_outcomes.lock().await.pop_front() {
            Some(outcome) => outcome,
            None => self.default_outcome.lock().await.clone(),
        }
    }
}

#[async_trait]
impl AccessProvider for ScriptedProvider {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    async fn is_configured(&self) -> bool {
        self.configured
    }

    async fn validate_username(&self, username: &str) -> AppResult<ProviderOutcome> {
        self.calls.lock().await.push(format!("validate:{username}"));
        Ok(ProviderOutcome::Succeeded)
    }

    async fn grant_access(&self, request: &ProvisioningRequest) -> AppResult<ProviderOutcome> {
        self.calls
            .lock()
            .await
            .push(format!("grant:{}", request.username));

        let gate = self.grant_gate.lock().await.take();
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }

        Ok(self.next_outcome().await)
    }

    async fn revoke_access(&self, request: &ProvisioningRequest) -> AppResult<ProviderOutcome> {
        self.calls
            .lock()
            .await
            .push(format!("revoke:{}", request.username));
        Ok(self.next_outcome().await)
    }
}

/// Reversible toy cipher with per-call nonces and a checksum tag.
#[derive(Default)]
pub(crate) struct FakeEncryptor {
    nonce: AtomicU8,
    pub(crate) broken: AtomicBool,
    pub(crate) decrypts: AtomicUsize,
}

impl SecretEncryptor for FakeEncryptor {
    fn encrypt_secret(&self, plaintext: &[u8]) -> AppResult<EncryptedSecret> {
        let nonce = self.nonce.fetch_add(1, Ordering::SeqCst).wrapping_add(1);
        let ciphertext: Vec<u8> = plaintext.iter().map(|byte| byte ^ nonce).collect();
        let checksum = ciphertext
            .iter()
            .fold(nonce, |accumulator, byte| accumulator.wrapping_add(*byte));
        Ok(EncryptedSecret {
            ciphertext,
            iv: [nonce; 12],
            tag: [checksum; 16],
        })
    }

    fn decrypt_secret(&self, secret: &EncryptedSecret) -> AppResult<Vec<u8>> {
        self.decrypts.fetch_add(1, Ordering::SeqCst);
        if self.broken.load(Ordering::SeqCst) {
            return Err(AppError::Internal("failed to decrypt secret".to_owned()));
        }
        let nonce = secret.iv[0];
        let checksum = secret
            .ciphertext
            .iter()
            .fold(nonce, |accumulator, byte| accumulator.wrapping_add(*byte));
        if secret.tag != [checksum; 16] {
            return Err(AppError::Internal("authentication tag mismatch".to_owned()));
        }
        Ok(secret.ciphertext.iter().map(|byte| byte ^ nonce).collect())
    }
}

pub(crate) struct FakeValidator {
    pub(crate) result: Mutex<CredentialValidation>,
}

impl Default for FakeValidator {
    fn default() -> Self {
        Self {
            result: Mutex::new(CredentialValidation::Valid),
        }
    }
}

#[async_trait]
impl UpstreamCredentialValidator for FakeValidator {
    async fn validate(&self, _session: &UpstreamSession) -> AppResult<CredentialValidation> {
        Ok(self.result.lock().await.clone())
    }
}

/// Fully wired services over one in-memory store.
pub(crate) struct Harness {
    pub(crate) store: Arc<InMemoryStore>,
    pub(crate) notifier: Arc<RecordingNotifier>,
    pub(crate) provider: Arc<ScriptedProvider>,
    pub(crate) state_service: ProvisioningStateService,
    pub(crate) manual_task_service: ManualTaskService,
    pub(crate) job_service: ProvisioningJobService,
}

impl Harness {
    pub(crate) fn new(provider: ScriptedProvider) -> Self {
        let store = Arc::new(InMemoryStore::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let provider = Arc::new(provider);

        let resume_service = ResumeService::new(
            store.clone(),
            store.clone(),
            store.clone(),
            RetryPolicy::default(),
        );
        let state_service =
            ProvisioningStateService::new(store.clone(), notifier.clone(), resume_service);
        let manual_task_service =
            ManualTaskService::new(store.clone(), store.clone(), notifier.clone());
        let selector = ProviderSelector::new(
            Arc::new(ManualAccessProvider::new(manual_task_service.clone())),
            PrimaryProviderSetting::Auto,
            ProviderKind::Manual,
        )
        .with_provider(provider.clone());
        let job_service = ProvisioningJobService::new(
            store.clone(),
            store.clone(),
            notifier.clone(),
            state_service.clone(),
            manual_task_service.clone(),
            selector,
        );

        Self {
            store,
            notifier,
            provider,
            state_service,
            manual_task_service,
            job_service,
        }
    }

    /// Seeds a user, an auto-provisioned resource and one pending grant.
    pub(crate) async fn seed_grant(&self, auto_provisioning: bool) -> ClaimedProvisioningJob {
        let user_id = UserId::new();
        self.store.add_user(user_id, Some("trader_joe")).await;
        let resource_id = self
            .store
            .add_resource("Signals", true, auto_provisioning)
            .await;
        self.store.seed_pending_grant(user_id, resource_id).await
    }
}

pub(crate) fn timeout() -> ProviderOutcome {
    ProviderOutcome::TransientFailure {
        reason: "upstream request timed out".to_owned(),
    }
}

pub(crate) fn session_expired() -> ProviderOutcome {
    ProviderOutcome::AuthError {
        status: Some(401),
        reason: "session expired".to_owned(),
    }
}
