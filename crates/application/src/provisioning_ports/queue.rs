use std::time::Duration;

use async_trait::async_trait;
use grantry_core::AppResult;
use grantry_domain::{AccessGrantId, JobId, ProvisioningAction};

/// Request to schedule one provisioning job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnqueueProvisioningJob {
    /// Grant to act on.
    pub access_grant_id: AccessGrantId,
    /// Grant or revoke.
    pub action: ProvisioningAction,
    /// Delay before the job becomes claimable.
    pub delay: Duration,
}

/// Claimed queue job for one worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimedProvisioningJob {
    /// Job identifier.
    pub job_id: JobId,
    /// Grant to act on.
    pub access_grant_id: AccessGrantId,
    /// Grant or revoke.
    pub action: ProvisioningAction,
    /// Ordinary failed attempts so far.
    pub attempts: u32,
    /// Outage deferrals so far.
    pub deferrals: u32,
    /// Lease token fencing the claim.
    pub lease_token: String,
}

/// How the queue should finalize a processed job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobDisposition {
    /// Nothing left to do.
    Completed,
    /// Ordinary failure; counts toward the attempt cap.
    Retry {
        /// Backoff before the next attempt.
        delay: Duration,
    },
    /// Outage deferral; never counts toward the attempt cap.
    Defer {
        /// Backoff before the next attempt.
        delay: Duration,
    },
    /// Terminal failure.
    Failed,
}

/// Durable provisioning job queue.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Schedules a job, supersedes older pending jobs for the grant and
    /// points the grant's `job_id` at the new job.
    async fn enqueue(&self, job: EnqueueProvisioningJob) -> AppResult<JobId>;

    /// Claims due jobs, including jobs whose lease expired.
    async fn claim_jobs(
        &self,
        worker_id: &str,
        limit: usize,
        lease_seconds: u32,
    ) -> AppResult<Vec<ClaimedProvisioningJob>>;

    /// Marks a claimed job completed.
    async fn complete_job(&self, job_id: JobId, worker_id: &str, lease_token: &str)
    -> AppResult<()>;

    /// Reschedules a claimed job after an ordinary failure.
    async fn retry_job(
        &self,
        job_id: JobId,
        worker_id: &str,
        lease_token: &str,
        delay: Duration,
        error_message: &str,
    ) -> AppResult<()>;

    /// Reschedules a claimed job after an outage deferral.
    async fn defer_job(
        &self,
        job_id: JobId,
        worker_id: &str,
        lease_token: &str,
        delay: Duration,
        reason: &str,
    ) -> AppResult<()>;

    /// Marks a claimed job terminally failed.
    async fn fail_job(
        &self,
        job_id: JobId,
        worker_id: &str,
        lease_token: &str,
        error_message: &str,
    ) -> AppResult<()>;
}
