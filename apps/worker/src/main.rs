//! Grantry provisioning worker runtime.

#![forbid(unsafe_code)]

mod runtime;
mod worker_config;

use std::time::Duration;

use grantry_application::{JobDisposition, ProvisioningJobService};
use grantry_core::{AppError, AppResult};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::worker_config::WorkerConfig;

#[derive(Debug, Default)]
struct BatchSummary {
    completed: u32,
    retried: u32,
    deferred: u32,
    failed: u32,
    errored: u32,
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = WorkerConfig::load()?;
    let pool = connect_pool(config.database_url.as_str()).await?;
    let job_service = runtime::build_job_service(pool, &config)?;

    info!(
        worker_id = %config.worker_id,
        claim_limit = config.claim_limit,
        lease_seconds = config.lease_seconds,
        poll_interval_ms = config.poll_interval.as_millis(),
        "grantry-worker started"
    );

    let mut shutdown = listen_for_shutdown();

    // Shutdown is only observed between batches so claimed jobs are finalized.
    loop {
        let idle = match poll_once(&job_service, &config).await {
            Ok(claimed_count) => claimed_count == 0,
            Err(error) => {
                warn!(
                    worker_id = %config.worker_id,
                    error = %error,
                    "failed to claim provisioning jobs"
                );
                true
            }
        };

        if !wait_before_next_poll(idle, config.poll_interval, &mut shutdown).await {
            info!(worker_id = %config.worker_id, "grantry-worker shutting down");
            return Ok(());
        }
    }
}

/// Registers the Ctrl-C handler up front and flips the returned flag once.
fn listen_for_shutdown() -> watch::Receiver<bool> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                let _ = shutdown_tx.send(true);
            }
            Err(error) => warn!(error = %error, "failed to listen for shutdown signal"),
        }
    });
    shutdown_rx
}

/// Returns `false` once shutdown was requested. Idle workers sleep for the
/// poll interval unless the signal arrives first.
async fn wait_before_next_poll(
    idle: bool,
    poll_interval: Duration,
    shutdown: &mut watch::Receiver<bool>,
) -> bool {
    if *shutdown.borrow_and_update() {
        return false;
    }

    if !idle {
        return true;
    }

    tokio::select! {
        biased;
        changed = shutdown.changed() => match changed {
            Ok(()) => !*shutdown.borrow_and_update(),
            Err(_) => {
                tokio::time::sleep(poll_interval).await;
                true
            }
        },
        () = tokio::time::sleep(poll_interval) => true,
    }
}

/// Claims one batch and processes it concurrently. Returns the batch size.
async fn poll_once(job_service: &ProvisioningJobService, config: &WorkerConfig) -> AppResult<usize> {
    let claimed_jobs = job_service
        .claim_jobs_for_worker(
            config.worker_id.as_str(),
            config.claim_limit,
            config.lease_seconds,
        )
        .await?;
    let claimed_count = claimed_jobs.len();
    if claimed_count == 0 {
        return Ok(0);
    }

    info!(
        worker_id = %config.worker_id,
        claimed_count,
        "claimed provisioning jobs"
    );

    let mut tasks = JoinSet::new();
    for job in claimed_jobs {
        let job_service = job_service.clone();
        let worker_id = config.worker_id.clone();
        tasks.spawn(async move {
            let job_id = job.job_id;
            let grant_id = job.access_grant_id;
            let action = job.action;
            let result = job_service
                .execute_claimed_job(worker_id.as_str(), job)
                .await;
            (job_id, grant_id, action, result)
        });
    }

    let mut summary = BatchSummary::default();
    while let Some(joined) = tasks.join_next().await {
        let (job_id, grant_id, action, result) = match joined {
            Ok(outcome) => outcome,
            Err(error) => {
                summary.errored = summary.errored.saturating_add(1);
                warn!(
                    worker_id = %config.worker_id,
                    error = %error,
                    "provisioning job task panicked or was cancelled"
                );
                continue;
            }
        };

        match result {
            Ok(disposition) => {
                let counter = match disposition {
                    JobDisposition::Completed => &mut summary.completed,
                    JobDisposition::Retry { .. } => &mut summary.retried,
                    JobDisposition::Defer { .. } => &mut summary.deferred,
                    JobDisposition::Failed => &mut summary.failed,
                };
                *counter = counter.saturating_add(1);
                info!(
                    worker_id = %config.worker_id,
                    job_id = %job_id,
                    grant_id = %grant_id,
                    action = action.as_str(),
                    disposition = ?disposition,
                    "provisioning job processed"
                );
            }
            Err(error) => {
                summary.errored = summary.errored.saturating_add(1);
                warn!(
                    worker_id = %config.worker_id,
                    job_id = %job_id,
                    grant_id = %grant_id,
                    error = %error,
                    "provisioning job execution failed"
                );
            }
        }
    }

    info!(
        worker_id = %config.worker_id,
        completed = summary.completed,
        retried = summary.retried,
        deferred = summary.deferred,
        failed = summary.failed,
        errored = summary.errored,
        "provisioning batch finished"
    );

    Ok(claimed_count)
}

async fn connect_pool(database_url: &str) -> AppResult<PgPool> {
    PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
        .map_err(|error| AppError::Internal(format!("failed to connect to database: {error}")))
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}
