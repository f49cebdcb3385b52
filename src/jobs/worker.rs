use std::time::Duration;

use sqlx::SqlitePool;
use tracing::{error, info, warn};

use crate::breaker::CircuitBreaker;
use crate::config::AppConfig;
use crate::jobs::{Job, JobKind, queue, tasks};

const LEASE_BATCH_SIZE: i64 = 10;

/// Process-wide worker state, built once at startup. No lazy construction
/// in the task loop.
pub struct WorkerContext {
    pub pool: SqlitePool,
    pub config: AppConfig,
    pub http: reqwest::Client,
    pub breaker: CircuitBreaker,
}

impl WorkerContext {
    pub fn new(pool: SqlitePool, config: AppConfig) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(2))
            .read_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(15))
            .pool_idle_timeout(Duration::from_secs(5))
            .build()?;
        let breaker = CircuitBreaker::from_config(&config);

        Ok(Self {
            pool,
            config,
            http,
            breaker,
        })
    }
}

/// Poll-lease-execute loop. Lease errors are logged and retried on the next
/// tick rather than taking the worker down.
pub async fn run(ctx: &WorkerContext) {
    info!(worker_id = %ctx.config.worker_id, "worker_started");
    let poll_interval = Duration::from_millis(ctx.config.poll_interval_ms);

    loop {
        let jobs = match queue::lease_jobs(
            &ctx.pool,
            &ctx.config.worker_id,
            LEASE_BATCH_SIZE,
            ctx.config.lease_ms,
        )
        .await
        {
            Ok(jobs) => jobs,
            Err(err) => {
                error!(error = %err, "lease_failed");
                tokio::time::sleep(poll_interval).await;
                continue;
            }
        };

        if jobs.is_empty() {
            tokio::time::sleep(poll_interval).await;
            continue;
        }

        for job in &jobs {
            handle_job(ctx, job).await;
        }
    }
}

pub async fn handle_job(ctx: &WorkerContext, job: &Job) {
    match tasks::run_job(ctx, job).await {
        Ok(()) => {
            if let Err(err) = queue::complete_job(&ctx.pool, job.id, &ctx.config.worker_id).await {
                error!(job_id = %job.id, error = %err, "complete_failed");
            }
        }
        Err(err) => {
            warn!(
                job_id = %job.id,
                kind = job.kind.as_str(),
                attempt = job.attempts,
                error = %err,
                "job_failed"
            );
            let max_attempts = max_attempts_for(&ctx.config, job.kind);
            match queue::fail_job(
                &ctx.pool,
                job,
                &ctx.config.worker_id,
                &err.to_string(),
                max_attempts,
            )
            .await
            {
                Ok(queue::RetryOutcome::Exhausted) => {
                    error!(job_id = %job.id, kind = job.kind.as_str(), "job_dead");
                }
                Ok(queue::RetryOutcome::Scheduled) => {}
                Err(err) => {
                    error!(job_id = %job.id, error = %err, "fail_job_failed");
                }
            }
        }
    }
}

pub fn max_attempts_for(config: &AppConfig, kind: JobKind) -> u32 {
    match kind {
        JobKind::DeliverWebhook => config.delivery_max_attempts,
        _ => config.job_max_attempts,
    }
}
