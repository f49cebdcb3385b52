//! Database-backed job queue with at-least-once dispatch.
//!
//! Jobs are leased with an expiry; a worker that dies mid-task loses its
//! lease and the job becomes eligible again. Delayed execution is a
//! `run_at` bound. Tasks therefore must tolerate running more than once,
//! which every state transition in this crate does.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::Serialize;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::jobs::{Job, JobKind};
use crate::store::{StoreError, format_utc, now_str, parse_json, parse_uuid};

/// Exponential backoff with jitter for task-requested retries:
/// `min(1800, 5 * 2^r) + U(0, min(30, delay))`, `r` zero-based.
pub fn retry_countdown_secs(retries: i64) -> i64 {
    let retries = retries.clamp(0, 30) as u32;
    let delay = (5i64 << retries).min(1800);
    let jitter = rand::thread_rng().gen_range(0..=delay.min(30));
    delay + jitter
}

pub async fn enqueue<T: Serialize>(
    pool: &SqlitePool,
    kind: JobKind,
    payload: &T,
) -> Result<Uuid, StoreError> {
    enqueue_inner(pool, kind, payload, None).await
}

pub async fn enqueue_at<T: Serialize>(
    pool: &SqlitePool,
    kind: JobKind,
    payload: &T,
    run_at: DateTime<Utc>,
) -> Result<Uuid, StoreError> {
    enqueue_inner(pool, kind, payload, Some(run_at)).await
}

async fn enqueue_inner<T: Serialize>(
    pool: &SqlitePool,
    kind: JobKind,
    payload: &T,
    run_at: Option<DateTime<Utc>>,
) -> Result<Uuid, StoreError> {
    let id = Uuid::new_v4();
    let payload = serde_json::to_string(payload)
        .map_err(|err| StoreError::Parse(format!("invalid job payload JSON: {err}")))?;

    sqlx::query(
        r#"
        INSERT INTO jobs (id, kind, payload, status, attempts, run_at, created_at)
        VALUES (?, ?, ?, 'pending', 0, ?, ?)
        "#,
    )
    .bind(id.to_string())
    .bind(kind.as_str())
    .bind(&payload)
    .bind(run_at.map(format_utc))
    .bind(now_str())
    .execute(pool)
    .await?;

    Ok(id)
}

/// Requeue expired leases, then atomically lease up to `limit` runnable
/// jobs for `worker_id`. Each lease bumps the job's attempt counter.
pub async fn lease_jobs(
    pool: &SqlitePool,
    worker_id: &str,
    limit: i64,
    lease_ms: i64,
) -> Result<Vec<Job>, StoreError> {
    let now = Utc::now();
    let now_str = format_utc(now);
    let lease_expires_at = format_utc(now + Duration::milliseconds(lease_ms));

    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        UPDATE jobs
        SET status = 'pending',
            lease_expires_at = NULL,
            leased_by = NULL
        WHERE status = 'in_flight'
          AND lease_expires_at IS NOT NULL
          AND lease_expires_at <= ?
        "#,
    )
    .bind(&now_str)
    .execute(&mut *tx)
    .await?;

    let leased_ids: Vec<String> = sqlx::query_scalar(
        r#"
        WITH eligible AS (
            SELECT id
            FROM jobs
            WHERE status = 'pending'
              AND (run_at IS NULL OR run_at <= ?)
            ORDER BY created_at ASC
            LIMIT ?
        )
        UPDATE jobs
        SET status = 'in_flight',
            attempts = attempts + 1,
            leased_by = ?,
            lease_expires_at = ?
        WHERE id IN (SELECT id FROM eligible)
          AND status = 'pending'
        RETURNING id
        "#,
    )
    .bind(&now_str)
    .bind(limit)
    .bind(worker_id)
    .bind(&lease_expires_at)
    .fetch_all(&mut *tx)
    .await?;

    if leased_ids.is_empty() {
        tx.commit().await?;
        return Ok(Vec::new());
    }

    let mut fetch = sqlx::QueryBuilder::new(
        "SELECT id, kind, payload, attempts FROM jobs WHERE id IN (",
    );
    let mut fetch_list = fetch.separated(", ");
    for id in &leased_ids {
        fetch_list.push_bind(id);
    }
    fetch_list.push_unseparated(")");

    let rows: Vec<JobRow> = fetch.build_query_as().fetch_all(&mut *tx).await?;

    tx.commit().await?;

    rows.into_iter().map(JobRow::try_into).collect()
}

pub async fn complete_job(
    pool: &SqlitePool,
    job_id: Uuid,
    worker_id: &str,
) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        UPDATE jobs
        SET status = 'done',
            lease_expires_at = NULL,
            leased_by = NULL
        WHERE id = ? AND leased_by = ?
        "#,
    )
    .bind(job_id.to_string())
    .bind(worker_id)
    .execute(pool)
    .await?;
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryOutcome {
    Scheduled,
    Exhausted,
}

/// Task-requested retry at `now + countdown`. When the job has already used
/// its attempt budget the queue refuses and the task handles the terminal
/// transition itself (the job then completes normally).
pub async fn schedule_retry(
    pool: &SqlitePool,
    job: &Job,
    worker_id: &str,
    countdown_secs: i64,
    max_attempts: u32,
) -> Result<RetryOutcome, StoreError> {
    if job.attempts >= i64::from(max_attempts) {
        return Ok(RetryOutcome::Exhausted);
    }

    let run_at = format_utc(Utc::now() + Duration::seconds(countdown_secs));
    sqlx::query(
        r#"
        UPDATE jobs
        SET status = 'pending',
            run_at = ?,
            lease_expires_at = NULL,
            leased_by = NULL
        WHERE id = ? AND leased_by = ?
        "#,
    )
    .bind(&run_at)
    .bind(job.id.to_string())
    .bind(worker_id)
    .execute(pool)
    .await?;

    Ok(RetryOutcome::Scheduled)
}

/// Queue-level retry for a task that errored. Backs off exponentially;
/// a job out of attempts goes to `dead`.
pub async fn fail_job(
    pool: &SqlitePool,
    job: &Job,
    worker_id: &str,
    error: &str,
    max_attempts: u32,
) -> Result<RetryOutcome, StoreError> {
    if job.attempts >= i64::from(max_attempts) {
        sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'dead',
                lease_expires_at = NULL,
                leased_by = NULL,
                last_error = ?
            WHERE id = ? AND leased_by = ?
            "#,
        )
        .bind(format!("max_attempts_exceeded ({max_attempts}): {error}"))
        .bind(job.id.to_string())
        .bind(worker_id)
        .execute(pool)
        .await?;
        return Ok(RetryOutcome::Exhausted);
    }

    let exponent = (job.attempts - 1).clamp(0, 31) as u32;
    let delay_secs = (1i64 << exponent).min(3600);
    let run_at = format_utc(Utc::now() + Duration::seconds(delay_secs));

    sqlx::query(
        r#"
        UPDATE jobs
        SET status = 'pending',
            run_at = ?,
            lease_expires_at = NULL,
            leased_by = NULL,
            last_error = ?
        WHERE id = ? AND leased_by = ?
        "#,
    )
    .bind(&run_at)
    .bind(error)
    .bind(job.id.to_string())
    .bind(worker_id)
    .execute(pool)
    .await?;

    Ok(RetryOutcome::Scheduled)
}

#[derive(sqlx::FromRow)]
struct JobRow {
    id: String,
    kind: String,
    payload: String,
    attempts: i64,
}

impl TryFrom<JobRow> for Job {
    type Error = StoreError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let kind = JobKind::parse(&row.kind)
            .ok_or_else(|| StoreError::Parse(format!("unknown job kind: {}", row.kind)))?;

        Ok(Job {
            id: parse_uuid("job id", &row.id)?,
            kind,
            payload: parse_json("job payload", &row.payload)?,
            attempts: row.attempts,
        })
    }
}
