#![allow(clippy::expect_used, clippy::unwrap_used)]

mod common;

use chrono::{Duration, Utc};
use common::{format_ts, setup_db};
use telemetry_backend::jobs::queue::{
    self, RetryOutcome, complete_job, enqueue, enqueue_at, fail_job, lease_jobs, schedule_retry,
};
use telemetry_backend::jobs::{EvaluateJob, Job, JobKind};
use uuid::Uuid;

fn evaluate_payload() -> EvaluateJob {
    EvaluateJob {
        device_id: Uuid::new_v4(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Leasing
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn lease_returns_pending_jobs_in_fifo_order() {
    let db = setup_db(1).await;

    let first = enqueue(&db.pool, JobKind::EvaluateRules, &evaluate_payload())
        .await
        .expect("enqueue");
    let second = enqueue(&db.pool, JobKind::EvaluateRules, &evaluate_payload())
        .await
        .expect("enqueue");

    let jobs = lease_jobs(&db.pool, "worker-1", 10, 30_000)
        .await
        .expect("lease");
    let ids: Vec<Uuid> = jobs.iter().map(|job| job.id).collect();
    assert_eq!(ids, vec![first, second]);
    assert!(jobs.iter().all(|job| job.attempts == 1));

    // Everything is leased; nothing left.
    let jobs = lease_jobs(&db.pool, "worker-2", 10, 30_000)
        .await
        .expect("lease");
    assert!(jobs.is_empty());
}

#[tokio::test]
async fn delayed_jobs_stay_hidden_until_run_at() {
    let db = setup_db(1).await;

    enqueue_at(
        &db.pool,
        JobKind::EvaluateRules,
        &evaluate_payload(),
        Utc::now() + Duration::hours(1),
    )
    .await
    .expect("enqueue delayed");
    let due = enqueue_at(
        &db.pool,
        JobKind::EvaluateRules,
        &evaluate_payload(),
        Utc::now() - Duration::seconds(1),
    )
    .await
    .expect("enqueue due");

    let jobs = lease_jobs(&db.pool, "worker-1", 10, 30_000)
        .await
        .expect("lease");
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].id, due);
}

#[tokio::test]
async fn expired_leases_are_requeued_for_other_workers() {
    let db = setup_db(1).await;

    let job_id = enqueue(&db.pool, JobKind::EvaluateRules, &evaluate_payload())
        .await
        .expect("enqueue");

    let jobs = lease_jobs(&db.pool, "worker-1", 10, 30_000)
        .await
        .expect("lease");
    assert_eq!(jobs.len(), 1);

    // The worker dies; its lease lapses.
    sqlx::query("UPDATE jobs SET lease_expires_at = ? WHERE id = ?")
        .bind(format_ts(Utc::now() - Duration::seconds(1)))
        .bind(job_id.to_string())
        .execute(&db.pool)
        .await
        .expect("expire lease");

    let jobs = lease_jobs(&db.pool, "worker-2", 10, 30_000)
        .await
        .expect("lease");
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].id, job_id);
    assert_eq!(jobs[0].attempts, 2);
}

#[tokio::test]
async fn completed_jobs_are_not_leased_again() {
    let db = setup_db(1).await;

    enqueue(&db.pool, JobKind::EvaluateRules, &evaluate_payload())
        .await
        .expect("enqueue");
    let jobs = lease_jobs(&db.pool, "worker-1", 10, 30_000)
        .await
        .expect("lease");
    complete_job(&db.pool, jobs[0].id, "worker-1")
        .await
        .expect("complete");

    // Even after the lease would have expired.
    sqlx::query("UPDATE jobs SET lease_expires_at = ? WHERE id = ?")
        .bind(format_ts(Utc::now() - Duration::seconds(1)))
        .bind(jobs[0].id.to_string())
        .execute(&db.pool)
        .await
        .expect("touch lease");

    let jobs = lease_jobs(&db.pool, "worker-2", 10, 30_000)
        .await
        .expect("lease");
    assert!(jobs.is_empty());
}

// ─────────────────────────────────────────────────────────────────────────────
// Retries
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn schedule_retry_delays_the_job() {
    let db = setup_db(1).await;

    enqueue(&db.pool, JobKind::DeliverWebhook, &evaluate_payload())
        .await
        .expect("enqueue");
    let jobs = lease_jobs(&db.pool, "worker-1", 10, 30_000)
        .await
        .expect("lease");

    let outcome = schedule_retry(&db.pool, &jobs[0], "worker-1", 60, 8)
        .await
        .expect("retry");
    assert_eq!(outcome, RetryOutcome::Scheduled);

    // Not runnable until the countdown elapses.
    let leased = lease_jobs(&db.pool, "worker-1", 10, 30_000)
        .await
        .expect("lease");
    assert!(leased.is_empty());

    let status: String = sqlx::query_scalar("SELECT status FROM jobs WHERE id = ?")
        .bind(jobs[0].id.to_string())
        .fetch_one(&db.pool)
        .await
        .expect("fetch status");
    assert_eq!(status, "pending");
}

#[tokio::test]
async fn schedule_retry_refuses_when_attempts_exhausted() {
    let db = setup_db(1).await;

    let job = Job {
        id: Uuid::new_v4(),
        kind: JobKind::DeliverWebhook,
        payload: serde_json::json!({}),
        attempts: 8,
    };

    let outcome = schedule_retry(&db.pool, &job, "worker-1", 60, 8)
        .await
        .expect("retry");
    assert_eq!(outcome, RetryOutcome::Exhausted);
}

#[tokio::test]
async fn fail_job_backs_off_then_goes_dead() {
    let db = setup_db(1).await;

    enqueue(&db.pool, JobKind::EvaluateRules, &evaluate_payload())
        .await
        .expect("enqueue");
    let jobs = lease_jobs(&db.pool, "worker-1", 10, 30_000)
        .await
        .expect("lease");

    let outcome = fail_job(&db.pool, &jobs[0], "worker-1", "db went away", 5)
        .await
        .expect("fail");
    assert_eq!(outcome, RetryOutcome::Scheduled);

    let (status, last_error): (String, String) =
        sqlx::query_as("SELECT status, last_error FROM jobs WHERE id = ?")
            .bind(jobs[0].id.to_string())
            .fetch_one(&db.pool)
            .await
            .expect("fetch job");
    assert_eq!(status, "pending");
    assert_eq!(last_error, "db went away");

    // Out of budget: the job dies.
    let exhausted = Job {
        attempts: 5,
        ..jobs[0].clone()
    };
    sqlx::query("UPDATE jobs SET leased_by = 'worker-1' WHERE id = ?")
        .bind(jobs[0].id.to_string())
        .execute(&db.pool)
        .await
        .expect("release");
    let outcome = fail_job(&db.pool, &exhausted, "worker-1", "still broken", 5)
        .await
        .expect("fail");
    assert_eq!(outcome, RetryOutcome::Exhausted);

    let (status, last_error): (String, String) =
        sqlx::query_as("SELECT status, last_error FROM jobs WHERE id = ?")
            .bind(jobs[0].id.to_string())
            .fetch_one(&db.pool)
            .await
            .expect("fetch job");
    assert_eq!(status, "dead");
    assert!(last_error.starts_with("max_attempts_exceeded"));
}

#[tokio::test]
async fn retry_countdown_is_capped_exponential_with_jitter() {
    for retries in 0..12i64 {
        let base = (5i64 << retries.min(30)).min(1800);
        for _ in 0..5 {
            let delay = queue::retry_countdown_secs(retries);
            assert!(delay >= base, "delay {delay} below base {base}");
            assert!(
                delay <= base + base.min(30),
                "delay {delay} above base {base} plus jitter"
            );
        }
    }
}
