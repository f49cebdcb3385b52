#![allow(clippy::expect_used, clippy::unwrap_used)]

mod common;

use common::{
    count_events, count_jobs, format_ts, seed_device, seed_project, setup_db, worker_ctx,
};
use chrono::Utc;
use telemetry_backend::jobs::IngestJob;
use telemetry_backend::jobs::tasks::ingest;
use telemetry_backend::types::TelemetryEventIn;

fn event(ts: &str, data: serde_json::Value) -> TelemetryEventIn {
    TelemetryEventIn {
        ts: ts.to_string(),
        data,
    }
}

#[tokio::test]
async fn persists_batch_and_enqueues_one_evaluation() {
    let db = setup_db(1).await;
    let project_id = seed_project(&db.pool).await;
    let device_id = seed_device(&db.pool, project_id, &[]).await;
    let ctx = worker_ctx(db.pool.clone());

    let now = format_ts(Utc::now());
    let payload = IngestJob {
        device_id,
        events: vec![
            event(&now, serde_json::json!({"temperature": 80.0})),
            event(&now, serde_json::json!({"temperature": 81.0})),
            event(&now, serde_json::json!({"temperature": 82.0})),
        ],
    };

    let inserted = ingest::run(&ctx, &payload).await.expect("ingest");
    assert_eq!(inserted, 3);
    assert_eq!(count_events(&db.pool, device_id).await, 3);
    assert_eq!(count_jobs(&db.pool, "evaluate_rules").await, 1);
}

#[tokio::test]
async fn malformed_timestamp_is_dropped_not_fatal() {
    let db = setup_db(1).await;
    let project_id = seed_project(&db.pool).await;
    let device_id = seed_device(&db.pool, project_id, &[]).await;
    let ctx = worker_ctx(db.pool.clone());

    let now = format_ts(Utc::now());
    let payload = IngestJob {
        device_id,
        events: vec![
            event(&now, serde_json::json!({"temperature": 80.0})),
            event("invalid-timestamp", serde_json::json!({"temperature": 99.0})),
            event(&now, serde_json::json!({"temperature": 82.0})),
        ],
    };

    let inserted = ingest::run(&ctx, &payload).await.expect("ingest");
    assert_eq!(inserted, 2);
    assert_eq!(count_events(&db.pool, device_id).await, 2);
    assert_eq!(count_jobs(&db.pool, "evaluate_rules").await, 1);
}

#[tokio::test]
async fn batch_of_only_malformed_events_skips_evaluation() {
    let db = setup_db(1).await;
    let project_id = seed_project(&db.pool).await;
    let device_id = seed_device(&db.pool, project_id, &[]).await;
    let ctx = worker_ctx(db.pool.clone());

    let payload = IngestJob {
        device_id,
        events: vec![
            event("not-a-time", serde_json::json!({})),
            event("also-bad", serde_json::json!({})),
        ],
    };

    let inserted = ingest::run(&ctx, &payload).await.expect("ingest");
    assert_eq!(inserted, 0);
    assert_eq!(count_events(&db.pool, device_id).await, 0);
    assert_eq!(count_jobs(&db.pool, "evaluate_rules").await, 0);
}

#[tokio::test]
async fn empty_batch_is_a_no_op() {
    let db = setup_db(1).await;
    let project_id = seed_project(&db.pool).await;
    let device_id = seed_device(&db.pool, project_id, &[]).await;
    let ctx = worker_ctx(db.pool.clone());

    let payload = IngestJob {
        device_id,
        events: Vec::new(),
    };

    let inserted = ingest::run(&ctx, &payload).await.expect("ingest");
    assert_eq!(inserted, 0);
    assert_eq!(count_jobs(&db.pool, "evaluate_rules").await, 0);
}

#[tokio::test]
async fn event_data_defaults_to_empty_object() {
    let db = setup_db(1).await;
    let project_id = seed_project(&db.pool).await;
    let device_id = seed_device(&db.pool, project_id, &[]).await;
    let ctx = worker_ctx(db.pool.clone());

    let now = format_ts(Utc::now());
    let payload: IngestJob = serde_json::from_value(serde_json::json!({
        "device_id": device_id,
        "events": [{"ts": now}],
    }))
    .expect("parse job payload");

    let inserted = ingest::run(&ctx, &payload).await.expect("ingest");
    assert_eq!(inserted, 1);

    let events =
        telemetry_backend::store::telemetry::list_latest_events(&db.pool, device_id, 10)
            .await
            .expect("list events");
    assert_eq!(events[0].payload, serde_json::json!({}));
}
