#![allow(clippy::expect_used, clippy::unwrap_used)]

mod common;

use common::{
    count_alerts, rule_create, seed_device, seed_event, seed_project, seed_rule, seed_temperatures,
    setup_db,
};
use sqlx::SqlitePool;
use telemetry_backend::engine::evaluate_rules_for_device;
use telemetry_backend::types::RuleCreate;
use uuid::Uuid;

async fn alert_details(pool: &SqlitePool, alert_id: Uuid) -> serde_json::Value {
    let raw: String = sqlx::query_scalar("SELECT details FROM alerts WHERE id = ?")
        .bind(alert_id.to_string())
        .fetch_one(pool)
        .await
        .expect("fetch alert details");
    serde_json::from_str(&raw).expect("parse details")
}

// ─────────────────────────────────────────────────────────────────────────────
// k-of-n over a full window
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn full_window_of_matches_fires_once_and_respects_cooldown() {
    let db = setup_db(1).await;
    let project_id = seed_project(&db.pool).await;
    let device_id = seed_device(&db.pool, project_id, &[]).await;
    seed_rule(&db.pool, project_id, &rule_create("temperature", 5, 3, 300)).await;

    seed_temperatures(&db.pool, device_id, &[85.0, 85.0, 85.0, 85.0, 85.0]).await;

    let alert_ids = evaluate_rules_for_device(&db.pool, device_id)
        .await
        .expect("evaluate");
    assert_eq!(alert_ids.len(), 1);

    let details = alert_details(&db.pool, alert_ids[0]).await;
    assert_eq!(details["evaluation"]["match_count"], 5);
    assert_eq!(details["evaluation"]["considered"], 5);
    assert_eq!(details["evaluation"]["latest_value"], 85.0);
    assert_eq!(details["rule"]["metric"], "temperature");

    // Five more matching events inside the cooldown window: no new alert.
    seed_temperatures(&db.pool, device_id, &[85.0, 85.0, 85.0, 85.0, 85.0]).await;
    let alert_ids = evaluate_rules_for_device(&db.pool, device_id)
        .await
        .expect("evaluate again");
    assert!(alert_ids.is_empty());
    assert_eq!(count_alerts(&db.pool, device_id).await, 1);
}

#[tokio::test]
async fn exactly_k_matches_fires() {
    let db = setup_db(1).await;
    let project_id = seed_project(&db.pool).await;
    let device_id = seed_device(&db.pool, project_id, &[]).await;
    seed_rule(&db.pool, project_id, &rule_create("temperature", 5, 3, 300)).await;

    seed_temperatures(&db.pool, device_id, &[85.0, 75.0, 90.0, 70.0, 95.0]).await;

    let alert_ids = evaluate_rules_for_device(&db.pool, device_id)
        .await
        .expect("evaluate");
    assert_eq!(alert_ids.len(), 1);

    let details = alert_details(&db.pool, alert_ids[0]).await;
    assert_eq!(details["evaluation"]["match_count"], 3);
    assert_eq!(details["evaluation"]["latest_value"], 85.0);
}

#[tokio::test]
async fn below_k_matches_does_not_fire() {
    let db = setup_db(1).await;
    let project_id = seed_project(&db.pool).await;
    let device_id = seed_device(&db.pool, project_id, &[]).await;
    seed_rule(&db.pool, project_id, &rule_create("temperature", 5, 3, 300)).await;

    seed_temperatures(&db.pool, device_id, &[85.0, 75.0, 70.0, 70.0, 90.0]).await;

    let alert_ids = evaluate_rules_for_device(&db.pool, device_id)
        .await
        .expect("evaluate");
    assert!(alert_ids.is_empty());
}

#[tokio::test]
async fn short_window_never_fires() {
    let db = setup_db(1).await;
    let project_id = seed_project(&db.pool).await;
    let device_id = seed_device(&db.pool, project_id, &[]).await;
    seed_rule(&db.pool, project_id, &rule_create("temperature", 5, 3, 300)).await;

    // window_n - 1 events, all matching.
    seed_temperatures(&db.pool, device_id, &[85.0, 85.0, 85.0, 85.0]).await;

    let alert_ids = evaluate_rules_for_device(&db.pool, device_id)
        .await
        .expect("evaluate");
    assert!(alert_ids.is_empty());
}

#[tokio::test]
async fn non_numeric_entries_count_toward_neither_considered_nor_match() {
    let db = setup_db(1).await;
    let project_id = seed_project(&db.pool).await;
    let device_id = seed_device(&db.pool, project_id, &[]).await;
    seed_rule(&db.pool, project_id, &rule_create("temperature", 5, 3, 300)).await;

    seed_event(&db.pool, device_id, 0, serde_json::json!({"temperature": 85.0})).await;
    seed_event(&db.pool, device_id, 1, serde_json::json!({"temperature": "hot"})).await;
    seed_event(&db.pool, device_id, 2, serde_json::json!({"temperature": 90.0})).await;
    seed_event(&db.pool, device_id, 3, serde_json::json!({"humidity": 50.0})).await;
    seed_event(&db.pool, device_id, 4, serde_json::json!({"temperature": 95.0})).await;

    let alert_ids = evaluate_rules_for_device(&db.pool, device_id)
        .await
        .expect("evaluate");
    assert_eq!(alert_ids.len(), 1);

    let details = alert_details(&db.pool, alert_ids[0]).await;
    assert_eq!(details["evaluation"]["match_count"], 3);
    assert_eq!(details["evaluation"]["considered"], 3);
}

#[tokio::test]
async fn metric_numeric_nowhere_skips_rule() {
    let db = setup_db(1).await;
    let project_id = seed_project(&db.pool).await;
    let device_id = seed_device(&db.pool, project_id, &[]).await;
    seed_rule(&db.pool, project_id, &rule_create("temperature", 3, 1, 300)).await;

    for i in 0..3 {
        seed_event(&db.pool, device_id, i, serde_json::json!({"humidity": 99.0})).await;
    }

    let alert_ids = evaluate_rules_for_device(&db.pool, device_id)
        .await
        .expect("evaluate");
    assert!(alert_ids.is_empty());
}

// ─────────────────────────────────────────────────────────────────────────────
// Applicability scopes
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn tag_scope_follows_device_tags() {
    let db = setup_db(1).await;
    let project_id = seed_project(&db.pool).await;
    let device_id = seed_device(&db.pool, project_id, &["test", "temperature"]).await;

    let rule = RuleCreate {
        scope: "TAG".to_string(),
        tag: Some("temperature".to_string()),
        cooldown_seconds: 0,
        ..rule_create("temperature", 5, 3, 0)
    };
    seed_rule(&db.pool, project_id, &rule).await;

    seed_temperatures(&db.pool, device_id, &[85.0, 85.0, 85.0, 85.0, 85.0]).await;
    let alert_ids = evaluate_rules_for_device(&db.pool, device_id)
        .await
        .expect("evaluate");
    assert_eq!(alert_ids.len(), 1);

    // Retag the device so the rule no longer applies.
    telemetry_backend::store::device::set_tags(&db.pool, device_id, &["other".to_string()])
        .await
        .expect("set tags");
    seed_temperatures(&db.pool, device_id, &[85.0, 85.0, 85.0, 85.0, 85.0]).await;
    let alert_ids = evaluate_rules_for_device(&db.pool, device_id)
        .await
        .expect("evaluate");
    assert!(alert_ids.is_empty());
}

#[tokio::test]
async fn explicit_scope_requires_binding() {
    let db = setup_db(1).await;
    let project_id = seed_project(&db.pool).await;
    let device_id = seed_device(&db.pool, project_id, &[]).await;

    let rule = RuleCreate {
        scope: "EXPLICIT".to_string(),
        cooldown_seconds: 0,
        ..rule_create("temperature", 5, 3, 0)
    };
    let rule_id = seed_rule(&db.pool, project_id, &rule).await;

    seed_temperatures(&db.pool, device_id, &[85.0, 85.0, 85.0, 85.0, 85.0]).await;

    let alert_ids = evaluate_rules_for_device(&db.pool, device_id)
        .await
        .expect("evaluate");
    assert!(alert_ids.is_empty());

    telemetry_backend::store::rule::replace_rule_devices(&db.pool, rule_id, &[device_id])
        .await
        .expect("bind device");

    let alert_ids = evaluate_rules_for_device(&db.pool, device_id)
        .await
        .expect("evaluate");
    assert_eq!(alert_ids.len(), 1);
}

// ─────────────────────────────────────────────────────────────────────────────
// Defensive validation and cooldown edges
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn malformed_rule_rows_are_skipped_silently() {
    let db = setup_db(1).await;
    let project_id = seed_project(&db.pool).await;
    let device_id = seed_device(&db.pool, project_id, &[]).await;

    // Bypass creation-time validation: unsupported operator and k > n.
    for (operator, window_n, required_k) in [("!=", 5i64, 3i64), (">", 2, 5)] {
        sqlx::query(
            r#"
            INSERT INTO rules (
                id, project_id, name, metric, operator, threshold,
                window_n, required_k, cooldown_seconds, enabled, scope, tag, created_at
            )
            VALUES (?, ?, 'bad rule', 'temperature', ?, 80.0, ?, ?, 0, 1, 'ALL', NULL, ?)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(project_id.to_string())
        .bind(operator)
        .bind(window_n)
        .bind(required_k)
        .bind(common::format_ts(chrono::Utc::now()))
        .execute(&db.pool)
        .await
        .expect("insert malformed rule");
    }

    seed_temperatures(&db.pool, device_id, &[85.0, 85.0, 85.0, 85.0, 85.0]).await;

    let alert_ids = evaluate_rules_for_device(&db.pool, device_id)
        .await
        .expect("evaluate");
    assert!(alert_ids.is_empty());
}

#[tokio::test]
async fn zero_cooldown_allows_back_to_back_alerts() {
    let db = setup_db(1).await;
    let project_id = seed_project(&db.pool).await;
    let device_id = seed_device(&db.pool, project_id, &[]).await;
    seed_rule(&db.pool, project_id, &rule_create("temperature", 3, 3, 0)).await;

    seed_temperatures(&db.pool, device_id, &[85.0, 85.0, 85.0]).await;

    let first = evaluate_rules_for_device(&db.pool, device_id)
        .await
        .expect("evaluate");
    let second = evaluate_rules_for_device(&db.pool, device_id)
        .await
        .expect("evaluate again");
    assert_eq!(first.len(), 1);
    assert_eq!(second.len(), 1);
    assert_eq!(count_alerts(&db.pool, device_id).await, 2);
}

#[tokio::test]
async fn unknown_device_returns_no_alerts() {
    let db = setup_db(1).await;
    let alert_ids = evaluate_rules_for_device(&db.pool, Uuid::new_v4())
        .await
        .expect("evaluate");
    assert!(alert_ids.is_empty());
}

#[tokio::test]
async fn disabled_rule_is_ignored() {
    let db = setup_db(1).await;
    let project_id = seed_project(&db.pool).await;
    let device_id = seed_device(&db.pool, project_id, &[]).await;

    let rule = RuleCreate {
        enabled: false,
        ..rule_create("temperature", 3, 1, 0)
    };
    seed_rule(&db.pool, project_id, &rule).await;
    seed_temperatures(&db.pool, device_id, &[85.0, 85.0, 85.0]).await;

    let alert_ids = evaluate_rules_for_device(&db.pool, device_id)
        .await
        .expect("evaluate");
    assert!(alert_ids.is_empty());
}
