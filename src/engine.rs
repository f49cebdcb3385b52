//! Windowed k-of-n rule evaluation for a single device.
//!
//! One invocation evaluates every enabled rule of the device's project
//! against the device's recent event window and returns the ids of the
//! alerts it created. Enqueueing webhook fan-out is the calling task's job,
//! so this module stays queue-free and directly testable.

use chrono::{DateTime, Duration, Utc};
use sqlx::SqlitePool;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::store::{self, StoreError, format_utc, now_str};
use crate::types::{Device, Rule, TelemetryEvent, ALLOWED_OPERATORS};

#[derive(Debug, Clone, PartialEq)]
pub struct WindowEvaluation {
    pub match_count: i64,
    pub considered: i64,
    pub latest_value: f64,
    pub latest_ts: String,
}

pub async fn evaluate_rules_for_device(
    pool: &SqlitePool,
    device_id: Uuid,
) -> Result<Vec<Uuid>, StoreError> {
    info!(device_id = %device_id, "evaluation_started");

    let Some(device) = store::device::get_device(pool, device_id).await? else {
        warn!(device_id = %device_id, "device_not_found");
        return Ok(Vec::new());
    };

    let rules = store::rule::list_enabled_rules_for_project(pool, device.project_id).await?;
    info!(
        device_id = %device_id,
        project_id = %device.project_id,
        rule_count = rules.len(),
        "rules_loaded"
    );
    if rules.is_empty() {
        return Ok(Vec::new());
    }

    let explicit_rule_ids = store::rule::explicit_rule_ids_for_device(pool, device_id).await?;

    let mut created_alert_ids = Vec::new();

    for rule in &rules {
        let applies = match rule.scope.as_str() {
            "ALL" => true,
            "EXPLICIT" => explicit_rule_ids.contains(&rule.id),
            "TAG" => rule
                .tag
                .as_deref()
                .is_some_and(|tag| device.tags.iter().any(|t| t == tag)),
            _ => false,
        };
        if !applies {
            continue;
        }

        // Defense in depth; creation-time validation already forbids these.
        if !ALLOWED_OPERATORS.contains(&rule.operator.as_str()) {
            continue;
        }
        if rule.required_k > rule.window_n {
            continue;
        }

        let window =
            store::telemetry::list_latest_events(pool, device_id, rule.window_n).await?;
        if (window.len() as i64) < rule.window_n {
            continue;
        }

        let Some(evaluation) = evaluate_window(rule, &window) else {
            continue;
        };
        if evaluation.match_count < rule.required_k {
            continue;
        }

        match try_create_alert(pool, &device, rule, &evaluation).await? {
            Some(alert_id) => {
                info!(
                    alert_id = %alert_id,
                    device_id = %device_id,
                    rule_id = %rule.id,
                    rule_name = %rule.name,
                    metric = %rule.metric,
                    threshold = rule.threshold,
                    latest_value = evaluation.latest_value,
                    "alert_created"
                );
                created_alert_ids.push(alert_id);
            }
            None => {
                debug!(device_id = %device_id, rule_id = %rule.id, "alert_skipped_cooldown");
            }
        }
    }

    info!(
        device_id = %device_id,
        alerts_created = created_alert_ids.len(),
        "evaluation_completed"
    );

    Ok(created_alert_ids)
}

/// Scan a window (newest first) counting numeric entries and matches.
/// Returns `None` when the metric is numeric nowhere in the window.
pub fn evaluate_window(rule: &Rule, window: &[TelemetryEvent]) -> Option<WindowEvaluation> {
    let mut match_count = 0;
    let mut considered = 0;
    let mut latest: Option<(f64, String)> = None;

    for event in window {
        let Some(raw) = event.payload.get(&rule.metric).and_then(|v| v.as_f64()) else {
            continue;
        };

        considered += 1;
        if latest.is_none() {
            latest = Some((raw, event.ts.clone()));
        }
        if compare(&rule.operator, raw, rule.threshold) {
            match_count += 1;
        }
    }

    let (latest_value, latest_ts) = latest?;
    Some(WindowEvaluation {
        match_count,
        considered,
        latest_value,
        latest_ts,
    })
}

fn compare(operator: &str, value: f64, threshold: f64) -> bool {
    match operator {
        ">" => value > threshold,
        ">=" => value >= threshold,
        "<" => value < threshold,
        "<=" => value <= threshold,
        _ => false,
    }
}

/// The cooldown check and alert insert for one firing rule, serialized per
/// (device, rule) by a synthetic lock row that the transaction holds until
/// commit or rollback. Two concurrent evaluations of the same pair cannot
/// both observe an empty cooldown.
async fn try_create_alert(
    pool: &SqlitePool,
    device: &Device,
    rule: &Rule,
    evaluation: &WindowEvaluation,
) -> Result<Option<Uuid>, StoreError> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO alert_locks (device_id, rule_id, locked_at)
        VALUES (?, ?, ?)
        ON CONFLICT(device_id, rule_id) DO UPDATE SET
            locked_at = excluded.locked_at
        "#,
    )
    .bind(device.id.to_string())
    .bind(rule.id.to_string())
    .bind(now_str())
    .execute(&mut *tx)
    .await?;

    let last_triggered: Option<String> = sqlx::query_scalar(
        r#"
        SELECT triggered_at
        FROM alerts
        WHERE device_id = ? AND rule_id = ?
        ORDER BY triggered_at DESC
        LIMIT 1
        "#,
    )
    .bind(device.id.to_string())
    .bind(rule.id.to_string())
    .fetch_optional(&mut *tx)
    .await?;

    let now = Utc::now();
    if let Some(raw) = last_triggered {
        let last = DateTime::parse_from_rfc3339(&raw)
            .map_err(|err| StoreError::Parse(format!("invalid triggered_at: {err}")))?
            .with_timezone(&Utc);
        if now - last < Duration::seconds(rule.cooldown_seconds) {
            tx.rollback().await?;
            return Ok(None);
        }
    }

    let alert_id = Uuid::new_v4();
    let details = serde_json::json!({
        "rule": {
            "id": rule.id,
            "name": rule.name,
            "metric": rule.metric,
            "operator": rule.operator,
            "threshold": rule.threshold,
            "window_n": rule.window_n,
            "required_k": rule.required_k,
            "cooldown_seconds": rule.cooldown_seconds,
            "scope": rule.scope,
            "tag": rule.tag,
        },
        "evaluation": {
            "device_id": device.id,
            "match_count": evaluation.match_count,
            "considered": evaluation.considered,
            "latest_value": evaluation.latest_value,
            "latest_ts": evaluation.latest_ts,
        },
    });
    let details = serde_json::to_string(&details)
        .map_err(|err| StoreError::Parse(format!("invalid details JSON: {err}")))?;

    sqlx::query(
        r#"
        INSERT INTO alerts (id, device_id, rule_id, triggered_at, details)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(alert_id.to_string())
    .bind(device.id.to_string())
    .bind(rule.id.to_string())
    .bind(format_utc(now))
    .bind(&details)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(Some(alert_id))
}
