use sqlx::SqlitePool;
use uuid::Uuid;

use crate::store::{StoreError, parse_json, parse_uuid};
use crate::types::Alert;

pub async fn get_alert(pool: &SqlitePool, alert_id: Uuid) -> Result<Option<Alert>, StoreError> {
    let row = sqlx::query_as::<_, AlertRow>(
        "SELECT id, device_id, rule_id, triggered_at, details FROM alerts WHERE id = ?",
    )
    .bind(alert_id.to_string())
    .fetch_optional(pool)
    .await?;

    row.map(AlertRow::try_into).transpose()
}

pub async fn list_alerts_for_device(
    pool: &SqlitePool,
    device_id: Uuid,
    limit: i64,
) -> Result<Vec<Alert>, StoreError> {
    let rows = sqlx::query_as::<_, AlertRow>(
        r#"
        SELECT id, device_id, rule_id, triggered_at, details
        FROM alerts
        WHERE device_id = ?
        ORDER BY triggered_at DESC
        LIMIT ?
        "#,
    )
    .bind(device_id.to_string())
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(AlertRow::try_into).collect()
}

pub async fn list_alerts_for_project(
    pool: &SqlitePool,
    project_id: Uuid,
    limit: i64,
) -> Result<Vec<Alert>, StoreError> {
    let rows = sqlx::query_as::<_, AlertRow>(
        r#"
        SELECT a.id, a.device_id, a.rule_id, a.triggered_at, a.details
        FROM alerts a
        JOIN devices d ON d.id = a.device_id
        WHERE d.project_id = ?
        ORDER BY a.triggered_at DESC
        LIMIT ?
        "#,
    )
    .bind(project_id.to_string())
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(AlertRow::try_into).collect()
}

#[derive(sqlx::FromRow)]
struct AlertRow {
    id: String,
    device_id: String,
    rule_id: String,
    triggered_at: String,
    details: String,
}

impl TryFrom<AlertRow> for Alert {
    type Error = StoreError;

    fn try_from(row: AlertRow) -> Result<Self, Self::Error> {
        Ok(Alert {
            id: parse_uuid("alert id", &row.id)?,
            device_id: parse_uuid("device id", &row.device_id)?,
            rule_id: parse_uuid("rule id", &row.rule_id)?,
            triggered_at: row.triggered_at,
            details: parse_json("details", &row.details)?,
        })
    }
}
