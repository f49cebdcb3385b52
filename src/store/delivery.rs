//! Delivery rows are a small state machine:
//!
//! ```text
//! pending  ──► sending ──► success (terminal)
//! retrying ──► sending ──► retrying
//!              sending ──► failed  (terminal)
//! ```
//!
//! Every transition is a conditional update, so concurrent workers and
//! re-delivered queue jobs cannot double-apply one.

use chrono::{Duration, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::store::{StoreError, format_utc, now_str, parse_uuid};
use crate::types::{DeliveryStatus, WebhookDelivery};

/// A `sending` row older than this is assumed orphaned by a dead worker
/// and may be re-acquired.
pub const SENDING_STALE_AFTER_SECS: i64 = 120;

/// Insert-or-no-op on the `(alert_id, webhook_id)` idempotency key,
/// returning the row id either way.
pub async fn ensure_delivery_row(
    pool: &SqlitePool,
    project_id: Uuid,
    alert_id: Uuid,
    webhook_id: Uuid,
) -> Result<Uuid, StoreError> {
    let now = now_str();

    let id: String = sqlx::query_scalar(
        r#"
        INSERT INTO webhook_deliveries (
            id, project_id, alert_id, webhook_id,
            status, attempts, created_at, updated_at
        )
        VALUES (?, ?, ?, ?, 'pending', 0, ?, ?)
        ON CONFLICT(alert_id, webhook_id) DO UPDATE SET
            updated_at = webhook_deliveries.updated_at
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(project_id.to_string())
    .bind(alert_id.to_string())
    .bind(webhook_id.to_string())
    .bind(&now)
    .bind(&now)
    .fetch_one(pool)
    .await?;

    parse_uuid("delivery id", &id)
}

pub async fn get_delivery(
    pool: &SqlitePool,
    delivery_id: Uuid,
) -> Result<Option<WebhookDelivery>, StoreError> {
    let row = sqlx::query_as::<_, DeliveryRow>(&format!("{SELECT_DELIVERY} WHERE id = ?"))
        .bind(delivery_id.to_string())
        .fetch_optional(pool)
        .await?;

    row.map(DeliveryRow::try_into).transpose()
}

/// Acquire the attempt: flip to `sending` iff the row is `pending`,
/// `retrying`, or stale `sending`. Returns false when another worker holds
/// it or the row is terminal.
pub async fn try_mark_sending(pool: &SqlitePool, delivery_id: Uuid) -> Result<bool, StoreError> {
    let now = Utc::now();
    let stale_before = format_utc(now - Duration::seconds(SENDING_STALE_AFTER_SECS));

    let updated: Option<String> = sqlx::query_scalar(
        r#"
        UPDATE webhook_deliveries
        SET status = 'sending',
            attempts = attempts + 1,
            updated_at = ?,
            last_error = NULL,
            last_status_code = NULL
        WHERE id = ?
          AND (
                status IN ('pending', 'retrying')
                OR (status = 'sending' AND updated_at < ?)
          )
        RETURNING id
        "#,
    )
    .bind(format_utc(now))
    .bind(delivery_id.to_string())
    .bind(&stale_before)
    .fetch_optional(pool)
    .await?;

    Ok(updated.is_some())
}

pub async fn mark_success(
    pool: &SqlitePool,
    delivery_id: Uuid,
    status_code: i64,
) -> Result<(), StoreError> {
    let now = now_str();
    sqlx::query(
        r#"
        UPDATE webhook_deliveries
        SET status = 'success',
            last_status_code = ?,
            delivered_at = ?,
            updated_at = ?
        WHERE id = ? AND status = 'sending'
        "#,
    )
    .bind(status_code)
    .bind(&now)
    .bind(&now)
    .bind(delivery_id.to_string())
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn mark_failed(
    pool: &SqlitePool,
    delivery_id: Uuid,
    status_code: Option<i64>,
    error: &str,
) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        UPDATE webhook_deliveries
        SET status = 'failed',
            last_status_code = ?,
            last_error = ?,
            updated_at = ?
        WHERE id = ? AND status = 'sending'
        "#,
    )
    .bind(status_code)
    .bind(error)
    .bind(now_str())
    .bind(delivery_id.to_string())
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn mark_retrying(
    pool: &SqlitePool,
    delivery_id: Uuid,
    status_code: Option<i64>,
    error: &str,
) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        UPDATE webhook_deliveries
        SET status = 'retrying',
            last_status_code = ?,
            last_error = ?,
            updated_at = ?
        WHERE id = ? AND status = 'sending'
        "#,
    )
    .bind(status_code)
    .bind(error)
    .bind(now_str())
    .bind(delivery_id.to_string())
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn list_deliveries(
    pool: &SqlitePool,
    project_id: Uuid,
    status: Option<DeliveryStatus>,
    limit: i64,
) -> Result<Vec<WebhookDelivery>, StoreError> {
    let rows = match status {
        Some(status) => {
            sqlx::query_as::<_, DeliveryRow>(&format!(
                "{SELECT_DELIVERY} WHERE project_id = ? AND status = ? \
                 ORDER BY created_at DESC LIMIT ?"
            ))
            .bind(project_id.to_string())
            .bind(status.as_str())
            .bind(limit)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query_as::<_, DeliveryRow>(&format!(
                "{SELECT_DELIVERY} WHERE project_id = ? ORDER BY created_at DESC LIMIT ?"
            ))
            .bind(project_id.to_string())
            .bind(limit)
            .fetch_all(pool)
            .await?
        }
    };

    rows.into_iter().map(DeliveryRow::try_into).collect()
}

const SELECT_DELIVERY: &str = r#"
    SELECT id, project_id, alert_id, webhook_id, status, attempts,
           last_status_code, last_error, created_at, updated_at, delivered_at
    FROM webhook_deliveries
"#;

#[derive(sqlx::FromRow)]
struct DeliveryRow {
    id: String,
    project_id: String,
    alert_id: String,
    webhook_id: String,
    status: String,
    attempts: i64,
    last_status_code: Option<i64>,
    last_error: Option<String>,
    created_at: String,
    updated_at: String,
    delivered_at: Option<String>,
}

impl TryFrom<DeliveryRow> for WebhookDelivery {
    type Error = StoreError;

    fn try_from(row: DeliveryRow) -> Result<Self, Self::Error> {
        let status = DeliveryStatus::parse(&row.status)
            .ok_or_else(|| StoreError::Parse(format!("unknown delivery status: {}", row.status)))?;

        Ok(WebhookDelivery {
            id: parse_uuid("delivery id", &row.id)?,
            project_id: parse_uuid("project id", &row.project_id)?,
            alert_id: parse_uuid("alert id", &row.alert_id)?,
            webhook_id: parse_uuid("webhook id", &row.webhook_id)?,
            status,
            attempts: row.attempts,
            last_status_code: row.last_status_code,
            last_error: row.last_error,
            created_at: row.created_at,
            updated_at: row.updated_at,
            delivered_at: row.delivered_at,
        })
    }
}
