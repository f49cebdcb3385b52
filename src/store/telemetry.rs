use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, SqlitePool};
use uuid::Uuid;

use crate::store::{StoreError, format_utc, parse_json, parse_uuid};
use crate::types::TelemetryEvent;

/// Bulk-insert a batch of already-parsed events in one transaction.
/// Append-only; rows are never updated afterwards.
pub async fn insert_events(
    pool: &SqlitePool,
    device_id: Uuid,
    events: &[(DateTime<Utc>, serde_json::Value)],
) -> Result<usize, StoreError> {
    if events.is_empty() {
        return Ok(0);
    }

    let mut rows = Vec::with_capacity(events.len());
    for (ts, payload) in events {
        let payload = serde_json::to_string(payload)
            .map_err(|err| StoreError::Parse(format!("invalid payload JSON: {err}")))?;
        rows.push((Uuid::new_v4().to_string(), format_utc(*ts), payload));
    }

    let mut tx = pool.begin().await?;

    let mut insert =
        QueryBuilder::new("INSERT INTO telemetry_events (id, device_id, ts, payload) ");
    insert.push_values(&rows, |mut b, (id, ts, payload)| {
        b.push_bind(id)
            .push_bind(device_id.to_string())
            .push_bind(ts)
            .push_bind(payload);
    });
    insert.build().execute(&mut *tx).await?;

    tx.commit().await?;
    Ok(rows.len())
}

/// The last `limit` events for a device, newest first. Ties on `ts` break
/// on `id` so the ordering is total.
pub async fn list_latest_events(
    pool: &SqlitePool,
    device_id: Uuid,
    limit: i64,
) -> Result<Vec<TelemetryEvent>, StoreError> {
    let rows = sqlx::query_as::<_, EventRow>(
        r#"
        SELECT id, device_id, ts, payload
        FROM telemetry_events
        WHERE device_id = ?
        ORDER BY ts DESC, id DESC
        LIMIT ?
        "#,
    )
    .bind(device_id.to_string())
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(EventRow::try_into).collect()
}

pub async fn get_latest_event(
    pool: &SqlitePool,
    device_id: Uuid,
) -> Result<Option<TelemetryEvent>, StoreError> {
    let mut events = list_latest_events(pool, device_id, 1).await?;
    Ok(events.pop())
}

pub async fn list_events_since(
    pool: &SqlitePool,
    device_id: Uuid,
    since: DateTime<Utc>,
) -> Result<Vec<TelemetryEvent>, StoreError> {
    let rows = sqlx::query_as::<_, EventRow>(
        r#"
        SELECT id, device_id, ts, payload
        FROM telemetry_events
        WHERE device_id = ? AND ts >= ?
        ORDER BY ts DESC, id DESC
        "#,
    )
    .bind(device_id.to_string())
    .bind(format_utc(since))
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(EventRow::try_into).collect()
}

#[derive(sqlx::FromRow)]
struct EventRow {
    id: String,
    device_id: String,
    ts: String,
    payload: String,
}

impl TryFrom<EventRow> for TelemetryEvent {
    type Error = StoreError;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        Ok(TelemetryEvent {
            id: parse_uuid("event id", &row.id)?,
            device_id: parse_uuid("device id", &row.device_id)?,
            ts: row.ts,
            payload: parse_json("payload", &row.payload)?,
        })
    }
}
