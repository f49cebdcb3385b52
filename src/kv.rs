//! Expiring key-value entries over the relational store.
//!
//! Every operation is a single SQL statement, so callers get the same
//! atomicity a dedicated KV server would give for one key. Expired rows are
//! treated as absent on read and recycled on write.

use chrono::{Duration, SecondsFormat, Utc};
use sqlx::SqlitePool;

pub async fn get(pool: &SqlitePool, key: &str) -> Result<Option<String>, sqlx::Error> {
    let now = format_utc(Utc::now());
    sqlx::query_scalar(
        r#"
        SELECT value
        FROM kv_entries
        WHERE key = ?
          AND (expires_at IS NULL OR expires_at > ?)
        "#,
    )
    .bind(key)
    .bind(&now)
    .fetch_optional(pool)
    .await
}

pub async fn set_ex(
    pool: &SqlitePool,
    key: &str,
    value: &str,
    ttl_secs: i64,
) -> Result<(), sqlx::Error> {
    let expires_at = format_utc(Utc::now() + Duration::seconds(ttl_secs));
    sqlx::query(
        r#"
        INSERT INTO kv_entries (key, value, expires_at)
        VALUES (?, ?, ?)
        ON CONFLICT(key) DO UPDATE SET
            value = excluded.value,
            expires_at = excluded.expires_at
        "#,
    )
    .bind(key)
    .bind(value)
    .bind(&expires_at)
    .execute(pool)
    .await?;
    Ok(())
}

/// Increment a counter key, refreshing its TTL. A missing or expired key
/// restarts the count at 1. Returns the new count.
pub async fn incr_ex(pool: &SqlitePool, key: &str, ttl_secs: i64) -> Result<i64, sqlx::Error> {
    let now = Utc::now();
    let now_str = format_utc(now);
    let expires_at = format_utc(now + Duration::seconds(ttl_secs));
    sqlx::query_scalar(
        r#"
        INSERT INTO kv_entries (key, value, expires_at)
        VALUES (?, '1', ?)
        ON CONFLICT(key) DO UPDATE SET
            value = CASE
                WHEN kv_entries.expires_at IS NOT NULL AND kv_entries.expires_at <= ?
                    THEN '1'
                ELSE CAST(CAST(kv_entries.value AS INTEGER) + 1 AS TEXT)
            END,
            expires_at = excluded.expires_at
        RETURNING CAST(value AS INTEGER)
        "#,
    )
    .bind(key)
    .bind(&expires_at)
    .bind(&now_str)
    .fetch_one(pool)
    .await
}

pub async fn del(pool: &SqlitePool, key: &str) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM kv_entries WHERE key = ?")
        .bind(key)
        .execute(pool)
        .await?;
    Ok(())
}

pub(crate) fn format_utc(dt: chrono::DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}
