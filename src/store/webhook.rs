use sqlx::SqlitePool;
use uuid::Uuid;

use crate::store::{StoreError, now_str, parse_uuid};
use crate::types::WebhookSubscription;

pub async fn create_webhook(
    pool: &SqlitePool,
    project_id: Uuid,
    url: &str,
    secret: Option<&str>,
) -> Result<WebhookSubscription, StoreError> {
    let id = Uuid::new_v4();
    let created_at = now_str();

    sqlx::query(
        r#"
        INSERT INTO webhook_subscriptions (id, project_id, url, secret, enabled, created_at)
        VALUES (?, ?, ?, ?, 1, ?)
        "#,
    )
    .bind(id.to_string())
    .bind(project_id.to_string())
    .bind(url)
    .bind(secret)
    .bind(&created_at)
    .execute(pool)
    .await?;

    Ok(WebhookSubscription {
        id,
        project_id,
        url: url.to_string(),
        secret: secret.map(str::to_string),
        enabled: true,
        created_at,
    })
}

pub async fn get_webhook(
    pool: &SqlitePool,
    webhook_id: Uuid,
) -> Result<Option<WebhookSubscription>, StoreError> {
    let row = sqlx::query_as::<_, WebhookRow>(
        r#"
        SELECT id, project_id, url, secret, enabled, created_at
        FROM webhook_subscriptions
        WHERE id = ?
        "#,
    )
    .bind(webhook_id.to_string())
    .fetch_optional(pool)
    .await?;

    row.map(WebhookRow::try_into).transpose()
}

pub async fn list_webhooks(
    pool: &SqlitePool,
    project_id: Uuid,
    enabled_only: bool,
) -> Result<Vec<WebhookSubscription>, StoreError> {
    let sql = if enabled_only {
        r#"
        SELECT id, project_id, url, secret, enabled, created_at
        FROM webhook_subscriptions
        WHERE project_id = ? AND enabled = 1
        ORDER BY created_at ASC, id ASC
        "#
    } else {
        r#"
        SELECT id, project_id, url, secret, enabled, created_at
        FROM webhook_subscriptions
        WHERE project_id = ?
        ORDER BY created_at ASC, id ASC
        "#
    };

    let rows = sqlx::query_as::<_, WebhookRow>(sql)
        .bind(project_id.to_string())
        .fetch_all(pool)
        .await?;

    rows.into_iter().map(WebhookRow::try_into).collect()
}

pub async fn disable_webhook(
    pool: &SqlitePool,
    webhook_id: Uuid,
) -> Result<Option<WebhookSubscription>, StoreError> {
    let result = sqlx::query("UPDATE webhook_subscriptions SET enabled = 0 WHERE id = ?")
        .bind(webhook_id.to_string())
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Ok(None);
    }

    get_webhook(pool, webhook_id).await
}

#[derive(sqlx::FromRow)]
struct WebhookRow {
    id: String,
    project_id: String,
    url: String,
    secret: Option<String>,
    enabled: bool,
    created_at: String,
}

impl TryFrom<WebhookRow> for WebhookSubscription {
    type Error = StoreError;

    fn try_from(row: WebhookRow) -> Result<Self, Self::Error> {
        Ok(WebhookSubscription {
            id: parse_uuid("webhook id", &row.id)?,
            project_id: parse_uuid("project id", &row.project_id)?,
            url: row.url,
            secret: row.secret,
            enabled: row.enabled,
            created_at: row.created_at,
        })
    }
}
