use sqlx::SqlitePool;
use uuid::Uuid;

use crate::store::{StoreError, now_str, parse_uuid};

pub struct ApiKeyRecord {
    pub project_id: Uuid,
    pub hashed_secret: String,
}

pub async fn create_api_key(
    pool: &SqlitePool,
    project_id: Uuid,
    prefix: &str,
    hashed_secret: &str,
) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        INSERT INTO api_keys (id, project_id, prefix, hashed_secret, created_at, revoked_at)
        VALUES (?, ?, ?, ?, ?, NULL)
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(project_id.to_string())
    .bind(prefix)
    .bind(hashed_secret)
    .bind(now_str())
    .execute(pool)
    .await?;
    Ok(())
}

/// Look up a non-revoked key by prefix. The caller verifies the secret
/// against `hashed_secret`.
pub async fn find_by_prefix(
    pool: &SqlitePool,
    prefix: &str,
) -> Result<Option<ApiKeyRecord>, StoreError> {
    let row = sqlx::query_as::<_, ApiKeyRow>(
        r#"
        SELECT project_id, hashed_secret
        FROM api_keys
        WHERE prefix = ?
          AND revoked_at IS NULL
        "#,
    )
    .bind(prefix)
    .fetch_optional(pool)
    .await?;

    row.map(|row| {
        Ok(ApiKeyRecord {
            project_id: parse_uuid("project id", &row.project_id)?,
            hashed_secret: row.hashed_secret,
        })
    })
    .transpose()
}

#[derive(sqlx::FromRow)]
struct ApiKeyRow {
    project_id: String,
    hashed_secret: String,
}
