use std::collections::HashSet;

use sqlx::SqlitePool;
use uuid::Uuid;

use crate::store::{StoreError, now_str, parse_uuid};
use crate::types::Device;

pub async fn create_device(
    pool: &SqlitePool,
    project_id: Uuid,
    external_id: &str,
    name: &str,
    tags: &[String],
) -> Result<Device, StoreError> {
    let id = Uuid::new_v4();
    let created_at = now_str();
    let tags = clean_tags(tags);
    let tags_json = tags_to_json(&tags)?;

    sqlx::query(
        r#"
        INSERT INTO devices (id, project_id, external_id, name, tags, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(id.to_string())
    .bind(project_id.to_string())
    .bind(external_id)
    .bind(name)
    .bind(&tags_json)
    .bind(&created_at)
    .execute(pool)
    .await
    .map_err(|err| match err {
        sqlx::Error::Database(ref db) if db.is_unique_violation() => {
            StoreError::Conflict("external_id must be unique within the project".to_string())
        }
        other => StoreError::Db(other),
    })?;

    Ok(Device {
        id,
        project_id,
        external_id: external_id.to_string(),
        name: name.to_string(),
        tags,
        created_at,
    })
}

pub async fn get_device(pool: &SqlitePool, device_id: Uuid) -> Result<Option<Device>, StoreError> {
    let row = sqlx::query_as::<_, DeviceRow>(
        "SELECT id, project_id, external_id, name, tags, created_at FROM devices WHERE id = ?",
    )
    .bind(device_id.to_string())
    .fetch_optional(pool)
    .await?;

    row.map(DeviceRow::try_into).transpose()
}

pub async fn find_by_external_id(
    pool: &SqlitePool,
    project_id: Uuid,
    external_id: &str,
) -> Result<Option<Device>, StoreError> {
    let row = sqlx::query_as::<_, DeviceRow>(
        r#"
        SELECT id, project_id, external_id, name, tags, created_at
        FROM devices
        WHERE project_id = ? AND external_id = ?
        "#,
    )
    .bind(project_id.to_string())
    .bind(external_id)
    .fetch_optional(pool)
    .await?;

    row.map(DeviceRow::try_into).transpose()
}

pub async fn list_devices(pool: &SqlitePool, project_id: Uuid) -> Result<Vec<Device>, StoreError> {
    let rows = sqlx::query_as::<_, DeviceRow>(
        r#"
        SELECT id, project_id, external_id, name, tags, created_at
        FROM devices
        WHERE project_id = ?
        ORDER BY created_at ASC, id ASC
        "#,
    )
    .bind(project_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(DeviceRow::try_into).collect()
}

pub async fn delete_device(pool: &SqlitePool, device_id: Uuid) -> Result<bool, StoreError> {
    let result = sqlx::query("DELETE FROM devices WHERE id = ?")
        .bind(device_id.to_string())
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Replace all tags. Trims, drops empties, dedups preserving first-seen order.
pub async fn set_tags(
    pool: &SqlitePool,
    device_id: Uuid,
    tags: &[String],
) -> Result<Option<Device>, StoreError> {
    write_tags(pool, device_id, clean_tags(tags)).await
}

/// Add tags, preserving the device's existing ones.
pub async fn add_tags(
    pool: &SqlitePool,
    device_id: Uuid,
    tags: &[String],
) -> Result<Option<Device>, StoreError> {
    let Some(device) = get_device(pool, device_id).await? else {
        return Ok(None);
    };

    let mut merged = device.tags;
    let mut seen: HashSet<String> = merged.iter().cloned().collect();
    for tag in tags {
        let tag = tag.trim();
        if tag.is_empty() || seen.contains(tag) {
            continue;
        }
        seen.insert(tag.to_string());
        merged.push(tag.to_string());
    }

    write_tags(pool, device_id, merged).await
}

/// Remove tags; the remainder comes back sorted.
pub async fn remove_tags(
    pool: &SqlitePool,
    device_id: Uuid,
    tags: &[String],
) -> Result<Option<Device>, StoreError> {
    let Some(device) = get_device(pool, device_id).await? else {
        return Ok(None);
    };

    let removal: HashSet<&str> = tags.iter().map(|tag| tag.trim()).collect();
    let mut remaining: Vec<String> = device
        .tags
        .into_iter()
        .filter(|tag| !removal.contains(tag.as_str()))
        .collect();
    remaining.sort();

    write_tags(pool, device_id, remaining).await
}

async fn write_tags(
    pool: &SqlitePool,
    device_id: Uuid,
    tags: Vec<String>,
) -> Result<Option<Device>, StoreError> {
    let tags_json = tags_to_json(&tags)?;
    let result = sqlx::query("UPDATE devices SET tags = ? WHERE id = ?")
        .bind(&tags_json)
        .bind(device_id.to_string())
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Ok(None);
    }

    get_device(pool, device_id).await
}

fn clean_tags(tags: &[String]) -> Vec<String> {
    let mut cleaned = Vec::new();
    let mut seen = HashSet::new();
    for tag in tags {
        let tag = tag.trim();
        if tag.is_empty() || seen.contains(tag) {
            continue;
        }
        seen.insert(tag.to_string());
        cleaned.push(tag.to_string());
    }
    cleaned
}

fn tags_to_json(tags: &[String]) -> Result<String, StoreError> {
    serde_json::to_string(tags)
        .map_err(|err| StoreError::Parse(format!("invalid tags JSON: {err}")))
}

#[derive(sqlx::FromRow)]
struct DeviceRow {
    id: String,
    project_id: String,
    external_id: String,
    name: String,
    tags: String,
    created_at: String,
}

impl TryFrom<DeviceRow> for Device {
    type Error = StoreError;

    fn try_from(row: DeviceRow) -> Result<Self, Self::Error> {
        let tags: Vec<String> = serde_json::from_str(&row.tags)
            .map_err(|err| StoreError::Parse(format!("invalid tags JSON: {err}")))?;

        Ok(Device {
            id: parse_uuid("device id", &row.id)?,
            project_id: parse_uuid("project id", &row.project_id)?,
            external_id: row.external_id,
            name: row.name,
            tags,
            created_at: row.created_at,
        })
    }
}
