use std::collections::HashSet;

use sqlx::SqlitePool;
use uuid::Uuid;

use crate::store::{StoreError, now_str, parse_uuid};
use crate::types::{Rule, RuleCreate, RuleUpdate};

pub async fn create_rule(
    pool: &SqlitePool,
    project_id: Uuid,
    data: &RuleCreate,
) -> Result<Rule, StoreError> {
    let id = Uuid::new_v4();
    let created_at = now_str();

    sqlx::query(
        r#"
        INSERT INTO rules (
            id, project_id, name, metric, operator, threshold,
            window_n, required_k, cooldown_seconds, enabled, scope, tag, created_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(id.to_string())
    .bind(project_id.to_string())
    .bind(&data.name)
    .bind(&data.metric)
    .bind(&data.operator)
    .bind(data.threshold)
    .bind(data.window_n)
    .bind(data.required_k)
    .bind(data.cooldown_seconds)
    .bind(data.enabled)
    .bind(&data.scope)
    .bind(data.tag.as_deref())
    .bind(&created_at)
    .execute(pool)
    .await?;

    Ok(Rule {
        id,
        project_id,
        name: data.name.clone(),
        metric: data.metric.clone(),
        operator: data.operator.clone(),
        threshold: data.threshold,
        window_n: data.window_n,
        required_k: data.required_k,
        cooldown_seconds: data.cooldown_seconds,
        enabled: data.enabled,
        scope: data.scope.clone(),
        tag: data.tag.clone(),
        created_at,
    })
}

pub async fn get_rule(pool: &SqlitePool, rule_id: Uuid) -> Result<Option<Rule>, StoreError> {
    let row = sqlx::query_as::<_, RuleRow>(&format!("{SELECT_RULE} WHERE id = ?"))
        .bind(rule_id.to_string())
        .fetch_optional(pool)
        .await?;

    row.map(RuleRow::try_into).transpose()
}

pub async fn list_rules_for_project(
    pool: &SqlitePool,
    project_id: Uuid,
) -> Result<Vec<Rule>, StoreError> {
    let rows = sqlx::query_as::<_, RuleRow>(&format!(
        "{SELECT_RULE} WHERE project_id = ? ORDER BY created_at DESC, id DESC"
    ))
    .bind(project_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(RuleRow::try_into).collect()
}

pub async fn list_enabled_rules_for_project(
    pool: &SqlitePool,
    project_id: Uuid,
) -> Result<Vec<Rule>, StoreError> {
    let rows = sqlx::query_as::<_, RuleRow>(&format!(
        "{SELECT_RULE} WHERE project_id = ? AND enabled = 1"
    ))
    .bind(project_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(RuleRow::try_into).collect()
}

/// Write a fully merged rule back. Callers merge with `merge_update` and
/// validate the result first.
pub async fn save_rule(pool: &SqlitePool, merged: &Rule) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        UPDATE rules
        SET name = ?, metric = ?, operator = ?, threshold = ?,
            window_n = ?, required_k = ?, cooldown_seconds = ?,
            enabled = ?, scope = ?, tag = ?
        WHERE id = ?
        "#,
    )
    .bind(&merged.name)
    .bind(&merged.metric)
    .bind(&merged.operator)
    .bind(merged.threshold)
    .bind(merged.window_n)
    .bind(merged.required_k)
    .bind(merged.cooldown_seconds)
    .bind(merged.enabled)
    .bind(&merged.scope)
    .bind(merged.tag.as_deref())
    .bind(merged.id.to_string())
    .execute(pool)
    .await?;

    Ok(())
}

pub fn merge_update(existing: &Rule, update: &RuleUpdate) -> Rule {
    let mut merged = existing.clone();
    if let Some(name) = &update.name {
        merged.name = name.clone();
    }
    if let Some(metric) = &update.metric {
        merged.metric = metric.clone();
    }
    if let Some(operator) = &update.operator {
        merged.operator = operator.clone();
    }
    if let Some(threshold) = update.threshold {
        merged.threshold = threshold;
    }
    if let Some(window_n) = update.window_n {
        merged.window_n = window_n;
    }
    if let Some(required_k) = update.required_k {
        merged.required_k = required_k;
    }
    if let Some(cooldown_seconds) = update.cooldown_seconds {
        merged.cooldown_seconds = cooldown_seconds;
    }
    if let Some(scope) = &update.scope {
        merged.scope = scope.clone();
    }
    if let Some(tag) = &update.tag {
        merged.tag = Some(tag.clone());
    }
    if let Some(enabled) = update.enabled {
        merged.enabled = enabled;
    }
    merged
}

pub async fn delete_rule(pool: &SqlitePool, rule_id: Uuid) -> Result<bool, StoreError> {
    let result = sqlx::query("DELETE FROM rules WHERE id = ?")
        .bind(rule_id.to_string())
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn explicit_rule_ids_for_device(
    pool: &SqlitePool,
    device_id: Uuid,
) -> Result<HashSet<Uuid>, StoreError> {
    let ids: Vec<String> = sqlx::query_scalar("SELECT rule_id FROM rule_devices WHERE device_id = ?")
        .bind(device_id.to_string())
        .fetch_all(pool)
        .await?;

    ids.iter().map(|id| parse_uuid("rule id", id)).collect()
}

pub async fn replace_rule_devices(
    pool: &SqlitePool,
    rule_id: Uuid,
    device_ids: &[Uuid],
) -> Result<(), StoreError> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM rule_devices WHERE rule_id = ?")
        .bind(rule_id.to_string())
        .execute(&mut *tx)
        .await?;

    for device_id in device_ids {
        sqlx::query("INSERT INTO rule_devices (rule_id, device_id) VALUES (?, ?)")
            .bind(rule_id.to_string())
            .bind(device_id.to_string())
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    Ok(())
}

const SELECT_RULE: &str = r#"
    SELECT id, project_id, name, metric, operator, threshold,
           window_n, required_k, cooldown_seconds, enabled, scope, tag, created_at
    FROM rules
"#;

#[derive(sqlx::FromRow)]
struct RuleRow {
    id: String,
    project_id: String,
    name: String,
    metric: String,
    operator: String,
    threshold: f64,
    window_n: i64,
    required_k: i64,
    cooldown_seconds: i64,
    enabled: bool,
    scope: String,
    tag: Option<String>,
    created_at: String,
}

impl TryFrom<RuleRow> for Rule {
    type Error = StoreError;

    fn try_from(row: RuleRow) -> Result<Self, Self::Error> {
        Ok(Rule {
            id: parse_uuid("rule id", &row.id)?,
            project_id: parse_uuid("project id", &row.project_id)?,
            name: row.name,
            metric: row.metric,
            operator: row.operator,
            threshold: row.threshold,
            window_n: row.window_n,
            required_k: row.required_k,
            cooldown_seconds: row.cooldown_seconds,
            enabled: row.enabled,
            scope: row.scope,
            tag: row.tag,
            created_at: row.created_at,
        })
    }
}
