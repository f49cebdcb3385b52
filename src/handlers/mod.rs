pub mod alert;
pub mod delivery;
pub mod device;
pub mod health;
pub mod org;
pub mod rule;
pub mod telemetry;
pub mod webhook;

use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::ApiError;
use crate::store::{self, StoreError};
use crate::types::{Device, Rule, WebhookSubscription};

pub(crate) fn map_store_error(err: StoreError) -> ApiError {
    match err {
        StoreError::Conflict(message) => ApiError::validation(message),
        StoreError::Db(db) => ApiError::Db(db),
        StoreError::NotFound(message) => ApiError::not_found(message),
        StoreError::Parse(message) => ApiError::internal(message),
    }
}

pub(crate) fn parse_limit(limit: Option<i64>, default: i64, max: i64) -> Result<i64, ApiError> {
    let limit = limit.unwrap_or(default);
    if !(1..=max).contains(&limit) {
        return Err(ApiError::validation(format!(
            "limit must be between 1 and {max}"
        )));
    }
    Ok(limit)
}

/// Every key-authenticated operation resolves to exactly one project. A path
/// project that is not the caller's looks absent, never forbidden, so other
/// tenants' ids cannot be probed.
pub(crate) fn check_project_scope(
    path_project_id: Uuid,
    authed_project_id: Uuid,
) -> Result<(), ApiError> {
    if path_project_id != authed_project_id {
        return Err(ApiError::not_found("project not found"));
    }
    Ok(())
}

/// Resolve a device under the caller's project; another tenant's device is
/// indistinguishable from a missing one.
pub(crate) async fn device_in_project(
    pool: &SqlitePool,
    authed_project_id: Uuid,
    device_id: Uuid,
) -> Result<Device, ApiError> {
    let device = store::device::get_device(pool, device_id)
        .await
        .map_err(map_store_error)?;
    match device {
        Some(device) if device.project_id == authed_project_id => Ok(device),
        _ => Err(ApiError::not_found("device not found")),
    }
}

pub(crate) async fn rule_in_project(
    pool: &SqlitePool,
    authed_project_id: Uuid,
    rule_id: Uuid,
) -> Result<Rule, ApiError> {
    let rule = store::rule::get_rule(pool, rule_id)
        .await
        .map_err(map_store_error)?;
    match rule {
        Some(rule) if rule.project_id == authed_project_id => Ok(rule),
        _ => Err(ApiError::not_found("rule not found")),
    }
}

pub(crate) async fn webhook_in_project(
    pool: &SqlitePool,
    authed_project_id: Uuid,
    webhook_id: Uuid,
) -> Result<WebhookSubscription, ApiError> {
    let webhook = store::webhook::get_webhook(pool, webhook_id)
        .await
        .map_err(map_store_error)?;
    match webhook {
        Some(webhook) if webhook.project_id == authed_project_id => Ok(webhook),
        _ => Err(ApiError::not_found("webhook not found")),
    }
}
