use axum::{
    Json,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
};
use uuid::Uuid;

use crate::{
    auth::AuthedProject,
    breaker::CircuitBreaker,
    error::ApiError,
    extractors::ValidJson,
    handlers::{check_project_scope, map_store_error, webhook_in_project},
    ratelimit,
    state::AppState,
    store,
    types::{CircuitStatusOut, WebhookCreate, WebhookSubscription},
};

pub async fn create_webhook(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    AuthedProject(authed_project_id): AuthedProject,
    headers: HeaderMap,
    ValidJson(payload): ValidJson<WebhookCreate>,
) -> Result<(StatusCode, Json<WebhookSubscription>), ApiError> {
    ratelimit::enforce(&state, &headers, ratelimit::WEBHOOK_CREATE).await?;
    check_project_scope(project_id, authed_project_id)?;

    let url = payload.url.trim();
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(ApiError::validation("url must be an http(s) URL"));
    }

    let webhook =
        store::webhook::create_webhook(&state.pool, project_id, url, payload.secret.as_deref())
            .await
            .map_err(map_store_error)?;

    Ok((StatusCode::CREATED, Json(webhook)))
}

pub async fn list_webhooks(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    AuthedProject(authed_project_id): AuthedProject,
) -> Result<Json<Vec<WebhookSubscription>>, ApiError> {
    check_project_scope(project_id, authed_project_id)?;

    let webhooks = store::webhook::list_webhooks(&state.pool, project_id, false)
        .await
        .map_err(map_store_error)?;
    Ok(Json(webhooks))
}

pub async fn get_webhook(
    State(state): State<AppState>,
    Path(webhook_id): Path<Uuid>,
    AuthedProject(authed_project_id): AuthedProject,
) -> Result<Json<WebhookSubscription>, ApiError> {
    let webhook = webhook_in_project(&state.pool, authed_project_id, webhook_id).await?;
    Ok(Json(webhook))
}

pub async fn disable_webhook(
    State(state): State<AppState>,
    Path(webhook_id): Path<Uuid>,
    AuthedProject(authed_project_id): AuthedProject,
) -> Result<Json<WebhookSubscription>, ApiError> {
    webhook_in_project(&state.pool, authed_project_id, webhook_id).await?;

    let webhook = store::webhook::disable_webhook(&state.pool, webhook_id)
        .await
        .map_err(map_store_error)?
        .ok_or_else(|| ApiError::not_found("webhook not found"))?;
    Ok(Json(webhook))
}

pub async fn get_circuit_status(
    State(state): State<AppState>,
    Path(webhook_id): Path<Uuid>,
    AuthedProject(authed_project_id): AuthedProject,
) -> Result<Json<CircuitStatusOut>, ApiError> {
    let webhook = webhook_in_project(&state.pool, authed_project_id, webhook_id).await?;

    let breaker = CircuitBreaker::from_config(&state.config);
    let stats = breaker.stats(&state.pool, &webhook.url).await?;

    Ok(Json(CircuitStatusOut {
        webhook_id,
        url: webhook.url,
        circuit_breaker: stats,
    }))
}
