use axum::{
    Json,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
};
use uuid::Uuid;

use crate::{
    auth::AuthedProject,
    error::ApiError,
    extractors::ValidJson,
    handlers::{check_project_scope, map_store_error, rule_in_project},
    ratelimit,
    state::AppState,
    store,
    types::{
        ALLOWED_OPERATORS, ALLOWED_SCOPES, Rule, RuleAssignDevices, RuleCreate, RuleUpdate,
        rule::{MAX_COOLDOWN_SECONDS, MAX_WINDOW_N},
    },
};

pub async fn create_rule(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    AuthedProject(authed_project_id): AuthedProject,
    headers: HeaderMap,
    ValidJson(payload): ValidJson<RuleCreate>,
) -> Result<(StatusCode, Json<Rule>), ApiError> {
    ratelimit::enforce(&state, &headers, ratelimit::RULE_WRITE).await?;
    check_project_scope(project_id, authed_project_id)?;

    if payload.name.trim().is_empty() {
        return Err(ApiError::validation("name is required"));
    }
    if payload.metric.trim().is_empty() {
        return Err(ApiError::validation("metric is required"));
    }
    validate_rule_fields(
        &payload.operator,
        &payload.scope,
        payload.tag.as_deref(),
        payload.window_n,
        payload.required_k,
        payload.cooldown_seconds,
    )?;

    let rule = store::rule::create_rule(&state.pool, project_id, &payload)
        .await
        .map_err(map_store_error)?;

    Ok((StatusCode::CREATED, Json(rule)))
}

pub async fn list_rules(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    AuthedProject(authed_project_id): AuthedProject,
) -> Result<Json<Vec<Rule>>, ApiError> {
    check_project_scope(project_id, authed_project_id)?;

    let rules = store::rule::list_rules_for_project(&state.pool, project_id)
        .await
        .map_err(map_store_error)?;
    Ok(Json(rules))
}

pub async fn list_enabled_rules(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    AuthedProject(authed_project_id): AuthedProject,
) -> Result<Json<Vec<Rule>>, ApiError> {
    check_project_scope(project_id, authed_project_id)?;

    let rules = store::rule::list_enabled_rules_for_project(&state.pool, project_id)
        .await
        .map_err(map_store_error)?;
    Ok(Json(rules))
}

pub async fn get_rule(
    State(state): State<AppState>,
    Path(rule_id): Path<Uuid>,
    AuthedProject(authed_project_id): AuthedProject,
) -> Result<Json<Rule>, ApiError> {
    let rule = rule_in_project(&state.pool, authed_project_id, rule_id).await?;
    Ok(Json(rule))
}

/// Partial update. The merged row is re-validated as a whole, so raising
/// `required_k` alone can never leave it above the stored `window_n`.
pub async fn update_rule(
    State(state): State<AppState>,
    Path(rule_id): Path<Uuid>,
    AuthedProject(authed_project_id): AuthedProject,
    headers: HeaderMap,
    ValidJson(payload): ValidJson<RuleUpdate>,
) -> Result<Json<Rule>, ApiError> {
    ratelimit::enforce(&state, &headers, ratelimit::RULE_WRITE).await?;

    let existing = rule_in_project(&state.pool, authed_project_id, rule_id).await?;

    let merged = store::rule::merge_update(&existing, &payload);
    validate_rule_fields(
        &merged.operator,
        &merged.scope,
        merged.tag.as_deref(),
        merged.window_n,
        merged.required_k,
        merged.cooldown_seconds,
    )?;

    store::rule::save_rule(&state.pool, &merged)
        .await
        .map_err(map_store_error)?;

    Ok(Json(merged))
}

pub async fn delete_rule(
    State(state): State<AppState>,
    Path(rule_id): Path<Uuid>,
    AuthedProject(authed_project_id): AuthedProject,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    ratelimit::enforce(&state, &headers, ratelimit::RULE_WRITE).await?;

    rule_in_project(&state.pool, authed_project_id, rule_id).await?;

    let deleted = store::rule::delete_rule(&state.pool, rule_id)
        .await
        .map_err(map_store_error)?;
    if !deleted {
        return Err(ApiError::not_found("rule not found"));
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn assign_rule_devices(
    State(state): State<AppState>,
    Path(rule_id): Path<Uuid>,
    AuthedProject(authed_project_id): AuthedProject,
    headers: HeaderMap,
    ValidJson(payload): ValidJson<RuleAssignDevices>,
) -> Result<StatusCode, ApiError> {
    ratelimit::enforce(&state, &headers, ratelimit::RULE_ASSIGN_DEVICES).await?;

    let rule = rule_in_project(&state.pool, authed_project_id, rule_id).await?;

    for device_id in &payload.device_ids {
        let device = store::device::get_device(&state.pool, *device_id)
            .await
            .map_err(map_store_error)?
            .ok_or_else(|| ApiError::not_found(format!("device not found: {device_id}")))?;
        if device.project_id != rule.project_id {
            return Err(ApiError::validation(format!(
                "device {device_id} not in rule's project"
            )));
        }
    }

    store::rule::replace_rule_devices(&state.pool, rule_id, &payload.device_ids)
        .await
        .map_err(map_store_error)?;

    Ok(StatusCode::NO_CONTENT)
}

fn validate_rule_fields(
    operator: &str,
    scope: &str,
    tag: Option<&str>,
    window_n: i64,
    required_k: i64,
    cooldown_seconds: i64,
) -> Result<(), ApiError> {
    if !ALLOWED_OPERATORS.contains(&operator) {
        return Err(ApiError::validation("operator must be one of >, >=, <, <="));
    }
    if !ALLOWED_SCOPES.contains(&scope) {
        return Err(ApiError::validation(
            "scope must be one of ALL, EXPLICIT, TAG",
        ));
    }
    if !(1..=MAX_WINDOW_N).contains(&window_n) {
        return Err(ApiError::validation(format!(
            "window_n must be between 1 and {MAX_WINDOW_N}"
        )));
    }
    if required_k < 1 {
        return Err(ApiError::validation("required_k must be at least 1"));
    }
    if required_k > window_n {
        return Err(ApiError::validation(
            "required_k cannot be greater than window_n",
        ));
    }
    if !(0..=MAX_COOLDOWN_SECONDS).contains(&cooldown_seconds) {
        return Err(ApiError::validation(format!(
            "cooldown_seconds must be between 0 and {MAX_COOLDOWN_SECONDS}"
        )));
    }
    if scope == "TAG" {
        if tag.is_none_or(|tag| tag.trim().is_empty()) {
            return Err(ApiError::validation("tag is required when scope is TAG"));
        }
    } else if tag.is_some() {
        return Err(ApiError::validation("tag must be null unless scope is TAG"));
    }
    Ok(())
}
