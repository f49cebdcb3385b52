use axum::{Json, extract::{Path, State}, http::{HeaderMap, StatusCode}};
use uuid::Uuid;

use crate::{
    auth,
    error::ApiError,
    extractors::ValidJson,
    handlers::map_store_error,
    ratelimit,
    state::AppState,
    store,
    types::{ApiKeyCreateOut, Org, OrgCreate, Project, ProjectCreate},
};

pub async fn create_org(
    State(state): State<AppState>,
    ValidJson(payload): ValidJson<OrgCreate>,
) -> Result<(StatusCode, Json<Org>), ApiError> {
    if payload.name.trim().is_empty() {
        return Err(ApiError::validation("name is required"));
    }

    let org = store::org::create_org(&state.pool, payload.name.trim())
        .await
        .map_err(map_store_error)?;

    Ok((StatusCode::CREATED, Json(org)))
}

pub async fn create_project(
    State(state): State<AppState>,
    Path(org_id): Path<Uuid>,
    ValidJson(payload): ValidJson<ProjectCreate>,
) -> Result<(StatusCode, Json<Project>), ApiError> {
    if payload.name.trim().is_empty() {
        return Err(ApiError::validation("name is required"));
    }

    let org = store::org::get_org(&state.pool, org_id)
        .await
        .map_err(map_store_error)?;
    if org.is_none() {
        return Err(ApiError::not_found("org not found"));
    }

    let project = store::org::create_project(&state.pool, org_id, payload.name.trim())
        .await
        .map_err(map_store_error)?;

    Ok((StatusCode::CREATED, Json(project)))
}

pub async fn create_api_key(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<(StatusCode, Json<ApiKeyCreateOut>), ApiError> {
    ratelimit::enforce(&state, &headers, ratelimit::API_KEY_CREATE).await?;

    let project = store::org::get_project(&state.pool, project_id)
        .await
        .map_err(map_store_error)?;
    if project.is_none() {
        return Err(ApiError::not_found("project not found"));
    }

    let (raw_key, prefix, hashed) = auth::generate_api_key()?;
    store::api_key::create_api_key(&state.pool, project_id, &prefix, &hashed)
        .await
        .map_err(map_store_error)?;

    Ok((
        StatusCode::CREATED,
        Json(ApiKeyCreateOut {
            api_key: raw_key,
            prefix,
            project_id,
        }),
    ))
}
