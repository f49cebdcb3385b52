use axum::{
    Json,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
};
use serde::Serialize;
use uuid::Uuid;

use crate::{
    auth::AuthedProject,
    error::ApiError,
    extractors::ValidJson,
    handlers::{check_project_scope, device_in_project, map_store_error},
    ratelimit,
    state::AppState,
    store,
    types::{Device, DeviceCreate, DeviceTagsUpdate},
};

#[derive(Debug, Serialize)]
pub struct DeviceTagsOut {
    pub device_id: Uuid,
    pub tags: Vec<String>,
}

pub async fn create_device(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    AuthedProject(authed_project_id): AuthedProject,
    headers: HeaderMap,
    ValidJson(payload): ValidJson<DeviceCreate>,
) -> Result<(StatusCode, Json<Device>), ApiError> {
    ratelimit::enforce(&state, &headers, ratelimit::DEVICE_CREATE).await?;
    check_project_scope(project_id, authed_project_id)?;

    if payload.external_id.trim().is_empty() {
        return Err(ApiError::validation("external_id is required"));
    }
    if payload.name.trim().is_empty() {
        return Err(ApiError::validation("name is required"));
    }

    let device = store::device::create_device(
        &state.pool,
        project_id,
        payload.external_id.trim(),
        payload.name.trim(),
        &payload.tags,
    )
    .await
    .map_err(map_store_error)?;

    Ok((StatusCode::CREATED, Json(device)))
}

pub async fn list_devices(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    AuthedProject(authed_project_id): AuthedProject,
) -> Result<Json<Vec<Device>>, ApiError> {
    check_project_scope(project_id, authed_project_id)?;

    let devices = store::device::list_devices(&state.pool, project_id)
        .await
        .map_err(map_store_error)?;
    Ok(Json(devices))
}

pub async fn get_device(
    State(state): State<AppState>,
    Path((project_id, device_id)): Path<(Uuid, Uuid)>,
    AuthedProject(authed_project_id): AuthedProject,
) -> Result<Json<Device>, ApiError> {
    check_project_scope(project_id, authed_project_id)?;
    let device = device_in_project(&state.pool, authed_project_id, device_id).await?;
    Ok(Json(device))
}

pub async fn delete_device(
    State(state): State<AppState>,
    Path((project_id, device_id)): Path<(Uuid, Uuid)>,
    AuthedProject(authed_project_id): AuthedProject,
) -> Result<StatusCode, ApiError> {
    check_project_scope(project_id, authed_project_id)?;
    device_in_project(&state.pool, authed_project_id, device_id).await?;

    let deleted = store::device::delete_device(&state.pool, device_id)
        .await
        .map_err(map_store_error)?;
    if !deleted {
        return Err(ApiError::not_found("device not found"));
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn replace_device_tags(
    State(state): State<AppState>,
    Path((project_id, device_id)): Path<(Uuid, Uuid)>,
    AuthedProject(authed_project_id): AuthedProject,
    ValidJson(payload): ValidJson<DeviceTagsUpdate>,
) -> Result<Json<DeviceTagsOut>, ApiError> {
    check_project_scope(project_id, authed_project_id)?;
    device_in_project(&state.pool, authed_project_id, device_id).await?;

    let device = store::device::set_tags(&state.pool, device_id, &payload.tags)
        .await
        .map_err(map_store_error)?
        .ok_or_else(|| ApiError::not_found("device not found"))?;
    Ok(Json(DeviceTagsOut {
        device_id: device.id,
        tags: device.tags,
    }))
}

pub async fn add_device_tags(
    State(state): State<AppState>,
    Path((project_id, device_id)): Path<(Uuid, Uuid)>,
    AuthedProject(authed_project_id): AuthedProject,
    ValidJson(payload): ValidJson<DeviceTagsUpdate>,
) -> Result<Json<DeviceTagsOut>, ApiError> {
    check_project_scope(project_id, authed_project_id)?;
    device_in_project(&state.pool, authed_project_id, device_id).await?;

    let device = store::device::add_tags(&state.pool, device_id, &payload.tags)
        .await
        .map_err(map_store_error)?
        .ok_or_else(|| ApiError::not_found("device not found"))?;
    Ok(Json(DeviceTagsOut {
        device_id: device.id,
        tags: device.tags,
    }))
}

pub async fn remove_device_tags(
    State(state): State<AppState>,
    Path((project_id, device_id)): Path<(Uuid, Uuid)>,
    AuthedProject(authed_project_id): AuthedProject,
    ValidJson(payload): ValidJson<DeviceTagsUpdate>,
) -> Result<Json<DeviceTagsOut>, ApiError> {
    check_project_scope(project_id, authed_project_id)?;
    device_in_project(&state.pool, authed_project_id, device_id).await?;

    let device = store::device::remove_tags(&state.pool, device_id, &payload.tags)
        .await
        .map_err(map_store_error)?
        .ok_or_else(|| ApiError::not_found("device not found"))?;
    Ok(Json(DeviceTagsOut {
        device_id: device.id,
        tags: device.tags,
    }))
}
