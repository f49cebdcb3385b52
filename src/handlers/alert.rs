use axum::{
    Json,
    extract::{Path, State},
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    auth::AuthedProject,
    error::ApiError,
    extractors::ValidQuery,
    handlers::{check_project_scope, device_in_project, map_store_error, parse_limit},
    state::AppState,
    store,
    types::Alert,
};

#[derive(Debug, Deserialize)]
pub struct AlertsQuery {
    pub limit: Option<i64>,
}

pub async fn list_device_alerts(
    State(state): State<AppState>,
    Path(device_id): Path<Uuid>,
    AuthedProject(authed_project_id): AuthedProject,
    ValidQuery(query): ValidQuery<AlertsQuery>,
) -> Result<Json<Vec<Alert>>, ApiError> {
    device_in_project(&state.pool, authed_project_id, device_id).await?;

    let limit = parse_limit(query.limit, 100, 1000)?;
    let alerts = store::alert::list_alerts_for_device(&state.pool, device_id, limit)
        .await
        .map_err(map_store_error)?;
    Ok(Json(alerts))
}

pub async fn list_project_alerts(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    AuthedProject(authed_project_id): AuthedProject,
    ValidQuery(query): ValidQuery<AlertsQuery>,
) -> Result<Json<Vec<Alert>>, ApiError> {
    check_project_scope(project_id, authed_project_id)?;

    let limit = parse_limit(query.limit, 100, 1000)?;
    let alerts = store::alert::list_alerts_for_project(&state.pool, project_id, limit)
        .await
        .map_err(map_store_error)?;
    Ok(Json(alerts))
}
