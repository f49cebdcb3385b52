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
    handlers::{map_store_error, parse_limit},
    state::AppState,
    store,
    types::{DeliveryStatus, WebhookDelivery},
};

#[derive(Debug, Deserialize)]
pub struct DeliveriesQuery {
    pub status: Option<String>,
    pub limit: Option<i64>,
}

/// Scoped to the authenticated project: a mismatched path project returns
/// an empty list rather than leaking whether it exists.
pub async fn list_deliveries(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    AuthedProject(authed_project_id): AuthedProject,
    ValidQuery(query): ValidQuery<DeliveriesQuery>,
) -> Result<Json<Vec<WebhookDelivery>>, ApiError> {
    if project_id != authed_project_id {
        return Ok(Json(Vec::new()));
    }

    let status = query
        .status
        .as_deref()
        .map(|raw| {
            DeliveryStatus::parse(raw).ok_or_else(|| ApiError::validation("status is invalid"))
        })
        .transpose()?;
    let limit = parse_limit(query.limit, 100, 1000)?;

    let deliveries = store::delivery::list_deliveries(&state.pool, project_id, status, limit)
        .await
        .map_err(map_store_error)?;
    Ok(Json(deliveries))
}
