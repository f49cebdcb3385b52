use axum::{
    Json,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    auth::AuthedProject,
    error::ApiError,
    extractors::{ValidJson, ValidQuery},
    handlers::{device_in_project, map_store_error, parse_limit},
    jobs::{IngestJob, JobKind, queue},
    ratelimit,
    state::AppState,
    store,
    types::{IngestAccepted, TelemetryBatchIn, TelemetryEvent},
};

pub const MAX_BATCH_SIZE: usize = 5000;

/// Accept a batch and enqueue it. Events are not durable at 202 time; the
/// ingest worker persists them and triggers evaluation.
pub async fn ingest_telemetry(
    State(state): State<AppState>,
    AuthedProject(project_id): AuthedProject,
    headers: HeaderMap,
    ValidJson(payload): ValidJson<TelemetryBatchIn>,
) -> Result<(StatusCode, Json<IngestAccepted>), ApiError> {
    ratelimit::enforce(&state, &headers, ratelimit::INGESTION).await?;

    if payload.events.is_empty() {
        return Err(ApiError::validation("events cannot be empty"));
    }
    if payload.events.len() > MAX_BATCH_SIZE {
        return Err(ApiError::validation(format!(
            "too many events (max {MAX_BATCH_SIZE})"
        )));
    }

    let device =
        store::device::find_by_external_id(&state.pool, project_id, &payload.device_external_id)
            .await
            .map_err(map_store_error)?
            .ok_or_else(|| ApiError::not_found("device not found"))?;

    let queued = payload.events.len();
    queue::enqueue(
        &state.pool,
        JobKind::IngestEvents,
        &IngestJob {
            device_id: device.id,
            events: payload.events,
        },
    )
    .await
    .map_err(map_store_error)?;

    Ok((
        StatusCode::ACCEPTED,
        Json(IngestAccepted {
            queued,
            device_id: device.id,
        }),
    ))
}

#[derive(Debug, Deserialize)]
pub struct LatestQuery {
    pub limit: Option<i64>,
}

pub async fn list_latest(
    State(state): State<AppState>,
    Path(device_id): Path<Uuid>,
    AuthedProject(authed_project_id): AuthedProject,
    ValidQuery(query): ValidQuery<LatestQuery>,
) -> Result<Json<Vec<TelemetryEvent>>, ApiError> {
    device_in_project(&state.pool, authed_project_id, device_id).await?;

    let limit = parse_limit(query.limit, 100, 1000)?;
    let events = store::telemetry::list_latest_events(&state.pool, device_id, limit)
        .await
        .map_err(map_store_error)?;
    Ok(Json(events))
}

pub async fn get_latest(
    State(state): State<AppState>,
    Path(device_id): Path<Uuid>,
    AuthedProject(authed_project_id): AuthedProject,
) -> Result<Json<TelemetryEvent>, ApiError> {
    device_in_project(&state.pool, authed_project_id, device_id).await?;

    let event = store::telemetry::get_latest_event(&state.pool, device_id)
        .await
        .map_err(map_store_error)?
        .ok_or_else(|| ApiError::not_found("no telemetry events for device"))?;
    Ok(Json(event))
}

#[derive(Debug, Deserialize)]
pub struct SinceQuery {
    /// Unix timestamp in seconds.
    pub since_ts: f64,
}

pub async fn list_since(
    State(state): State<AppState>,
    Path(device_id): Path<Uuid>,
    AuthedProject(authed_project_id): AuthedProject,
    ValidQuery(query): ValidQuery<SinceQuery>,
) -> Result<Json<Vec<TelemetryEvent>>, ApiError> {
    device_in_project(&state.pool, authed_project_id, device_id).await?;

    let secs = query.since_ts.trunc() as i64;
    let nsecs = (query.since_ts.fract() * 1e9) as u32;
    let since = chrono::DateTime::from_timestamp(secs, nsecs)
        .ok_or_else(|| ApiError::validation("since_ts is out of range"))?;

    let events = store::telemetry::list_events_since(&state.pool, device_id, since)
        .await
        .map_err(map_store_error)?;
    Ok(Json(events))
}
