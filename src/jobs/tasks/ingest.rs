use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::jobs::worker::WorkerContext;
use crate::jobs::{EvaluateJob, IngestJob, JobKind, queue};
use crate::store::{self, StoreError};

/// Persist a batch for one device, then kick off evaluation. Events whose
/// timestamp does not parse are dropped with a warning; they never abort
/// the batch and are not retried.
pub async fn run(ctx: &WorkerContext, payload: &IngestJob) -> Result<usize, StoreError> {
    let device_id = payload.device_id;
    info!(
        task = "ingest_events",
        device_id = %device_id,
        event_count = payload.events.len(),
        "task_started"
    );

    if payload.events.is_empty() {
        warn!(device_id = %device_id, "empty_events");
        return Ok(0);
    }

    let mut parsed: Vec<(DateTime<Utc>, serde_json::Value)> =
        Vec::with_capacity(payload.events.len());
    for event in &payload.events {
        match DateTime::parse_from_rfc3339(&event.ts) {
            Ok(ts) => parsed.push((ts.with_timezone(&Utc), event.data.clone())),
            Err(err) => {
                warn!(
                    device_id = %device_id,
                    ts = %event.ts,
                    error = %err,
                    "skipping_malformed_event"
                );
            }
        }
    }

    if parsed.is_empty() {
        warn!(device_id = %device_id, "no_valid_events");
        return Ok(0);
    }

    let inserted = store::telemetry::insert_events(&ctx.pool, device_id, &parsed).await?;
    info!(device_id = %device_id, event_count = inserted, "events_ingested");

    queue::enqueue(
        &ctx.pool,
        JobKind::EvaluateRules,
        &EvaluateJob { device_id },
    )
    .await?;

    Ok(inserted)
}
