use tracing::info;
use uuid::Uuid;

use crate::jobs::worker::WorkerContext;
use crate::jobs::{DeliverJob, JobKind, queue};
use crate::store::{self, StoreError};

/// Materialize one delivery row per enabled subscription for the alert and
/// enqueue one delivery task per row. Rows that already exist keep their
/// ids, so running this twice enqueues over the same row set; the delivery
/// worker's state check makes the extra tasks no-ops.
pub async fn run(ctx: &WorkerContext, alert_id: Uuid) -> Result<usize, StoreError> {
    let Some(alert) = store::alert::get_alert(&ctx.pool, alert_id).await? else {
        return Ok(0);
    };

    let Some(device) = store::device::get_device(&ctx.pool, alert.device_id).await? else {
        return Ok(0);
    };

    let webhooks = store::webhook::list_webhooks(&ctx.pool, device.project_id, true).await?;
    if webhooks.is_empty() {
        return Ok(0);
    }

    let mut delivery_ids = Vec::with_capacity(webhooks.len());
    for webhook in &webhooks {
        let delivery_id = store::delivery::ensure_delivery_row(
            &ctx.pool,
            device.project_id,
            alert_id,
            webhook.id,
        )
        .await?;
        delivery_ids.push(delivery_id);
    }

    for delivery_id in &delivery_ids {
        queue::enqueue(
            &ctx.pool,
            JobKind::DeliverWebhook,
            &DeliverJob {
                delivery_id: *delivery_id,
            },
        )
        .await?;
    }

    info!(
        alert_id = %alert_id,
        delivery_count = delivery_ids.len(),
        "webhook_fanout_enqueued"
    );

    Ok(delivery_ids.len())
}
