use uuid::Uuid;

use crate::engine;
use crate::jobs::worker::WorkerContext;
use crate::jobs::{FanOutJob, JobKind, queue};
use crate::store::StoreError;

/// Run the evaluation engine for one device, then enqueue webhook fan-out
/// for every alert it created. The engine itself never touches the queue.
pub async fn run(ctx: &WorkerContext, device_id: Uuid) -> Result<Vec<Uuid>, StoreError> {
    let alert_ids = engine::evaluate_rules_for_device(&ctx.pool, device_id).await?;

    for alert_id in &alert_ids {
        queue::enqueue(
            &ctx.pool,
            JobKind::FanOutAlert,
            &FanOutJob {
                alert_id: *alert_id,
            },
        )
        .await?;
    }

    Ok(alert_ids)
}
