pub mod deliver;
pub mod evaluate;
pub mod fanout;
pub mod ingest;

use serde::de::DeserializeOwned;
use tracing::debug;

use crate::jobs::worker::WorkerContext;
use crate::jobs::{DeliverJob, EvaluateJob, FanOutJob, IngestJob, Job, JobKind};
use crate::store::StoreError;

pub async fn run_job(ctx: &WorkerContext, job: &Job) -> Result<(), StoreError> {
    match job.kind {
        JobKind::IngestEvents => {
            let payload: IngestJob = parse_payload(job)?;
            ingest::run(ctx, &payload).await?;
        }
        JobKind::EvaluateRules => {
            let payload: EvaluateJob = parse_payload(job)?;
            evaluate::run(ctx, payload.device_id).await?;
        }
        JobKind::FanOutAlert => {
            let payload: FanOutJob = parse_payload(job)?;
            fanout::run(ctx, payload.alert_id).await?;
        }
        JobKind::DeliverWebhook => {
            let payload: DeliverJob = parse_payload(job)?;
            let outcome = deliver::run(ctx, job, payload.delivery_id).await?;
            debug!(job_id = %job.id, outcome = %outcome, "delivery_outcome");
        }
    }
    Ok(())
}

fn parse_payload<T: DeserializeOwned>(job: &Job) -> Result<T, StoreError> {
    serde_json::from_value(job.payload.clone())
        .map_err(|err| StoreError::Parse(format!("invalid {} payload: {err}", job.kind.as_str())))
}
