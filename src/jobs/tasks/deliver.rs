//! One delivery attempt for one delivery row.
//!
//! The attempt must first win the conditional `sending` transition; losing
//! it means another worker holds the row or it is already terminal. After
//! that, every outcome maps to exactly one state transition plus a circuit
//! breaker update. Retries go through the queue's delayed execution, never
//! through an in-process HTTP retry; a retry the queue refuses to schedule
//! turns into the terminal `failed` transition instead.

use chrono::{SecondsFormat, Utc};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::jobs::worker::WorkerContext;
use crate::jobs::{Job, queue};
use crate::signing;
use crate::store::{self, StoreError};
use crate::types::DeliveryStatus;

pub async fn run(
    ctx: &WorkerContext,
    job: &Job,
    delivery_id: Uuid,
) -> Result<&'static str, StoreError> {
    info!(delivery_id = %delivery_id, attempt = job.attempts, "webhook_delivery_started");

    let Some(delivery) = store::delivery::get_delivery(&ctx.pool, delivery_id).await? else {
        return Ok("delivery_missing");
    };

    if delivery.status == DeliveryStatus::Success {
        return Ok("already_success");
    }

    if !store::delivery::try_mark_sending(&ctx.pool, delivery_id).await? {
        return Ok("in_progress_or_already_handled");
    }

    let Some(alert) = store::alert::get_alert(&ctx.pool, delivery.alert_id).await? else {
        store::delivery::mark_failed(&ctx.pool, delivery_id, None, "alert_missing").await?;
        return Ok("alert_missing");
    };

    if store::device::get_device(&ctx.pool, alert.device_id)
        .await?
        .is_none()
    {
        store::delivery::mark_failed(&ctx.pool, delivery_id, None, "device_missing").await?;
        return Ok("device_missing");
    }

    let webhook = store::webhook::get_webhook(&ctx.pool, delivery.webhook_id).await?;
    let Some(webhook) = webhook.filter(|wh| wh.enabled) else {
        store::delivery::mark_failed(
            &ctx.pool,
            delivery_id,
            None,
            "webhook_missing_or_disabled",
        )
        .await?;
        return Ok("webhook_missing_or_disabled");
    };

    if ctx.breaker.is_open(&ctx.pool, &webhook.url).await? {
        warn!(
            delivery_id = %delivery_id,
            webhook_id = %webhook.id,
            url = %webhook.url,
            "webhook_circuit_open"
        );
        return retry_or_fail(
            ctx,
            job,
            delivery_id,
            None,
            &format!("circuit_open:{}", webhook.url),
            "max_retries_exceeded:circuit_open",
            "retrying_circuit_open",
        )
        .await;
    }

    let body = signing::canonical_payload(&alert);
    let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);

    let mut request = ctx
        .http
        .post(&webhook.url)
        .header("Content-Type", "application/json")
        .header("X-Telemetry-Timestamp", &timestamp);
    if let Some(secret) = webhook.secret.as_deref() {
        request = request.header(
            "X-Telemetry-Signature",
            signing::sign(secret, &timestamp, &body),
        );
    }

    match request.body(body).send().await {
        Ok(response) => {
            let code = i64::from(response.status().as_u16());

            if (200..300).contains(&code) {
                info!(
                    delivery_id = %delivery_id,
                    webhook_id = %webhook.id,
                    url = %webhook.url,
                    status_code = code,
                    attempt = job.attempts,
                    "webhook_delivered"
                );
                ctx.breaker.record_success(&ctx.pool, &webhook.url).await?;
                store::delivery::mark_success(&ctx.pool, delivery_id, code).await?;
                return Ok("success");
            }

            if code == 408 || code == 429 || code >= 500 {
                warn!(
                    delivery_id = %delivery_id,
                    webhook_id = %webhook.id,
                    url = %webhook.url,
                    status_code = code,
                    attempt = job.attempts,
                    "webhook_retryable_error"
                );
                ctx.breaker.record_failure(&ctx.pool, &webhook.url).await?;
                return retry_or_fail(
                    ctx,
                    job,
                    delivery_id,
                    Some(code),
                    &format!("retryable_status_{code}"),
                    "max_retries_exceeded",
                    "retrying",
                )
                .await;
            }

            error!(
                delivery_id = %delivery_id,
                webhook_id = %webhook.id,
                url = %webhook.url,
                status_code = code,
                "webhook_non_retryable_error"
            );
            ctx.breaker.record_failure(&ctx.pool, &webhook.url).await?;
            store::delivery::mark_failed(
                &ctx.pool,
                delivery_id,
                Some(code),
                &format!("non_retryable_status_{code}"),
            )
            .await?;
            Ok("failed_non_retryable")
        }
        Err(err) => {
            warn!(
                delivery_id = %delivery_id,
                webhook_id = %webhook.id,
                url = %webhook.url,
                error = %err,
                attempt = job.attempts,
                "webhook_transport_error"
            );
            ctx.breaker.record_failure(&ctx.pool, &webhook.url).await?;
            retry_or_fail(
                ctx,
                job,
                delivery_id,
                None,
                &format!("http_error:{}", transport_error_kind(&err)),
                "max_retries_exceeded:http_error",
                "retrying",
            )
            .await
        }
    }
}

/// Schedule the next attempt when the budget allows, else fail terminally.
/// Either way the row leaves `sending` through exactly one transition.
async fn retry_or_fail(
    ctx: &WorkerContext,
    job: &Job,
    delivery_id: Uuid,
    status_code: Option<i64>,
    retry_error: &str,
    exhausted_error: &str,
    retrying_outcome: &'static str,
) -> Result<&'static str, StoreError> {
    let countdown = queue::retry_countdown_secs(job.attempts - 1);
    let outcome = queue::schedule_retry(
        &ctx.pool,
        job,
        &ctx.config.worker_id,
        countdown,
        ctx.config.delivery_max_attempts,
    )
    .await?;

    match outcome {
        queue::RetryOutcome::Scheduled => {
            store::delivery::mark_retrying(&ctx.pool, delivery_id, status_code, retry_error)
                .await?;
            Ok(retrying_outcome)
        }
        queue::RetryOutcome::Exhausted => {
            store::delivery::mark_failed(&ctx.pool, delivery_id, status_code, exhausted_error)
                .await?;
            Ok("failed_max_retries")
        }
    }
}

fn transport_error_kind(err: &reqwest::Error) -> &'static str {
    if err.is_timeout() {
        "timeout"
    } else if err.is_connect() {
        "connect"
    } else if err.is_request() {
        "request"
    } else if err.is_body() {
        "body"
    } else if err.is_decode() {
        "decode"
    } else {
        "unknown"
    }
}
