//! Fixed-window rate limiting over the expiring KV entries.
//!
//! Counters live in the same KV table the circuit breaker uses; one atomic
//! `incr_ex` per window is the whole mechanism, so limits hold across
//! processes. The bucket key is the caller's API-key prefix when present,
//! else the forwarded client address. Write handlers check their tier
//! before doing any work.

use axum::http::HeaderMap;
use chrono::Utc;

use crate::{auth::API_KEY_HEADER, error::ApiError, kv, state::AppState};

#[derive(Debug, Clone, Copy)]
pub struct RateLimit {
    pub name: &'static str,
    pub limit: i64,
    pub window_secs: i64,
}

pub const INGESTION: &[RateLimit] = &[
    RateLimit {
        name: "ingestion-burst",
        limit: 1000,
        window_secs: 60,
    },
    RateLimit {
        name: "ingestion-sustained",
        limit: 10_000,
        window_secs: 3600,
    },
];

pub const WEBHOOK_CREATE: &[RateLimit] = &[RateLimit {
    name: "webhook-create",
    limit: 50,
    window_secs: 3600,
}];

pub const API_KEY_CREATE: &[RateLimit] = &[RateLimit {
    name: "api-key-create",
    limit: 10,
    window_secs: 3600,
}];

pub const RULE_WRITE: &[RateLimit] = &[RateLimit {
    name: "rule-write",
    limit: 100,
    window_secs: 3600,
}];

pub const RULE_ASSIGN_DEVICES: &[RateLimit] = &[RateLimit {
    name: "rule-assign-devices",
    limit: 200,
    window_secs: 3600,
}];

pub const DEVICE_CREATE: &[RateLimit] = &[RateLimit {
    name: "device-create",
    limit: 100,
    window_secs: 3600,
}];

/// API-key prefix when the header looks like a key, else the client address.
pub fn caller_key(headers: &HeaderMap) -> String {
    if let Some(raw) = headers
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        && let Some((prefix, _)) = raw.split_once('.')
    {
        return format!("key:{prefix}");
    }

    let ip = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .unwrap_or("unknown");
    format!("ip:{ip}")
}

pub async fn enforce(
    state: &AppState,
    headers: &HeaderMap,
    limits: &[RateLimit],
) -> Result<(), ApiError> {
    let caller = caller_key(headers);
    let now = Utc::now().timestamp();

    for limit in limits {
        let window_start = (now / limit.window_secs) * limit.window_secs;
        let key = format!("ratelimit:{}:{caller}:{window_start}", limit.name);
        let count = kv::incr_ex(&state.pool, &key, limit.window_secs).await?;
        if count > limit.limit {
            return Err(ApiError::rate_limited(format!(
                "rate limit exceeded: {} per {} seconds",
                limit.limit, limit.window_secs
            )));
        }
    }

    Ok(())
}
