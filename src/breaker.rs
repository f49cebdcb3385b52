//! Per-URL circuit breaker over the expiring KV entries.
//!
//! Three independent keys per URL: the state marker, a decaying failure
//! counter, and the instant the circuit opened. No multi-key transaction is
//! needed; each transition touches keys one at a time.

use chrono::{DateTime, Duration, Utc};
use sqlx::SqlitePool;

use crate::config::AppConfig;
use crate::kv;
use crate::types::CircuitStats;

const STATE_TTL_SECS: i64 = 3600;
const FAILURES_TTL_SECS: i64 = 300;

#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    failure_threshold: i64,
    recovery_timeout_secs: i64,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: i64, recovery_timeout_secs: i64) -> Self {
        Self {
            failure_threshold,
            recovery_timeout_secs,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            config.circuit_failure_threshold,
            config.circuit_recovery_timeout_secs,
        )
    }

    fn key_state(url: &str) -> String {
        format!("circuit:state:{url}")
    }

    fn key_failures(url: &str) -> String {
        format!("circuit:failures:{url}")
    }

    fn key_opened_at(url: &str) -> String {
        format!("circuit:opened_at:{url}")
    }

    /// Whether requests to `url` are currently blocked. An open circuit past
    /// its recovery timeout flips to half-open and lets this probe through.
    pub async fn is_open(&self, pool: &SqlitePool, url: &str) -> Result<bool, sqlx::Error> {
        let state = kv::get(pool, &Self::key_state(url)).await?;
        if state.as_deref() != Some("open") {
            return Ok(false);
        }

        if let Some(raw) = kv::get(pool, &Self::key_opened_at(url)).await?
            && let Ok(opened_at) = DateTime::parse_from_rfc3339(&raw)
        {
            let elapsed = Utc::now() - opened_at.with_timezone(&Utc);
            if elapsed > Duration::seconds(self.recovery_timeout_secs) {
                kv::set_ex(pool, &Self::key_state(url), "half_open", STATE_TTL_SECS).await?;
                return Ok(false);
            }
        }

        Ok(true)
    }

    pub async fn record_success(&self, pool: &SqlitePool, url: &str) -> Result<(), sqlx::Error> {
        let state = kv::get(pool, &Self::key_state(url)).await?;
        if state.as_deref() == Some("half_open") {
            kv::del(pool, &Self::key_state(url)).await?;
            kv::del(pool, &Self::key_failures(url)).await?;
            kv::del(pool, &Self::key_opened_at(url)).await?;
        } else {
            kv::del(pool, &Self::key_failures(url)).await?;
        }
        Ok(())
    }

    /// Returns true iff this failure tripped the circuit open.
    pub async fn record_failure(&self, pool: &SqlitePool, url: &str) -> Result<bool, sqlx::Error> {
        let failures = kv::incr_ex(pool, &Self::key_failures(url), FAILURES_TTL_SECS).await?;

        if failures >= self.failure_threshold {
            kv::set_ex(pool, &Self::key_state(url), "open", STATE_TTL_SECS).await?;
            kv::set_ex(
                pool,
                &Self::key_opened_at(url),
                &kv::format_utc(Utc::now()),
                STATE_TTL_SECS,
            )
            .await?;
            return Ok(failures == self.failure_threshold);
        }

        Ok(false)
    }

    pub async fn stats(&self, pool: &SqlitePool, url: &str) -> Result<CircuitStats, sqlx::Error> {
        let state = kv::get(pool, &Self::key_state(url))
            .await?
            .unwrap_or_else(|| "closed".to_string());
        let failures = kv::get(pool, &Self::key_failures(url))
            .await?
            .and_then(|raw| raw.parse::<i64>().ok())
            .unwrap_or(0);
        let opened_at = kv::get(pool, &Self::key_opened_at(url))
            .await?
            .unwrap_or_default();

        Ok(CircuitStats {
            state,
            failures,
            opened_at,
        })
    }
}
