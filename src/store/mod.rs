pub mod alert;
pub mod api_key;
pub mod delivery;
pub mod device;
pub mod org;
pub mod rule;
pub mod telemetry;
pub mod webhook;

use chrono::{SecondsFormat, Utc};
use uuid::Uuid;

#[derive(Debug)]
pub enum StoreError {
    Db(sqlx::Error),
    Conflict(String),
    NotFound(String),
    Parse(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        Self::Db(err)
    }
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "database error: {err}"),
            Self::Conflict(message) => write!(f, "conflict: {message}"),
            Self::NotFound(message) => write!(f, "not found: {message}"),
            Self::Parse(message) => write!(f, "parse error: {message}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// RFC3339 UTC at microsecond precision. Fixed-width, so the TEXT columns
/// compare chronologically in SQL.
pub(crate) fn format_utc(dt: chrono::DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn now_str() -> String {
    format_utc(Utc::now())
}

pub(crate) fn parse_uuid(field: &str, value: &str) -> Result<Uuid, StoreError> {
    Uuid::parse_str(value).map_err(|err| StoreError::Parse(format!("invalid {field}: {err}")))
}

pub(crate) fn parse_json(field: &str, value: &str) -> Result<serde_json::Value, StoreError> {
    serde_json::from_str(value)
        .map_err(|err| StoreError::Parse(format!("invalid {field} JSON: {err}")))
}
