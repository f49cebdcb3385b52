use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const ALLOWED_OPERATORS: [&str; 4] = [">", ">=", "<", "<="];
pub const ALLOWED_SCOPES: [&str; 3] = ["ALL", "EXPLICIT", "TAG"];

pub const MAX_WINDOW_N: i64 = 10_000;
pub const MAX_COOLDOWN_SECONDS: i64 = 86_400;

/// Operator and scope stay plain strings end to end. Creation-time
/// validation restricts them, and the evaluation engine re-checks
/// defensively, so an out-of-range row skips its rule instead of
/// failing the whole run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub id: Uuid,
    pub project_id: Uuid,
    pub name: String,
    pub metric: String,
    pub operator: String,
    pub threshold: f64,
    pub window_n: i64,
    pub required_k: i64,
    pub cooldown_seconds: i64,
    pub enabled: bool,
    pub scope: String,
    pub tag: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RuleCreate {
    pub name: String,
    pub metric: String,
    #[serde(default = "default_operator")]
    pub operator: String,
    pub threshold: f64,
    #[serde(default = "default_window_n")]
    pub window_n: i64,
    #[serde(default = "default_required_k")]
    pub required_k: i64,
    #[serde(default = "default_cooldown_seconds")]
    pub cooldown_seconds: i64,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_scope")]
    pub scope: String,
    pub tag: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RuleUpdate {
    pub name: Option<String>,
    pub metric: Option<String>,
    pub operator: Option<String>,
    pub threshold: Option<f64>,
    pub window_n: Option<i64>,
    pub required_k: Option<i64>,
    pub cooldown_seconds: Option<i64>,
    pub scope: Option<String>,
    pub tag: Option<String>,
    pub enabled: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RuleAssignDevices {
    #[serde(default)]
    pub device_ids: Vec<Uuid>,
}

fn default_operator() -> String {
    ">".to_string()
}

fn default_window_n() -> i64 {
    1
}

fn default_required_k() -> i64 {
    1
}

fn default_cooldown_seconds() -> i64 {
    300
}

fn default_enabled() -> bool {
    true
}

fn default_scope() -> String {
    "ALL".to_string()
}
