use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Immutable once created. `details` holds the rule snapshot and the
/// evaluation outcome that produced the alert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    pub device_id: Uuid,
    pub rule_id: Uuid,
    pub triggered_at: String,
    pub details: serde_json::Value,
}
