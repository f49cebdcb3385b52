use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One event as submitted by a device. `ts` stays a raw string here; the
/// ingest worker is the one that parses it, so a bad timestamp can be
/// dropped there without failing the whole batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryEventIn {
    pub ts: String,
    #[serde(default = "default_data")]
    pub data: serde_json::Value,
}

fn default_data() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryBatchIn {
    pub device_external_id: String,
    pub events: Vec<TelemetryEventIn>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryEvent {
    pub id: Uuid,
    pub device_id: Uuid,
    pub ts: String,
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestAccepted {
    pub queued: usize,
    pub device_id: Uuid,
}
