pub mod queue;
pub mod tasks;
pub mod worker;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::TelemetryEventIn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    IngestEvents,
    EvaluateRules,
    FanOutAlert,
    DeliverWebhook,
}

impl JobKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::IngestEvents => "ingest_events",
            Self::EvaluateRules => "evaluate_rules",
            Self::FanOutAlert => "fan_out_alert",
            Self::DeliverWebhook => "deliver_webhook",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "ingest_events" => Some(Self::IngestEvents),
            "evaluate_rules" => Some(Self::EvaluateRules),
            "fan_out_alert" => Some(Self::FanOutAlert),
            "deliver_webhook" => Some(Self::DeliverWebhook),
            _ => None,
        }
    }
}

/// A leased job. `attempts` counts executions including the current one.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: Uuid,
    pub kind: JobKind,
    pub payload: serde_json::Value,
    pub attempts: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestJob {
    pub device_id: Uuid,
    pub events: Vec<TelemetryEventIn>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluateJob {
    pub device_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FanOutJob {
    pub alert_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliverJob {
    pub delivery_id: Uuid,
}
