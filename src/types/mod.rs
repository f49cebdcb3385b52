pub mod alert;
pub mod delivery;
pub mod device;
pub mod org;
pub mod rule;
pub mod telemetry;
pub mod webhook;

pub use alert::Alert;
pub use delivery::{DeliveryStatus, WebhookDelivery};
pub use device::{Device, DeviceCreate, DeviceTagsUpdate};
pub use org::{ApiKeyCreateOut, Org, OrgCreate, Project, ProjectCreate};
pub use rule::{Rule, RuleAssignDevices, RuleCreate, RuleUpdate, ALLOWED_OPERATORS, ALLOWED_SCOPES};
pub use telemetry::{IngestAccepted, TelemetryBatchIn, TelemetryEvent, TelemetryEventIn};
pub use webhook::{CircuitStats, CircuitStatusOut, WebhookCreate, WebhookSubscription};
