pub mod auth;
pub mod breaker;
pub mod config;
pub mod engine;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod jobs;
pub mod kv;
pub mod logging;
pub mod ratelimit;
pub mod signing;
pub mod state;
pub mod store;
pub mod types;

use axum::{
    Router, middleware,
    routing::{get, patch, post},
};

use crate::state::AppState;

pub fn api_router(state: AppState) -> Router {
    Router::new()
        .route("/orgs", post(handlers::org::create_org))
        .route(
            "/orgs/:org_id/projects",
            post(handlers::org::create_project),
        )
        .route(
            "/projects/:project_id/api-keys",
            post(handlers::org::create_api_key),
        )
        .route(
            "/projects/:project_id/devices",
            post(handlers::device::create_device).get(handlers::device::list_devices),
        )
        .route(
            "/projects/:project_id/devices/:device_id",
            get(handlers::device::get_device).delete(handlers::device::delete_device),
        )
        .route(
            "/projects/:project_id/devices/:device_id/tags",
            patch(handlers::device::replace_device_tags)
                .post(handlers::device::add_device_tags)
                .delete(handlers::device::remove_device_tags),
        )
        .route(
            "/projects/:project_id/rules",
            post(handlers::rule::create_rule).get(handlers::rule::list_rules),
        )
        .route(
            "/projects/:project_id/rules/enabled",
            get(handlers::rule::list_enabled_rules),
        )
        .route(
            "/rules/:rule_id",
            get(handlers::rule::get_rule)
                .patch(handlers::rule::update_rule)
                .delete(handlers::rule::delete_rule),
        )
        .route(
            "/rules/:rule_id/devices",
            post(handlers::rule::assign_rule_devices),
        )
        .route("/telemetry", post(handlers::telemetry::ingest_telemetry))
        .route(
            "/telemetry/devices/:device_id/telemetry",
            get(handlers::telemetry::list_latest),
        )
        .route(
            "/telemetry/devices/:device_id/telemetry/latest",
            get(handlers::telemetry::get_latest),
        )
        .route(
            "/telemetry/devices/:device_id/telemetry/since",
            get(handlers::telemetry::list_since),
        )
        .route(
            "/devices/:device_id/alerts",
            get(handlers::alert::list_device_alerts),
        )
        .route(
            "/projects/:project_id/alerts",
            get(handlers::alert::list_project_alerts),
        )
        .route(
            "/projects/:project_id/webhooks",
            post(handlers::webhook::create_webhook).get(handlers::webhook::list_webhooks),
        )
        .route("/webhooks/:webhook_id", get(handlers::webhook::get_webhook))
        .route(
            "/webhooks/:webhook_id/disable",
            post(handlers::webhook::disable_webhook),
        )
        .route(
            "/webhooks/:webhook_id/circuit-status",
            get(handlers::webhook::get_circuit_status),
        )
        .route(
            "/projects/:project_id/webhook-deliveries",
            get(handlers::delivery::list_deliveries),
        )
        .route("/health", get(handlers::health::health))
        .route("/health/db", get(handlers::health::health_db))
        .layer(middleware::from_fn(logging::request_logging))
        .with_state(state)
}
