use std::time::Instant;

use axum::{body::Body, extract::Request, http::HeaderValue, middleware::Next, response::Response};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// Install the global subscriber. `LOG_LEVEL` takes the usual env-filter
/// syntax; an unparsable value falls back to `info`.
pub fn init(log_level: &str) {
    let filter =
        EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Per-request logging with a generated request id, echoed back in
/// `X-Request-Id`.
pub async fn request_logging(req: Request<Body>, next: Next) -> Response {
    let request_id = Uuid::new_v4().to_string();
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let start = Instant::now();

    info!(request_id = %request_id, method = %method, path = %path, "request_started");

    let mut response = next.run(req).await;
    let duration = start.elapsed();

    if response.status().is_server_error() {
        error!(
            request_id = %request_id,
            method = %method,
            path = %path,
            status_code = response.status().as_u16(),
            duration_ms = duration.as_millis() as u64,
            "request_failed"
        );
    } else {
        info!(
            request_id = %request_id,
            method = %method,
            path = %path,
            status_code = response.status().as_u16(),
            duration_ms = duration.as_millis() as u64,
            "request_completed"
        );
    }

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert("x-request-id", value);
    }

    response
}
