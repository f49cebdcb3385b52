use axum::{Json, extract::State};
use serde_json::json;

use crate::{error::ApiError, state::AppState};

pub async fn health() -> Json<serde_json::Value> {
    Json(json!({"status": "ok"}))
}

pub async fn health_db(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    sqlx::query("SELECT 1").execute(&state.pool).await?;
    Ok(Json(json!({"db": "ok"})))
}
