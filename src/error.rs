use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

/// Error body for every client-visible failure: `{"detail": "..."}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorResponse {
    pub detail: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("validation error: {message}")]
    Validation { message: String },

    #[error("unauthorized: {message}")]
    Unauthorized { message: String },

    #[error("forbidden: {message}")]
    Forbidden { message: String },

    #[error("rate limited: {message}")]
    RateLimited { message: String },

    #[error("not found: {message}")]
    NotFound { message: String },

    #[error("database error")]
    Db(#[from] sqlx::Error),

    #[error("internal error: {message}")]
    Internal { message: String },
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized {
            message: message.into(),
        }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden {
            message: message.into(),
        }
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::RateLimited {
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    fn into_response_parts(self) -> (StatusCode, String) {
        match self {
            Self::Validation { message } => (StatusCode::BAD_REQUEST, message),
            Self::Unauthorized { message } => (StatusCode::UNAUTHORIZED, message),
            Self::Forbidden { message } => (StatusCode::FORBIDDEN, message),
            Self::RateLimited { message } => (StatusCode::TOO_MANY_REQUESTS, message),
            Self::NotFound { message } => (StatusCode::NOT_FOUND, message),
            Self::Db(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "database error".to_string(),
            ),
            Self::Internal { message } => (StatusCode::INTERNAL_SERVER_ERROR, message),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = self.into_response_parts();
        (status, Json(ApiErrorResponse { detail })).into_response()
    }
}
