//! API-key authentication.
//!
//! Presented keys are `"<prefix>.<secret>"`. The prefix is a plain indexed
//! lookup; the secret is verified with argon2 against the stored hash. The
//! raw secret is shown exactly once, at creation.

use argon2::Argon2;
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngCore;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{error::ApiError, state::AppState, store};

pub const API_KEY_HEADER: &str = "X-API-Key";

/// Generate a fresh key. Returns `(raw_key, prefix, hashed_secret)`; the raw
/// key is `"<prefix>.<secret>"`.
pub fn generate_api_key() -> Result<(String, String, String), ApiError> {
    let mut prefix_bytes = [0u8; 4];
    rand::thread_rng().fill_bytes(&mut prefix_bytes);
    let prefix = hex::encode(prefix_bytes);

    let mut secret_bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut secret_bytes);
    let secret = URL_SAFE_NO_PAD.encode(secret_bytes);

    let hashed = hash_secret(&secret)?;
    let raw_key = format!("{prefix}.{secret}");

    Ok((raw_key, prefix, hashed))
}

pub fn hash_secret(secret: &str) -> Result<String, ApiError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(secret.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| ApiError::internal(format!("failed to hash secret: {err}")))
}

pub fn verify_secret(secret: &str, stored_hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored_hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(secret.as_bytes(), &parsed)
        .is_ok()
}

/// Extractor resolving the `X-API-Key` header to the key's project.
/// Missing header is 401; malformed, unknown, bad-secret, and revoked keys
/// are all 403.
pub struct AuthedProject(pub Uuid);

#[async_trait]
impl FromRequestParts<AppState> for AuthedProject {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(raw) = parts
            .headers
            .get(API_KEY_HEADER)
            .and_then(|value| value.to_str().ok())
        else {
            warn!("auth_missing_api_key");
            return Err(ApiError::unauthorized("Missing X-API-Key"));
        };

        let Some((prefix, secret)) = raw.split_once('.') else {
            warn!("auth_invalid_format");
            return Err(ApiError::forbidden("Invalid API key format"));
        };

        let record = store::api_key::find_by_prefix(&state.pool, prefix)
            .await
            .map_err(|err| ApiError::internal(err.to_string()))?;
        let Some(record) = record else {
            warn!(key_prefix = %prefix, "auth_key_not_found");
            return Err(ApiError::forbidden("Invalid API key"));
        };

        if !verify_secret(secret, &record.hashed_secret) {
            warn!(key_prefix = %prefix, project_id = %record.project_id, "auth_invalid_secret");
            return Err(ApiError::forbidden("Invalid API key"));
        }

        debug!(key_prefix = %prefix, project_id = %record.project_id, "auth_success");
        Ok(AuthedProject(record.project_id))
    }
}
