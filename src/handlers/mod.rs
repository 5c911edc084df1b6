use axum::http::{header, HeaderMap};

use crate::errors::AppError;

pub mod health;
pub mod mail;
pub mod portal;
pub mod sessions;

/// Bearer check for `/api/*`. An empty expected token means dev mode.
fn check_auth(headers: &HeaderMap, expected_token: &str) -> Result<(), AppError> {
    if expected_token.is_empty() {
        return Ok(());
    }

    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or("");
    if token != expected_token {
        tracing::warn!("rejected request with missing or wrong API token");
        return Err(AppError::Unauthorized);
    }
    Ok(())
}
