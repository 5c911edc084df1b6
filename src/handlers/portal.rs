use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;

use super::check_auth;
use crate::errors::AppError;
use crate::state::AppState;

// POST /api/portal/login
//
// Signs the automation session in ahead of the first call, so a caller
// does not wait on the verification email.
pub async fn login(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, AppError> {
    check_auth(&headers, &state.config.api_token)?;

    if state.config.portal_email.is_empty() || state.config.portal_password.is_empty() {
        return Err(AppError::Config(
            "PORTAL_EMAIL and PORTAL_PASSWORD must be set".to_string(),
        ));
    }

    state
        .orchestrator
        .driver()
        .login()
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "portal login failed");
            AppError::Automation(format!("{e:#}"))
        })?;

    Ok(Json(serde_json::json!({ "status": "logged_in" })))
}
