use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha1::Sha1;

use crate::errors::AppError;
use crate::services::otp::InboundEmail;
use crate::state::AppState;

pub const SIGNATURE_HEADER: &str = "x-mail-signature";

/// Checks a base64 HMAC-SHA1 of the raw request body.
fn valid_signature(secret: &str, signature: &str, body: &[u8]) -> bool {
    let Ok(claimed) = base64::engine::general_purpose::STANDARD.decode(signature.trim()) else {
        return false;
    };
    let mut mac = match Hmac::<Sha1>::new_from_slice(secret.as_bytes()) {
        Ok(m) => m,
        Err(_) => return false,
    };
    mac.update(body);
    mac.verify_slice(&claimed).is_ok()
}

// POST /webhook/mail
pub async fn inbound_mail(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    // Skip if no secret is configured (dev mode)
    let secret = &state.config.mail_webhook_secret;
    if !secret.is_empty() {
        let signature = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if signature.is_empty() {
            tracing::warn!("missing mail webhook signature");
            return Err(AppError::Forbidden("missing signature".to_string()));
        }
        if !valid_signature(secret, signature, &body) {
            tracing::warn!("invalid mail webhook signature");
            return Err(AppError::Forbidden("invalid signature".to_string()));
        }
    }

    let email: InboundEmail = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("invalid email payload: {e}")))?;
    if email.text.is_none() && email.html.is_none() {
        return Err(AppError::BadRequest("email has no body".to_string()));
    }

    tracing::info!(from = %email.from, subject = %email.subject, "inbound email");
    state.mailbox.deliver(email);

    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "status": "queued" })),
    ))
}
