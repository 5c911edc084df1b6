use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::check_auth;
use crate::errors::AppError;
use crate::models::Session;
use crate::services::conversation::AgentReply;
use crate::services::sessions::SharedSession;
use crate::state::AppState;

const MAX_UTTERANCE_CHARS: usize = 2000;

// POST /api/sessions
#[derive(Serialize)]
pub struct CreatedSession {
    session_id: Uuid,
    reply: AgentReply,
}

pub async fn create_session(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<(StatusCode, Json<CreatedSession>), AppError> {
    check_auth(&headers, &state.config.api_token)?;

    let mut session = state.orchestrator.new_session();
    let reply = state.orchestrator.greet(&mut session);
    let session_id = session.id;
    state.sessions.insert(session);

    Ok((StatusCode::CREATED, Json(CreatedSession { session_id, reply })))
}

// POST /api/sessions/:id/turn
#[derive(Deserialize)]
pub struct TurnRequest {
    pub text: String,
}

pub async fn take_turn(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(req): Json<TurnRequest>,
) -> Result<Json<AgentReply>, AppError> {
    check_auth(&headers, &state.config.api_token)?;

    if req.text.chars().count() > MAX_UTTERANCE_CHARS {
        return Err(AppError::BadRequest(format!(
            "utterance longer than {MAX_UTTERANCE_CHARS} characters"
        )));
    }

    let shared = live_session(&state, id).await?;
    let mut session = shared.lock().await;
    let reply = state
        .orchestrator
        .handle_user_utterance(&mut session, req.text.trim())
        .await;

    Ok(Json(reply))
}

// GET /api/sessions/:id
pub async fn get_session(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<Session>, AppError> {
    check_auth(&headers, &state.config.api_token)?;

    let shared = live_session(&state, id).await?;
    let session = shared.lock().await;
    Ok(Json(session.clone()))
}

// DELETE /api/sessions/:id
pub async fn end_session(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    check_auth(&headers, &state.config.api_token)?;

    let shared = state
        .sessions
        .remove(id)
        .ok_or_else(|| AppError::NotFound(format!("session {id}")))?;
    let session = shared.lock().await;
    tracing::info!(
        session_id = %id,
        stage = session.stage.as_str(),
        "conversation ended by caller"
    );
    Ok(StatusCode::NO_CONTENT)
}

async fn live_session(state: &AppState, id: Uuid) -> Result<SharedSession, AppError> {
    state
        .sessions
        .get(id, state.orchestrator.now())
        .await
        .ok_or_else(|| AppError::NotFound(format!("session {id}")))
}
