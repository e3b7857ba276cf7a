use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;

use crate::errors::AppError;
use crate::models::{ConversationState, Response};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct ChatMessage {
    pub conversation_id: String,
    pub message: String,
}

// POST /chat
pub async fn chat(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ChatMessage>,
) -> Result<Json<Response>, AppError> {
    let conversation_id = payload.conversation_id.trim();
    let message = payload.message.trim();
    if conversation_id.is_empty() {
        return Err(AppError::BadRequest("conversation_id is required".to_string()));
    }

    tracing::info!(conversation_id, message, "incoming chat message");

    let response = state.orchestrator.handle_turn(conversation_id, message).await?;
    Ok(Json(response))
}

// GET /conversations/:id
pub async fn get_conversation(
    State(state): State<Arc<AppState>>,
    Path(conversation_id): Path<String>,
) -> Result<Json<ConversationState>, AppError> {
    Ok(Json(state.conversations.get(&conversation_id)?))
}
