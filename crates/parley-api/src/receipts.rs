use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use tracing::error;
use uuid::Uuid;

use parley_types::api::{Claims, ConversationReadResponse, MarkReadResponse};

use crate::auth::AppStateInner;
use crate::error::ApiError;

/// Record that the caller has read a message. Idempotent: re-marking an
/// already-read message still reports success.
pub async fn mark_read(
    State(state): State<Arc<AppStateInner>>,
    Path(message_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.clone();
    let username = claims.username.clone();
    tokio::task::spawn_blocking(move || db.db.mark_read(&message_id.to_string(), &username))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal(e.to_string())
        })??;

    Ok(Json(MarkReadResponse {
        success: true,
        message_id,
    }))
}

/// Bulk sweep: mark everything `chat_user` has sent as read by the caller.
/// Safe to retry — already-read messages are skipped.
pub async fn mark_conversation_read(
    State(state): State<Arc<AppStateInner>>,
    Path(chat_user): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.clone();
    let reader = claims.username.clone();
    let updated =
        tokio::task::spawn_blocking(move || db.db.mark_conversation_read(&chat_user, &reader))
            .await
            .map_err(|e| {
                error!("spawn_blocking join error: {}", e);
                ApiError::Internal(e.to_string())
            })??;

    Ok(Json(ConversationReadResponse {
        status: "success".to_string(),
        updated,
    }))
}
