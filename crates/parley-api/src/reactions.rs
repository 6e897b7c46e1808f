use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use tracing::error;
use uuid::Uuid;

use parley_types::api::{Claims, ToggleReactionRequest, ToggleReactionResponse};

use crate::auth::AppStateInner;
use crate::error::ApiError;

/// Toggle the caller's reaction: react if absent, un-react if present.
/// Responds with the full post-toggle mapping for the message.
pub async fn toggle_reaction(
    State(state): State<Arc<AppStateInner>>,
    Path(message_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<ToggleReactionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.clone();
    let username = claims.username.clone();
    let reactions = tokio::task::spawn_blocking(move || {
        db.db
            .toggle_reaction(&message_id.to_string(), &username, &req.emoji)
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        ApiError::Internal(e.to_string())
    })??;

    Ok(Json(ToggleReactionResponse {
        success: true,
        reactions,
    }))
}
