use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use tracing::{error, warn};

use parley_types::api::Claims;
use parley_types::models::{PresenceStatus, RoomUser, presence_status};

use crate::auth::AppStateInner;
use crate::error::ApiError;

/// Room participants ordered by most recent activity. Presence is derived
/// on every query from message recency — nothing is cached or pushed.
pub async fn room_users(
    State(state): State<Arc<AppStateInner>>,
    Path(room): Path<String>,
    Extension(_claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.clone();
    let rows = tokio::task::spawn_blocking(move || db.db.room_activity(&room))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal(e.to_string())
        })??;

    let now = Utc::now();
    let users: Vec<RoomUser> = rows
        .into_iter()
        .map(|row| match row.last_seen.parse::<DateTime<Utc>>() {
            Ok(last_seen) => RoomUser {
                username: row.username,
                avatar: row.avatar_url,
                last_seen: Some(last_seen),
                status: presence_status(last_seen, now, state.presence_window),
            },
            Err(e) => {
                warn!("Corrupt last_seen '{}' for user '{}': {}", row.last_seen, row.username, e);
                RoomUser {
                    username: row.username,
                    avatar: row.avatar_url,
                    last_seen: None,
                    status: PresenceStatus::Offline,
                }
            }
        })
        .collect();

    Ok(Json(users))
}
