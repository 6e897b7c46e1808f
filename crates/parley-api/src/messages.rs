use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{error, warn};
use uuid::Uuid;

use parley_types::api::{Claims, DeliveryStateRequest, MessageResponse, SendMessageRequest};

use crate::auth::AppStateInner;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
    /// Cursor-based pagination — pass the `created_at` timestamp of the
    /// newest message from the previous page to fetch what followed it.
    pub after: Option<String>,
}

fn default_limit() -> u32 {
    50
}

/// Room authorization model — all authenticated users can access all rooms.
/// Rooms are open named channels; per-room ACLs are a future feature.
pub async fn send_message(
    State(state): State<Arc<AppStateInner>>,
    Path(room): Path<String>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    // Sender comes from caller identity, never the request body.
    let db = state.clone();
    let sender = claims.username.clone();
    let row = tokio::task::spawn_blocking(move || {
        db.db
            .create_message(&sender, &room, &req.content, req.avatar_url.as_deref())
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        ApiError::Internal(e.to_string())
    })??;

    let created_at = parse_timestamp(&row.created_at, &row.id);

    Ok((
        StatusCode::CREATED,
        Json(MessageResponse {
            id: parse_id(&row.id),
            sender: row.sender,
            avatar_url: row.avatar_url,
            room: row.room,
            content: row.content,
            created_at,
            reactions: BTreeMap::new(),
            read_by: vec![],
            delivered: false,
            failed: false,
        }),
    ))
}

pub async fn get_messages(
    State(state): State<Arc<AppStateInner>>,
    Path(room): Path<String>,
    Query(query): Query<MessageQuery>,
    Extension(_claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    // Run all blocking DB queries off the async runtime
    let db = state.clone();
    let limit = query.limit.min(200);
    let after = query.after;

    let (rows, reaction_rows, receipt_rows) = tokio::task::spawn_blocking(move || {
        let rows = db.db.list_room_messages(&room, limit, after.as_deref())?;

        let message_ids: Vec<String> = rows.iter().map(|r| r.id.clone()).collect();
        let reaction_rows = db.db.reactions_for_messages(&message_ids)?;
        let receipt_rows = db.db.read_by_for_messages(&message_ids)?;

        Ok::<_, parley_db::StoreError>((rows, reaction_rows, receipt_rows))
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        ApiError::Internal(e.to_string())
    })??;

    // Group reactions by message_id -> emoji -> usernames (cheap in-memory
    // work, fine on the async thread)
    let mut reaction_map: HashMap<String, BTreeMap<String, Vec<String>>> = HashMap::new();
    for r in reaction_rows {
        reaction_map
            .entry(r.message_id)
            .or_default()
            .entry(r.emoji)
            .or_default()
            .push(r.username);
    }

    let mut read_map: HashMap<String, Vec<String>> = HashMap::new();
    for r in receipt_rows {
        read_map.entry(r.message_id).or_default().push(r.username);
    }

    let messages: Vec<MessageResponse> = rows
        .into_iter()
        .map(|row| {
            let created_at = parse_timestamp(&row.created_at, &row.id);

            MessageResponse {
                id: parse_id(&row.id),
                sender: row.sender,
                avatar_url: row.avatar_url,
                room: row.room,
                content: row.content,
                created_at,
                reactions: reaction_map.remove(&row.id).unwrap_or_default(),
                read_by: read_map.remove(&row.id).unwrap_or_default(),
                delivered: row.delivered,
                failed: row.failed,
            }
        })
        .collect();

    Ok(Json(messages))
}

/// Setter for the external delivery subsystem. The flags are never derived
/// from any other field.
pub async fn set_delivery_state(
    State(state): State<Arc<AppStateInner>>,
    Path(message_id): Path<Uuid>,
    Extension(_claims): Extension<Claims>,
    Json(req): Json<DeliveryStateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.clone();
    tokio::task::spawn_blocking(move || {
        db.db
            .set_delivery_state(&message_id.to_string(), req.delivered, req.failed)
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        ApiError::Internal(e.to_string())
    })??;

    Ok(Json(serde_json::json!({ "success": true })))
}

fn parse_id(id: &str) -> Uuid {
    id.parse().unwrap_or_else(|e| {
        warn!("Corrupt message id '{}': {}", id, e);
        Uuid::default()
    })
}

fn parse_timestamp(created_at: &str, message_id: &str) -> DateTime<Utc> {
    created_at.parse::<DateTime<Utc>>().unwrap_or_else(|e| {
        warn!("Corrupt created_at '{}' on message '{}': {}", created_at, message_id, e);
        DateTime::default()
    })
}
