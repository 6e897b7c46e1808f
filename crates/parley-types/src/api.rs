use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// -- JWT Claims --

/// JWT claims shared between the REST middleware and the auth handlers.
/// Canonical definition lives here in parley-types to eliminate duplication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user_id: Uuid,
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user_id: Uuid,
    pub username: String,
    pub token: String,
}

// -- Messages --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    pub content: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

/// Full message view. `reactions` is the canonical emoji -> usernames
/// mapping: an emoji key is never present with an empty user list.
#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub id: Uuid,
    pub sender: String,
    pub avatar_url: Option<String>,
    pub room: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub reactions: BTreeMap<String, Vec<String>>,
    pub read_by: Vec<String>,
    pub delivered: bool,
    pub failed: bool,
}

// -- Reactions --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToggleReactionRequest {
    pub emoji: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ToggleReactionResponse {
    pub success: bool,
    pub reactions: BTreeMap<String, Vec<String>>,
}

// -- Read receipts --

#[derive(Debug, Serialize, Deserialize)]
pub struct MarkReadResponse {
    pub success: bool,
    pub message_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConversationReadResponse {
    pub status: String,
    /// Number of messages newly marked read by this sweep.
    pub updated: usize,
}

// -- Delivery state --

/// Setter payload for the external delivery subsystem. The core never
/// derives these flags from anything else.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeliveryStateRequest {
    pub delivered: bool,
    pub failed: bool,
}
