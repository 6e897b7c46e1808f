/// Database row types — these map directly to SQLite rows.
/// Distinct from parley-types API models to keep the DB layer independent.

pub struct UserRow {
    pub id: String,
    pub username: String,
    pub password: String,
    pub created_at: String,
}

#[derive(Debug)]
pub struct MessageRow {
    pub id: String,
    pub sender: String,
    pub avatar_url: Option<String>,
    pub room: String,
    pub content: String,
    pub delivered: bool,
    pub failed: bool,
    pub created_at: String,
}

pub struct ReactionRow {
    pub message_id: String,
    pub username: String,
    pub emoji: String,
}

pub struct ReceiptRow {
    pub message_id: String,
    pub username: String,
}

/// Per-sender activity summary for a room: the timestamp (and avatar) of
/// the sender's most recent message.
pub struct RoomActivityRow {
    pub username: String,
    pub avatar_url: Option<String>,
    pub last_seen: String,
}
