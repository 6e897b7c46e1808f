use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    Online,
    Offline,
}

/// One participant in a room's activity summary, ordered by recency.
/// `last_seen` is the timestamp of the user's most recent message in the
/// room; `avatar` rides along from that same message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomUser {
    pub username: String,
    pub avatar: Option<String>,
    #[serde(rename = "lastSeen")]
    pub last_seen: Option<DateTime<Utc>>,
    pub status: PresenceStatus,
}

/// Presence is never stored: it is a pure function of the last activity
/// timestamp, the current time, and the configured liveness window.
/// Activity exactly `window` old still counts as online.
pub fn presence_status(last_seen: DateTime<Utc>, now: DateTime<Utc>, window: Duration) -> PresenceStatus {
    if now.signed_duration_since(last_seen) <= window {
        PresenceStatus::Online
    } else {
        PresenceStatus::Offline
    }
}
