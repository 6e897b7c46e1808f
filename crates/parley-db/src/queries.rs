use std::collections::BTreeMap;

use chrono::{SecondsFormat, Utc};
use rusqlite::{Connection, TransactionBehavior};
use uuid::Uuid;

use crate::Database;
use crate::error::{Result, StoreError};
use crate::models::{MessageRow, ReactionRow, ReceiptRow, RoomActivityRow, UserRow};

impl Database {
    // -- Users --

    pub fn create_user(&self, id: &str, username: &str, password_hash: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, password) VALUES (?1, ?2, ?3)",
                (id, username, password_hash),
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare("SELECT id, username, password, created_at FROM users WHERE username = ?1")?;

            stmt.query_row([username], |row| {
                Ok(UserRow {
                    id: row.get(0)?,
                    username: row.get(1)?,
                    password: row.get(2)?,
                    created_at: row.get(3)?,
                })
            })
            .optional()
        })
    }

    // -- Messages --

    /// Insert a new message. The timestamp is the server clock, assigned
    /// here — never client-supplied.
    pub fn create_message(
        &self,
        sender: &str,
        room: &str,
        content: &str,
        avatar_url: Option<&str>,
    ) -> Result<MessageRow> {
        if sender.is_empty() {
            return Err(StoreError::Validation("sender must not be empty".into()));
        }
        if room.is_empty() {
            return Err(StoreError::Validation("room must not be empty".into()));
        }

        let id = Uuid::new_v4().to_string();
        let created_at = now_rfc3339();

        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO messages (id, sender, avatar_url, room, content, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![id, sender, avatar_url, room, content, created_at],
            )?;
            Ok(())
        })?;

        Ok(MessageRow {
            id,
            sender: sender.to_string(),
            avatar_url: avatar_url.map(str::to_string),
            room: room.to_string(),
            content: content.to_string(),
            delivered: false,
            failed: false,
            created_at,
        })
    }

    pub fn get_message(&self, id: &str) -> Result<MessageRow> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, sender, avatar_url, room, content, delivered, failed, created_at
                 FROM messages WHERE id = ?1",
            )?;

            stmt.query_row([id], map_message_row)
                .optional()?
                .ok_or(StoreError::NotFound)
        })
    }

    /// Room history, oldest first. `after` is an optional `created_at`
    /// cursor: pass the timestamp of the newest message from the previous
    /// page to fetch what followed it. Restartable — each call re-runs the
    /// query against current state.
    pub fn list_room_messages(
        &self,
        room: &str,
        limit: u32,
        after: Option<&str>,
    ) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, sender, avatar_url, room, content, delivered, failed, created_at
                 FROM messages
                 WHERE room = ?1 AND (?2 IS NULL OR created_at > ?2)
                 ORDER BY created_at ASC, id ASC
                 LIMIT ?3",
            )?;

            let rows = stmt
                .query_map(rusqlite::params![room, after, limit], map_message_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    /// Delivery flags are owned by the external delivery subsystem; this
    /// setter is the only way they change.
    pub fn set_delivery_state(&self, message_id: &str, delivered: bool, failed: bool) -> Result<()> {
        self.with_conn_mut(|conn| {
            let affected = conn.execute(
                "UPDATE messages SET delivered = ?2, failed = ?3 WHERE id = ?1",
                rusqlite::params![message_id, delivered, failed],
            )?;

            if affected == 0 {
                return Err(StoreError::NotFound);
            }
            Ok(())
        })
    }

    // -- Reactions --

    /// Toggle a user's emoji reaction on a message and return the full
    /// post-toggle mapping for that message. The check-then-mutate pair
    /// runs in one IMMEDIATE transaction, and each reaction is its own row,
    /// so concurrent togglers on the same message cannot overwrite each
    /// other.
    pub fn toggle_reaction(
        &self,
        message_id: &str,
        username: &str,
        emoji: &str,
    ) -> Result<BTreeMap<String, Vec<String>>> {
        self.retrying(|db| {
            db.with_conn_mut(|conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

                let message_exists: Option<String> = tx
                    .query_row("SELECT id FROM messages WHERE id = ?1", [message_id], |row| {
                        row.get(0)
                    })
                    .optional()?;
                if message_exists.is_none() {
                    return Err(StoreError::NotFound);
                }

                let existing: Option<String> = tx
                    .query_row(
                        "SELECT id FROM reactions
                         WHERE message_id = ?1 AND username = ?2 AND emoji = ?3",
                        rusqlite::params![message_id, username, emoji],
                        |row| row.get(0),
                    )
                    .optional()?;

                match existing {
                    Some(reaction_id) => {
                        // Un-react. The row disappears, so an emoji whose
                        // last reaction was removed has no key at all.
                        tx.execute("DELETE FROM reactions WHERE id = ?1", [&reaction_id])?;
                    }
                    None => {
                        tx.execute(
                            "INSERT INTO reactions (id, message_id, username, emoji, created_at)
                             VALUES (?1, ?2, ?3, ?4, ?5)",
                            rusqlite::params![
                                Uuid::new_v4().to_string(),
                                message_id,
                                username,
                                emoji,
                                now_rfc3339(),
                            ],
                        )?;
                    }
                }

                let map = reactions_map(&tx, message_id)?;
                tx.commit()?;
                Ok(map)
            })
        })
    }

    /// Batch-fetch reactions for a set of message IDs.
    pub fn reactions_for_messages(&self, message_ids: &[String]) -> Result<Vec<ReactionRow>> {
        if message_ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let placeholders: Vec<String> =
                (1..=message_ids.len()).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "SELECT message_id, username, emoji FROM reactions
                 WHERE message_id IN ({}) ORDER BY created_at ASC, id ASC",
                placeholders.join(", ")
            );

            let mut stmt = conn.prepare(&sql)?;
            let params: Vec<&dyn rusqlite::types::ToSql> = message_ids
                .iter()
                .map(|id| id as &dyn rusqlite::types::ToSql)
                .collect();

            let rows = stmt
                .query_map(params.as_slice(), |row| {
                    Ok(ReactionRow {
                        message_id: row.get(0)?,
                        username: row.get(1)?,
                        emoji: row.get(2)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    // -- Read receipts --

    /// Add `username` to a message's read_by set. Idempotent: marking a
    /// message already read reports success. Returns whether a new receipt
    /// was recorded.
    pub fn mark_read(&self, message_id: &str, username: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let message_exists: Option<String> = conn
                .query_row("SELECT id FROM messages WHERE id = ?1", [message_id], |row| {
                    row.get(0)
                })
                .optional()?;
            if message_exists.is_none() {
                return Err(StoreError::NotFound);
            }

            let affected = conn.execute(
                "INSERT OR IGNORE INTO read_receipts (message_id, username, read_at)
                 VALUES (?1, ?2, ?3)",
                rusqlite::params![message_id, username, now_rfc3339()],
            )?;

            Ok(affected > 0)
        })
    }

    /// Bulk sweep: mark every message authored by `sender` as read by
    /// `reader`. One insert-select, atomic per row and idempotent, so a
    /// failed sweep can simply be retried. Returns the number of messages
    /// newly marked.
    pub fn mark_conversation_read(&self, sender: &str, reader: &str) -> Result<usize> {
        self.retrying(|db| {
            db.with_conn_mut(|conn| {
                let affected = conn.execute(
                    "INSERT OR IGNORE INTO read_receipts (message_id, username, read_at)
                     SELECT m.id, ?2, ?3 FROM messages m WHERE m.sender = ?1",
                    rusqlite::params![sender, reader, now_rfc3339()],
                )?;
                Ok(affected)
            })
        })
    }

    /// Batch-fetch read receipts for a set of message IDs.
    pub fn read_by_for_messages(&self, message_ids: &[String]) -> Result<Vec<ReceiptRow>> {
        if message_ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let placeholders: Vec<String> =
                (1..=message_ids.len()).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "SELECT message_id, username FROM read_receipts
                 WHERE message_id IN ({}) ORDER BY read_at ASC",
                placeholders.join(", ")
            );

            let mut stmt = conn.prepare(&sql)?;
            let params: Vec<&dyn rusqlite::types::ToSql> = message_ids
                .iter()
                .map(|id| id as &dyn rusqlite::types::ToSql)
                .collect();

            let rows = stmt
                .query_map(params.as_slice(), |row| {
                    Ok(ReceiptRow {
                        message_id: row.get(0)?,
                        username: row.get(1)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    // -- Presence --

    /// Most recent activity per sender in a room, newest first. The bare
    /// avatar_url column is taken from the row that supplied MAX(created_at)
    /// (SQLite guarantees this for a single min/max aggregate).
    pub fn room_activity(&self, room: &str) -> Result<Vec<RoomActivityRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT sender, avatar_url, MAX(created_at) AS last_seen
                 FROM messages WHERE room = ?1
                 GROUP BY sender
                 ORDER BY last_seen DESC",
            )?;

            let rows = stmt
                .query_map([room], |row| {
                    Ok(RoomActivityRow {
                        username: row.get(0)?,
                        avatar_url: row.get(1)?,
                        last_seen: row.get(2)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }
}

/// Current server time, fixed-width RFC 3339 so TEXT comparison (ORDER BY,
/// MAX, cursor) is chronological.
fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn map_message_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        sender: row.get(1)?,
        avatar_url: row.get(2)?,
        room: row.get(3)?,
        content: row.get(4)?,
        delivered: row.get(5)?,
        failed: row.get(6)?,
        created_at: row.get(7)?,
    })
}

/// Group a message's reactions into the canonical emoji -> usernames
/// mapping. Keys exist only for emojis with at least one reactor; users are
/// in reaction order.
fn reactions_map(conn: &Connection, message_id: &str) -> Result<BTreeMap<String, Vec<String>>> {
    let mut stmt = conn.prepare(
        "SELECT emoji, username FROM reactions
         WHERE message_id = ?1 ORDER BY created_at ASC, id ASC",
    )?;

    let mut map: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let rows = stmt.query_map([message_id], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;
    for row in rows {
        let (emoji, username) = row?;
        map.entry(emoji).or_default().push(username);
    }

    Ok(map)
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
