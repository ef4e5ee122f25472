use anyhow::{Result, anyhow};
use rusqlite::{Connection, OptionalExtension};

use crate::Database;
use crate::models::{ConversationRow, MessageRow, NotificationRow, UserRow};

impl Database {
    // -- Users --

    pub fn create_user(
        &self,
        id: &str,
        username: &str,
        display_name: Option<&str>,
        avatar_url: Option<&str>,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, display_name, avatar_url) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![id, username, display_name, avatar_url],
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, username, display_name, avatar_url, created_at
                     FROM users WHERE username = ?1",
                    [username],
                    map_user_row,
                )
                .optional()?;
            Ok(row)
        })
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, username, display_name, avatar_url, created_at
                     FROM users WHERE id = ?1",
                    [id],
                    map_user_row,
                )
                .optional()?;
            Ok(row)
        })
    }

    /// Batch-fetch profiles for a set of user ids.
    pub fn get_users_by_ids(&self, ids: &[String]) -> Result<Vec<UserRow>> {
        if ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let sql = format!(
                "SELECT id, username, display_name, avatar_url, created_at
                 FROM users WHERE id IN ({})",
                placeholders(ids.len())
            );

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params_from_iter(ids), map_user_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    // -- Conversations --

    /// Atomic find-or-create for a sorted participant pair. `candidate_id`
    /// and `now` are only used when no row exists yet. Returns the row and
    /// whether it was freshly inserted.
    ///
    /// The lookup and insert share one transaction, and the schema holds a
    /// UNIQUE(participant_a, participant_b) constraint, so two concurrent
    /// first contacts cannot produce duplicate conversations.
    pub fn get_or_create_conversation(
        &self,
        candidate_id: &str,
        participant_a: &str,
        participant_b: &str,
        now: &str,
    ) -> Result<(ConversationRow, bool)> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            if let Some(row) = query_conversation_by_pair(&tx, participant_a, participant_b)? {
                tx.commit()?;
                return Ok((row, false));
            }

            tx.execute(
                "INSERT INTO conversations
                     (id, participant_a, participant_b, created_at, updated_at, last_message_at)
                 VALUES (?1, ?2, ?3, ?4, ?4, ?4)",
                rusqlite::params![candidate_id, participant_a, participant_b, now],
            )?;

            let row = query_conversation_by_pair(&tx, participant_a, participant_b)?
                .ok_or_else(|| anyhow!("conversation vanished after insert"))?;
            tx.commit()?;

            Ok((row, true))
        })
    }

    pub fn get_conversation_by_id(&self, id: &str) -> Result<Option<ConversationRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, participant_a, participant_b, created_at, updated_at, last_message_at
                     FROM conversations WHERE id = ?1",
                    [id],
                    map_conversation_row,
                )
                .optional()?;
            Ok(row)
        })
    }

    /// All conversations a user participates in, most recent first.
    pub fn list_conversations_for(&self, user_id: &str) -> Result<Vec<ConversationRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, participant_a, participant_b, created_at, updated_at, last_message_at
                 FROM conversations
                 WHERE participant_a = ?1 OR participant_b = ?1
                 ORDER BY last_message_at DESC",
            )?;

            let rows = stmt
                .query_map([user_id], map_conversation_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    /// Returns false if no such conversation existed. Messages go with it
    /// via ON DELETE CASCADE.
    pub fn delete_conversation(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let affected = conn.execute("DELETE FROM conversations WHERE id = ?1", [id])?;
            Ok(affected > 0)
        })
    }

    // -- Messages --

    /// Insert a message and advance the parent conversation's recency
    /// metadata in the same transaction, so a persisted message can never be
    /// left pointing at a stale conversation.
    #[allow(clippy::too_many_arguments)]
    pub fn insert_message(
        &self,
        id: &str,
        conversation_id: &str,
        sender_id: &str,
        content: Option<&str>,
        media_url: Option<&str>,
        media_type: Option<&str>,
        media_metadata: Option<&str>,
        now: &str,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            tx.execute(
                "INSERT INTO messages
                     (id, conversation_id, sender_id, content, media_url, media_type, media_metadata, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![
                    id,
                    conversation_id,
                    sender_id,
                    content,
                    media_url,
                    media_type,
                    media_metadata,
                    now
                ],
            )?;

            tx.execute(
                "UPDATE conversations SET updated_at = ?1, last_message_at = ?1 WHERE id = ?2",
                rusqlite::params![now, conversation_id],
            )?;

            tx.commit()?;
            Ok(())
        })
    }

    /// Batch-fetch messages across a set of conversations, newest first.
    pub fn get_messages_for_conversations(
        &self,
        conversation_ids: &[String],
    ) -> Result<Vec<MessageRow>> {
        if conversation_ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let sql = format!(
                "SELECT id, conversation_id, sender_id, content, media_url, media_type,
                        media_metadata, created_at, read_at
                 FROM messages
                 WHERE conversation_id IN ({})
                 ORDER BY created_at DESC",
                placeholders(conversation_ids.len())
            );

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params_from_iter(conversation_ids), map_message_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    /// Ids of messages in a conversation the reader has not seen yet.
    pub fn unread_message_ids(&self, conversation_id: &str, reader_id: &str) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id FROM messages
                 WHERE conversation_id = ?1 AND sender_id != ?2 AND read_at IS NULL",
            )?;

            let ids = stmt
                .query_map([conversation_id, reader_id], |row| row.get(0))?
                .collect::<std::result::Result<Vec<String>, _>>()?;

            Ok(ids)
        })
    }

    /// Batch read-state transition for exactly the given message ids.
    pub fn mark_messages_read(&self, message_ids: &[String], read_at: &str) -> Result<usize> {
        if message_ids.is_empty() {
            return Ok(0);
        }

        self.with_conn(|conn| {
            let sql = format!(
                "UPDATE messages SET read_at = ?1 WHERE read_at IS NULL AND id IN ({})",
                placeholders_from(2, message_ids.len())
            );

            let mut params: Vec<&dyn rusqlite::types::ToSql> = vec![&read_at];
            params.extend(message_ids.iter().map(|id| id as &dyn rusqlite::types::ToSql));

            let affected = conn.execute(&sql, params.as_slice())?;
            Ok(affected)
        })
    }

    // -- Notification queue --

    pub fn insert_notification(
        &self,
        id: &str,
        notification_type: &str,
        recipient_id: &str,
        related_item_id: &str,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO notification_queue (id, notification_type, recipient_id, related_item_id)
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![id, notification_type, recipient_id, related_item_id],
            )?;
            Ok(())
        })
    }

    /// Prune pending (not yet sent) notifications for a recipient that
    /// reference any of the given message ids. Returns how many were removed.
    pub fn delete_unsent_notifications(
        &self,
        recipient_id: &str,
        related_item_ids: &[String],
    ) -> Result<usize> {
        if related_item_ids.is_empty() {
            return Ok(0);
        }

        self.with_conn(|conn| {
            let sql = format!(
                "DELETE FROM notification_queue
                 WHERE recipient_id = ?1 AND is_sent = 0 AND related_item_id IN ({})",
                placeholders_from(2, related_item_ids.len())
            );

            let mut params: Vec<&dyn rusqlite::types::ToSql> = vec![&recipient_id];
            params.extend(
                related_item_ids
                    .iter()
                    .map(|id| id as &dyn rusqlite::types::ToSql),
            );

            let affected = conn.execute(&sql, params.as_slice())?;
            Ok(affected)
        })
    }

    pub fn list_notifications_for(&self, recipient_id: &str) -> Result<Vec<NotificationRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, notification_type, recipient_id, related_item_id, is_sent
                 FROM notification_queue WHERE recipient_id = ?1",
            )?;

            let rows = stmt
                .query_map([recipient_id], |row| {
                    Ok(NotificationRow {
                        id: row.get(0)?,
                        notification_type: row.get(1)?,
                        recipient_id: row.get(2)?,
                        related_item_id: row.get(3)?,
                        is_sent: row.get(4)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }
}

fn placeholders(n: usize) -> String {
    placeholders_from(1, n)
}

/// "?start, ?start+1, ..." for IN clauses that follow earlier parameters.
fn placeholders_from(start: usize, n: usize) -> String {
    (start..start + n)
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ")
}

fn map_user_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        display_name: row.get(2)?,
        avatar_url: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn map_conversation_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ConversationRow> {
    Ok(ConversationRow {
        id: row.get(0)?,
        participant_a: row.get(1)?,
        participant_b: row.get(2)?,
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
        last_message_at: row.get(5)?,
    })
}

fn map_message_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        sender_id: row.get(2)?,
        content: row.get(3)?,
        media_url: row.get(4)?,
        media_type: row.get(5)?,
        media_metadata: row.get(6)?,
        created_at: row.get(7)?,
        read_at: row.get(8)?,
    })
}

fn query_conversation_by_pair(
    conn: &Connection,
    participant_a: &str,
    participant_b: &str,
) -> Result<Option<ConversationRow>> {
    let row = conn
        .query_row(
            "SELECT id, participant_a, participant_b, created_at, updated_at, last_message_at
             FROM conversations WHERE participant_a = ?1 AND participant_b = ?2",
            [participant_a, participant_b],
            map_conversation_row,
        )
        .optional()?;

    Ok(row)
}
