use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id              TEXT PRIMARY KEY,
            username        TEXT NOT NULL UNIQUE,
            display_name    TEXT,
            avatar_url      TEXT,
            created_at      TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- Participants are stored sorted (participant_a < participant_b), so
        -- the UNIQUE constraint holds one row per unordered pair and the
        -- get-or-create upsert cannot race itself into duplicates.
        CREATE TABLE IF NOT EXISTS conversations (
            id              TEXT PRIMARY KEY,
            participant_a   TEXT NOT NULL REFERENCES users(id),
            participant_b   TEXT NOT NULL REFERENCES users(id),
            created_at      TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at      TEXT NOT NULL DEFAULT (datetime('now')),
            last_message_at TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE(participant_a, participant_b)
        );

        CREATE INDEX IF NOT EXISTS idx_conversations_participant_a
            ON conversations(participant_a, last_message_at);
        CREATE INDEX IF NOT EXISTS idx_conversations_participant_b
            ON conversations(participant_b, last_message_at);

        CREATE TABLE IF NOT EXISTS messages (
            id              TEXT PRIMARY KEY,
            conversation_id TEXT NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
            sender_id       TEXT NOT NULL REFERENCES users(id),
            content         TEXT,
            media_url       TEXT,
            media_type      TEXT,
            media_metadata  TEXT,
            created_at      TEXT NOT NULL DEFAULT (datetime('now')),
            read_at         TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_messages_conversation
            ON messages(conversation_id, created_at);
        CREATE INDEX IF NOT EXISTS idx_messages_unread
            ON messages(conversation_id, read_at);

        CREATE TABLE IF NOT EXISTS notification_queue (
            id                  TEXT PRIMARY KEY,
            notification_type   TEXT NOT NULL,
            recipient_id        TEXT NOT NULL REFERENCES users(id),
            related_item_id     TEXT NOT NULL,
            is_sent             INTEGER NOT NULL DEFAULT 0,
            created_at          TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_notification_queue_recipient
            ON notification_queue(recipient_id, is_sent);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
