//! Row-to-model mapping. Corrupt stored values are logged and defaulted
//! rather than failing a whole fetch.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use tracing::warn;
use uuid::Uuid;

use alcove_db::models::{ConversationRow, MessageRow, NotificationRow, UserRow};
use alcove_types::models::{
    Conversation, MediaAttachment, Message, Notification, ParticipantPair, Profile,
};

/// Fixed-width UTC text so lexical ordering in SQLite matches time order.
pub(crate) fn store_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(raw: &str, field: &str, row_id: &str) -> DateTime<Utc> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| {
            // SQLite's datetime('now') default stores "YYYY-MM-DD HH:MM:SS"
            // with no timezone; treat it as UTC.
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("Corrupt {} '{}' on row '{}': {}", field, raw, row_id, e);
            DateTime::default()
        })
}

pub(crate) fn parse_id(raw: &str, field: &str, row_id: &str) -> Uuid {
    raw.parse().unwrap_or_else(|e| {
        warn!("Corrupt {} '{}' on row '{}': {}", field, raw, row_id, e);
        Uuid::default()
    })
}

pub(crate) fn conversation_from_row(row: &ConversationRow) -> Conversation {
    Conversation {
        id: parse_id(&row.id, "conversation id", &row.id),
        participants: ParticipantPair::new(
            parse_id(&row.participant_a, "participant_a", &row.id),
            parse_id(&row.participant_b, "participant_b", &row.id),
        ),
        created_at: parse_timestamp(&row.created_at, "created_at", &row.id),
        updated_at: parse_timestamp(&row.updated_at, "updated_at", &row.id),
        last_message_at: parse_timestamp(&row.last_message_at, "last_message_at", &row.id),
    }
}

pub(crate) fn message_from_row(row: &MessageRow) -> Message {
    let media = row.media_url.as_ref().map(|url| MediaAttachment {
        url: url.clone(),
        kind: row.media_type.clone().unwrap_or_default(),
        metadata: row
            .media_metadata
            .as_deref()
            .and_then(|raw| serde_json::from_str(raw).ok()),
    });

    Message {
        id: parse_id(&row.id, "message id", &row.id),
        conversation_id: parse_id(&row.conversation_id, "conversation_id", &row.id),
        sender_id: parse_id(&row.sender_id, "sender_id", &row.id),
        content: row.content.clone(),
        media,
        created_at: parse_timestamp(&row.created_at, "created_at", &row.id),
        read_at: row
            .read_at
            .as_deref()
            .map(|raw| parse_timestamp(raw, "read_at", &row.id)),
    }
}

pub(crate) fn notification_from_row(row: &NotificationRow) -> Notification {
    Notification {
        id: parse_id(&row.id, "notification id", &row.id),
        kind: row.notification_type.clone(),
        recipient_id: parse_id(&row.recipient_id, "recipient_id", &row.id),
        related_item_id: parse_id(&row.related_item_id, "related_item_id", &row.id),
        is_sent: row.is_sent,
    }
}

pub(crate) fn profile_from_row(row: &UserRow) -> Profile {
    Profile {
        id: parse_id(&row.id, "user id", &row.id),
        username: row.username.clone(),
        display_name: row.display_name.clone(),
        avatar_url: row.avatar_url.clone(),
    }
}
