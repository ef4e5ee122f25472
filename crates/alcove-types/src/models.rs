use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The two identities bound to a conversation, held in sorted order so that
/// `(a, b)` and `(b, a)` compare and store identically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "(Uuid, Uuid)", into = "(Uuid, Uuid)")]
pub struct ParticipantPair {
    low: Uuid,
    high: Uuid,
}

impl ParticipantPair {
    /// Normalizes the pair; argument order never matters.
    pub fn new(a: Uuid, b: Uuid) -> Self {
        if a <= b {
            Self { low: a, high: b }
        } else {
            Self { low: b, high: a }
        }
    }

    pub fn low(&self) -> Uuid {
        self.low
    }

    pub fn high(&self) -> Uuid {
        self.high
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.low == id || self.high == id
    }

    /// The peer of `id`, or `None` if `id` is not in the pair.
    pub fn other(&self, id: Uuid) -> Option<Uuid> {
        if id == self.low {
            Some(self.high)
        } else if id == self.high {
            Some(self.low)
        } else {
            None
        }
    }
}

impl From<(Uuid, Uuid)> for ParticipantPair {
    fn from((a, b): (Uuid, Uuid)) -> Self {
        Self::new(a, b)
    }
}

impl From<ParticipantPair> for (Uuid, Uuid) {
    fn from(pair: ParticipantPair) -> Self {
        (pair.low, pair.high)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub participants: ParticipantPair,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_message_at: DateTime<Utc>,
}

/// Immutable after creation except for the one-way `read_at` transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub content: Option<String>,
    pub media: Option<MediaAttachment>,
    pub created_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
}

impl Message {
    pub fn is_unread(&self) -> bool {
        self.read_at.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaAttachment {
    pub url: String,
    pub kind: String,
    pub metadata: Option<serde_json::Value>,
}

/// A pending alert row in the notification queue. Created alongside a
/// message; removed once the message is read before delivery, or implicitly
/// once delivered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub kind: String,
    pub recipient_id: Uuid,
    pub related_item_id: Uuid,
    pub is_sent: bool,
}

/// Display profile attached to messages and conversation views.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    pub username: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
}
