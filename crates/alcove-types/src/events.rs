use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::ParticipantPair;

/// Row-level insert events delivered over the store's change feed.
/// Best-effort, at-least-once; consumers re-derive state with a fetch rather
/// than applying these as deltas.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum StoreEvent {
    /// A new conversation row was inserted
    ConversationCreate {
        id: Uuid,
        participants: ParticipantPair,
        created_at: DateTime<Utc>,
    },

    /// A new message row was inserted
    MessageCreate {
        id: Uuid,
        conversation_id: Uuid,
        sender_id: Uuid,
        created_at: DateTime<Utc>,
    },
}

impl StoreEvent {
    /// The conversation this event is scoped to.
    pub fn conversation_id(&self) -> Uuid {
        match self {
            Self::ConversationCreate { id, .. } => *id,
            Self::MessageCreate {
                conversation_id, ..
            } => *conversation_id,
        }
    }
}
