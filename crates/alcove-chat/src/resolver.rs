use chrono::Utc;
use tokio::task;
use tracing::debug;
use uuid::Uuid;

use alcove_types::events::StoreEvent;
use alcove_types::models::{Conversation, ParticipantPair};

use crate::ChatService;
use crate::convert;
use crate::error::ChatError;

impl ChatService {
    /// Find or lazily create the single conversation for an unordered pair
    /// of participants. Resolution is atomic: the store runs the lookup and
    /// insert in one transaction against a unique sorted-pair constraint, so
    /// two racing first contacts converge on one row.
    pub async fn get_or_create_conversation(
        &self,
        a: Uuid,
        b: Uuid,
    ) -> Result<Conversation, ChatError> {
        let pair = ParticipantPair::new(a, b);
        let candidate_id = Uuid::new_v4();
        let stamp = convert::store_timestamp(Utc::now());

        let db = self.db.clone();
        let low = pair.low().to_string();
        let high = pair.high().to_string();
        let (row, created) = task::spawn_blocking(move || {
            db.get_or_create_conversation(&candidate_id.to_string(), &low, &high, &stamp)
        })
        .await
        .map_err(ChatError::from_join)??;

        let conversation = convert::conversation_from_row(&row);

        if created {
            debug!(
                "created conversation {} for ({}, {})",
                conversation.id,
                pair.low(),
                pair.high()
            );
            self.feed.publish(StoreEvent::ConversationCreate {
                id: conversation.id,
                participants: conversation.participants,
                created_at: conversation.created_at,
            });
        }

        Ok(conversation)
    }

    /// Hard-delete a conversation and, via cascade, its messages. Only a
    /// participant may do this; a rejected request removes nothing.
    pub async fn delete_conversation(
        &self,
        conversation_id: Uuid,
        requested_by: Uuid,
    ) -> Result<(), ChatError> {
        let db = self.db.clone();
        let id = conversation_id.to_string();
        let row = task::spawn_blocking(move || db.get_conversation_by_id(&id))
            .await
            .map_err(ChatError::from_join)??
            .ok_or_else(|| ChatError::NotFound(format!("conversation {conversation_id}")))?;

        let conversation = convert::conversation_from_row(&row);
        if !conversation.participants.contains(requested_by) {
            return Err(ChatError::Authorization {
                user: requested_by,
                conversation: conversation_id,
            });
        }

        let db = self.db.clone();
        let id = conversation_id.to_string();
        task::spawn_blocking(move || db.delete_conversation(&id))
            .await
            .map_err(ChatError::from_join)??;

        Ok(())
    }
}
