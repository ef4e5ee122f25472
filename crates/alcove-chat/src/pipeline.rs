use chrono::Utc;
use tokio::task;
use tracing::warn;
use uuid::Uuid;

use alcove_types::events::StoreEvent;
use alcove_types::models::{MediaAttachment, Message, Profile};

use crate::ChatService;
use crate::convert;
use crate::error::ChatError;

/// A freshly persisted message with the sender's profile attached, so the
/// caller can render it without a second round trip.
#[derive(Debug, Clone)]
pub struct SentMessage {
    pub message: Message,
    pub sender: Profile,
}

impl ChatService {
    /// Persist a message and advance the parent conversation's recency
    /// metadata (one transaction), publish the insert to the change feed,
    /// then fire the notification side effect.
    ///
    /// The enqueue is isolated: its failure is logged and never fails the
    /// send, and nothing is rolled back.
    pub async fn send_message(
        &self,
        conversation_id: Uuid,
        sender_id: Uuid,
        content: Option<String>,
        media: Option<MediaAttachment>,
    ) -> Result<SentMessage, ChatError> {
        let db = self.db.clone();
        let id = conversation_id.to_string();
        let row = task::spawn_blocking(move || db.get_conversation_by_id(&id))
            .await
            .map_err(ChatError::from_join)??
            .ok_or_else(|| ChatError::NotFound(format!("conversation {conversation_id}")))?;
        let conversation = convert::conversation_from_row(&row);

        let message = Message {
            id: Uuid::new_v4(),
            conversation_id,
            sender_id,
            content,
            media,
            created_at: Utc::now(),
            read_at: None,
        };

        let db = self.db.clone();
        let insert = message.clone();
        task::spawn_blocking(move || {
            let metadata = insert
                .media
                .as_ref()
                .and_then(|m| m.metadata.as_ref())
                .map(|v| v.to_string());
            db.insert_message(
                &insert.id.to_string(),
                &insert.conversation_id.to_string(),
                &insert.sender_id.to_string(),
                insert.content.as_deref(),
                insert.media.as_ref().map(|m| m.url.as_str()),
                insert.media.as_ref().map(|m| m.kind.as_str()),
                metadata.as_deref(),
                &convert::store_timestamp(insert.created_at),
            )
        })
        .await
        .map_err(ChatError::from_join)??;

        self.feed.publish(StoreEvent::MessageCreate {
            id: message.id,
            conversation_id,
            sender_id,
            created_at: message.created_at,
        });

        // Attached for immediate display. The message row already stands if
        // this lookup fails; the next full fetch repairs the view.
        let sender = self
            .profile(sender_id)
            .await?
            .ok_or_else(|| ChatError::NotFound(format!("profile {sender_id}")))?;

        match conversation.participants.other(sender_id) {
            Some(recipient) => {
                if let Err(err) = self
                    .notifications
                    .queue_notification(recipient, sender_id, message.content.as_deref(), message.id)
                    .await
                {
                    warn!(
                        "notification enqueue failed for message {}: {}",
                        message.id, err
                    );
                }
            }
            None => warn!(
                "sender {} is not a participant in conversation {}, skipping notification",
                sender_id, conversation_id
            ),
        }

        Ok(SentMessage { message, sender })
    }
}
