use chrono::Utc;
use tokio::task;
use tracing::warn;
use uuid::Uuid;

use crate::ChatService;
use crate::convert;
use crate::error::ChatError;

/// What a mark-read pass actually did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadOutcome {
    pub messages_marked: usize,
    pub notifications_pruned: usize,
}

impl ChatService {
    /// Mark every message the reader has not seen in a conversation as read,
    /// then prune pending notifications the read made irrelevant. A no-op
    /// when nothing is unread. Pruning failure downgrades to a warning, not
    /// an error.
    pub async fn mark_read(
        &self,
        conversation_id: Uuid,
        reader_id: Uuid,
    ) -> Result<ReadOutcome, ChatError> {
        let db = self.db.clone();
        let conv = conversation_id.to_string();
        let reader = reader_id.to_string();
        let unread = task::spawn_blocking(move || db.unread_message_ids(&conv, &reader))
            .await
            .map_err(ChatError::from_join)??;

        if unread.is_empty() {
            return Ok(ReadOutcome::default());
        }

        let db = self.db.clone();
        let ids = unread.clone();
        let stamp = convert::store_timestamp(Utc::now());
        let marked = task::spawn_blocking(move || db.mark_messages_read(&ids, &stamp))
            .await
            .map_err(ChatError::from_join)??;

        let db = self.db.clone();
        let reader = reader_id.to_string();
        let pruned = match task::spawn_blocking(move || db.delete_unsent_notifications(&reader, &unread))
            .await
            .map_err(ChatError::from_join)
            .and_then(|r| r.map_err(ChatError::from))
        {
            Ok(n) => n,
            Err(err) => {
                warn!(
                    "notification pruning failed for conversation {}: {}",
                    conversation_id, err
                );
                0
            }
        };

        Ok(ReadOutcome {
            messages_marked: marked,
            notifications_pruned: pruned,
        })
    }
}
