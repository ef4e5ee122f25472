//! Batched reads backing the client synchronization layer.

use std::collections::HashSet;

use tokio::task;
use uuid::Uuid;

use alcove_types::models::{Conversation, Message, Notification, Profile};

use crate::ChatService;
use crate::convert;
use crate::error::ChatError;

impl ChatService {
    pub async fn profile(&self, user_id: Uuid) -> Result<Option<Profile>, ChatError> {
        let db = self.db.clone();
        let id = user_id.to_string();
        let row = task::spawn_blocking(move || db.get_user_by_id(&id))
            .await
            .map_err(ChatError::from_join)??;
        Ok(row.as_ref().map(convert::profile_from_row))
    }

    /// All conversations the user participates in, most recent first.
    pub async fn conversations_for(&self, user_id: Uuid) -> Result<Vec<Conversation>, ChatError> {
        let db = self.db.clone();
        let id = user_id.to_string();
        let rows = task::spawn_blocking(move || db.list_conversations_for(&id))
            .await
            .map_err(ChatError::from_join)??;
        Ok(rows.iter().map(convert::conversation_from_row).collect())
    }

    /// One batched profile read for a set of user ids (deduplicated).
    pub async fn profiles_by_ids(&self, ids: Vec<Uuid>) -> Result<Vec<Profile>, ChatError> {
        let unique: HashSet<Uuid> = ids.into_iter().collect();
        let keys: Vec<String> = unique.iter().map(|id| id.to_string()).collect();

        let db = self.db.clone();
        let rows = task::spawn_blocking(move || db.get_users_by_ids(&keys))
            .await
            .map_err(ChatError::from_join)??;
        Ok(rows.iter().map(convert::profile_from_row).collect())
    }

    /// Alerts queued for a recipient, delivered and pending alike.
    pub async fn notifications_for(&self, recipient_id: Uuid) -> Result<Vec<Notification>, ChatError> {
        let db = self.db.clone();
        let id = recipient_id.to_string();
        let rows = task::spawn_blocking(move || db.list_notifications_for(&id))
            .await
            .map_err(ChatError::from_join)??;
        Ok(rows.iter().map(convert::notification_from_row).collect())
    }

    /// One batched message read across conversations, newest first.
    pub async fn messages_for_conversations(
        &self,
        conversation_ids: Vec<Uuid>,
    ) -> Result<Vec<Message>, ChatError> {
        let keys: Vec<String> = conversation_ids.iter().map(|id| id.to_string()).collect();

        let db = self.db.clone();
        let rows = task::spawn_blocking(move || db.get_messages_for_conversations(&keys))
            .await
            .map_err(ChatError::from_join)??;
        Ok(rows.iter().map(convert::message_from_row).collect())
    }
}
