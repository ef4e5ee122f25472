use async_trait::async_trait;
use uuid::Uuid;

use alcove_chat::ChatService;
use alcove_chat::error::ChatError;
use alcove_types::models::{Conversation, Message, Profile};

/// The three batched reads a full cache fetch performs. A seam rather than a
/// concrete service so tests can observe and fault the storage boundary.
#[async_trait]
pub trait SyncBackend: Send + Sync {
    async fn conversations_for(&self, user_id: Uuid) -> Result<Vec<Conversation>, ChatError>;

    async fn profiles_by_ids(&self, ids: Vec<Uuid>) -> Result<Vec<Profile>, ChatError>;

    async fn messages_for_conversations(
        &self,
        conversation_ids: Vec<Uuid>,
    ) -> Result<Vec<Message>, ChatError>;
}

#[async_trait]
impl SyncBackend for ChatService {
    async fn conversations_for(&self, user_id: Uuid) -> Result<Vec<Conversation>, ChatError> {
        ChatService::conversations_for(self, user_id).await
    }

    async fn profiles_by_ids(&self, ids: Vec<Uuid>) -> Result<Vec<Profile>, ChatError> {
        ChatService::profiles_by_ids(self, ids).await
    }

    async fn messages_for_conversations(
        &self,
        conversation_ids: Vec<Uuid>,
    ) -> Result<Vec<Message>, ChatError> {
        ChatService::messages_for_conversations(self, conversation_ids).await
    }
}
