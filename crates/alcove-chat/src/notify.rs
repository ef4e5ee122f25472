use std::sync::Arc;

use async_trait::async_trait;
use tokio::task;
use uuid::Uuid;

use alcove_db::Database;

use crate::error::ChatError;

pub const DIRECT_MESSAGE_KIND: &str = "direct_message";

/// Downstream delivery seam for pending message alerts. Implementations
/// surface failures as `Err`; isolation is the caller's job, not the
/// queue's.
#[async_trait]
pub trait NotificationQueue: Send + Sync {
    async fn queue_notification(
        &self,
        recipient_id: Uuid,
        sender_id: Uuid,
        content: Option<&str>,
        message_id: Uuid,
    ) -> Result<(), ChatError>;
}

/// Queue backed by the store's notification_queue table. A delivery worker
/// drains it and flips `is_sent`; that worker lives outside this crate.
pub struct TableNotificationQueue {
    db: Arc<Database>,
}

impl TableNotificationQueue {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl NotificationQueue for TableNotificationQueue {
    async fn queue_notification(
        &self,
        recipient_id: Uuid,
        _sender_id: Uuid,
        _content: Option<&str>,
        message_id: Uuid,
    ) -> Result<(), ChatError> {
        let db = self.db.clone();
        let id = Uuid::new_v4().to_string();
        let recipient = recipient_id.to_string();
        let related = message_id.to_string();

        task::spawn_blocking(move || {
            db.insert_notification(&id, DIRECT_MESSAGE_KIND, &recipient, &related)
        })
        .await
        .map_err(ChatError::from_join)?
        .map_err(|e| ChatError::Notification(e.to_string()))
    }
}
