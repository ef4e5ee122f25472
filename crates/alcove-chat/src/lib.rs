pub mod error;
pub mod feed;
pub mod notify;
pub mod pipeline;
pub mod read_state;
pub mod resolver;

mod convert;
mod fetch;

use std::sync::Arc;

use alcove_db::Database;

use crate::feed::ChangeFeed;
use crate::notify::NotificationQueue;

pub use crate::error::ChatError;

/// Orchestrates the conversation store, the change feed, and the
/// notification side channel. Cheap to clone; the operations live in
/// `resolver`, `pipeline`, and `read_state`.
#[derive(Clone)]
pub struct ChatService {
    db: Arc<Database>,
    feed: ChangeFeed,
    notifications: Arc<dyn NotificationQueue>,
}

impl ChatService {
    pub fn new(
        db: Arc<Database>,
        feed: ChangeFeed,
        notifications: Arc<dyn NotificationQueue>,
    ) -> Self {
        Self {
            db,
            feed,
            notifications,
        }
    }

    pub fn feed(&self) -> &ChangeFeed {
        &self.feed
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }
}
