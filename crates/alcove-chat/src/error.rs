use thiserror::Error;
use uuid::Uuid;

/// The one error sum type every service operation returns.
#[derive(Debug, Error)]
pub enum ChatError {
    /// Query/insert/update failure at the storage boundary.
    #[error(transparent)]
    Storage(#[from] anyhow::Error),

    #[error("{0} not found")]
    NotFound(String),

    #[error("user {user} is not a participant in conversation {conversation}")]
    Authorization { user: Uuid, conversation: Uuid },

    /// Isolated by callers: logged, never propagated out of send/mark-read.
    #[error("notification enqueue failed: {0}")]
    Notification(String),
}

impl ChatError {
    pub(crate) fn from_join(err: tokio::task::JoinError) -> Self {
        Self::Storage(anyhow::anyhow!("blocking task failed: {err}"))
    }
}
