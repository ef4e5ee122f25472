use alcove_types::models::{Conversation, Message, Profile};

/// Client-cache projection of one conversation: the row itself, the resolved
/// partner profile, the newest message, and the derived unread count. Never
/// persisted; rebuilt from the store on every fetch.
#[derive(Debug, Clone)]
pub struct ConversationView {
    pub conversation: Conversation,
    pub partner: Option<Profile>,
    pub last_message: Option<Message>,
    pub unread_count: usize,
}
