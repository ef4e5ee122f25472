//! Database row types mapping directly to SQLite rows. Timestamps stay as
//! stored text; the service layer owns parsing into typed models.

pub struct UserRow {
    pub id: String,
    pub username: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub created_at: String,
}

pub struct ConversationRow {
    pub id: String,
    pub participant_a: String,
    pub participant_b: String,
    pub created_at: String,
    pub updated_at: String,
    pub last_message_at: String,
}

pub struct MessageRow {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub content: Option<String>,
    pub media_url: Option<String>,
    pub media_type: Option<String>,
    pub media_metadata: Option<String>,
    pub created_at: String,
    pub read_at: Option<String>,
}

pub struct NotificationRow {
    pub id: String,
    pub notification_type: String,
    pub recipient_id: String,
    pub related_item_id: String,
    pub is_sent: bool,
}
