//! Local smoke tool: seeds two identities, exchanges a few messages, and
//! prints the synchronized inbox for the first one.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use alcove_chat::ChatService;
use alcove_chat::feed::ChangeFeed;
use alcove_chat::notify::TableNotificationQueue;
use alcove_db::Database;
use alcove_sync::ConversationSync;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "alcove=debug".into()),
        )
        .init();

    let db_path = std::env::var("ALCOVE_DB_PATH").unwrap_or_else(|_| "alcove.db".into());
    let db = Arc::new(Database::open(&PathBuf::from(&db_path))?);

    let feed = ChangeFeed::default();
    let notifications = Arc::new(TableNotificationQueue::new(db.clone()));
    let service = Arc::new(ChatService::new(db.clone(), feed.clone(), notifications));

    let ana = seed_user(&db, "ana")?;
    let ben = seed_user(&db, "ben")?;

    let conversation = service.get_or_create_conversation(ana, ben).await?;
    service
        .send_message(
            conversation.id,
            ana,
            Some("hey, saw your moodboard".into()),
            None,
        )
        .await?;
    service
        .send_message(
            conversation.id,
            ben,
            Some("thanks! still tweaking the palette".into()),
            None,
        )
        .await?;

    let sync = ConversationSync::new(service.clone(), feed);
    sync.set_identity(Some(ana)).await;
    sync.fetch_all(true).await?;

    let snapshot = sync.snapshot().await;
    info!(
        "{} conversation(s), {} unread total",
        snapshot.conversations.len(),
        snapshot.unread_total
    );
    for view in &snapshot.conversations {
        let partner = view
            .partner
            .as_ref()
            .map(|p| p.username.as_str())
            .unwrap_or("?");
        let preview = view
            .last_message
            .as_ref()
            .and_then(|m| m.content.as_deref())
            .unwrap_or("(media)");
        info!("[{} unread] {}: {}", view.unread_count, partner, preview);
    }

    Ok(())
}

fn seed_user(db: &Database, username: &str) -> anyhow::Result<Uuid> {
    if let Some(row) = db.get_user_by_username(username)? {
        return Ok(row.id.parse()?);
    }
    let id = Uuid::new_v4();
    db.create_user(&id.to_string(), username, None, None)?;
    Ok(id)
}
