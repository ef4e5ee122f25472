//! Cache-consistency coverage for the synchronization layer: throttling, the
//! unread-total invariant, optimistic mutations, and change-feed refetches
//! against a live in-memory store.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use alcove_chat::ChatService;
use alcove_chat::error::ChatError;
use alcove_chat::feed::ChangeFeed;
use alcove_chat::notify::TableNotificationQueue;
use alcove_db::Database;
use alcove_sync::{ConversationSync, ConversationView, SyncBackend};
use alcove_types::models::{Conversation, Message, ParticipantPair, Profile};

/// Counts conversation-list reads so tests can observe the throttle, and
/// fails on demand so they can observe the error path.
struct CountingBackend {
    inner: Arc<ChatService>,
    reads: AtomicUsize,
    fail_next: AtomicBool,
}

impl CountingBackend {
    fn new(inner: Arc<ChatService>) -> Self {
        Self {
            inner,
            reads: AtomicUsize::new(0),
            fail_next: AtomicBool::new(false),
        }
    }

    fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SyncBackend for CountingBackend {
    async fn conversations_for(&self, user_id: Uuid) -> Result<Vec<Conversation>, ChatError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(ChatError::Storage(anyhow::anyhow!("store offline")));
        }
        self.inner.conversations_for(user_id).await
    }

    async fn profiles_by_ids(&self, ids: Vec<Uuid>) -> Result<Vec<Profile>, ChatError> {
        self.inner.profiles_by_ids(ids).await
    }

    async fn messages_for_conversations(
        &self,
        conversation_ids: Vec<Uuid>,
    ) -> Result<Vec<Message>, ChatError> {
        self.inner.messages_for_conversations(conversation_ids).await
    }
}

struct Fixture {
    service: Arc<ChatService>,
    backend: Arc<CountingBackend>,
    sync: ConversationSync<CountingBackend>,
    ana: Uuid,
    ben: Uuid,
}

fn fixture() -> Fixture {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let ana = seed_user(&db, "ana");
    let ben = seed_user(&db, "ben");

    let feed = ChangeFeed::default();
    let notifications = Arc::new(TableNotificationQueue::new(db.clone()));
    let service = Arc::new(ChatService::new(db, feed.clone(), notifications));
    let backend = Arc::new(CountingBackend::new(service.clone()));
    let sync = ConversationSync::new(backend.clone(), feed);

    Fixture {
        service,
        backend,
        sync,
        ana,
        ben,
    }
}

fn seed_user(db: &Database, username: &str) -> Uuid {
    let id = Uuid::new_v4();
    db.create_user(&id.to_string(), username, None, None).unwrap();
    id
}

fn stub_view(conversation_id: Uuid, me: Uuid, partner: Uuid, unread: usize) -> ConversationView {
    let now = Utc::now();
    ConversationView {
        conversation: Conversation {
            id: conversation_id,
            participants: ParticipantPair::new(me, partner),
            created_at: now,
            updated_at: now,
            last_message_at: now,
        },
        partner: None,
        last_message: None,
        unread_count: unread,
    }
}

fn stub_message(conversation_id: Uuid, sender_id: Uuid) -> Message {
    Message {
        id: Uuid::new_v4(),
        conversation_id,
        sender_id,
        content: Some("ping".into()),
        media: None,
        created_at: Utc::now(),
        read_at: None,
    }
}

async fn assert_invariant(sync: &ConversationSync<CountingBackend>) {
    let snapshot = sync.snapshot().await;
    let summed: usize = snapshot.conversations.iter().map(|v| v.unread_count).sum();
    assert_eq!(snapshot.unread_total, summed);
}

#[tokio::test]
async fn fetch_all_builds_views_with_unread_counts() {
    let f = fixture();
    let conversation = f.service.get_or_create_conversation(f.ana, f.ben).await.unwrap();
    for (sender, text) in [(f.ana, "one"), (f.ben, "two"), (f.ana, "three")] {
        f.service
            .send_message(conversation.id, sender, Some(text.into()), None)
            .await
            .unwrap();
    }

    f.sync.set_identity(Some(f.ben)).await;
    f.sync.fetch_all(true).await.unwrap();

    let snapshot = f.sync.snapshot().await;
    assert_eq!(snapshot.conversations.len(), 1);
    let view = &snapshot.conversations[0];
    assert_eq!(view.unread_count, 2);
    assert_eq!(view.partner.as_ref().unwrap().username, "ana");
    assert_eq!(view.last_message.as_ref().unwrap().content.as_deref(), Some("three"));
    assert_eq!(snapshot.unread_total, 2);
    assert!(!snapshot.loading);
    assert!(snapshot.error.is_none());
}

#[tokio::test]
async fn rapid_non_forced_fetches_hit_the_store_once() {
    let f = fixture();
    f.service.get_or_create_conversation(f.ana, f.ben).await.unwrap();
    f.sync.set_identity(Some(f.ben)).await;

    f.sync.fetch_all(false).await.unwrap();
    f.sync.fetch_all(false).await.unwrap();
    assert_eq!(f.backend.reads(), 1);

    // Forced calls bypass the throttle
    f.sync.fetch_all(true).await.unwrap();
    assert_eq!(f.backend.reads(), 2);
}

#[tokio::test]
async fn fetch_without_identity_is_a_noop() {
    let f = fixture();
    f.sync.fetch_all(true).await.unwrap();
    assert_eq!(f.backend.reads(), 0);
}

#[tokio::test]
async fn unread_total_tracks_every_optimistic_mutation() {
    let f = fixture();
    f.sync.set_identity(Some(f.ana)).await;

    let conv_a = Uuid::new_v4();
    let conv_b = Uuid::new_v4();
    let partner_a = Uuid::new_v4();
    let partner_b = Uuid::new_v4();

    f.sync.add_conversation(stub_view(conv_a, f.ana, partner_a, 0)).await;
    assert_invariant(&f.sync).await;

    f.sync.add_conversation(stub_view(conv_b, f.ana, partner_b, 3)).await;
    assert_invariant(&f.sync).await;
    assert_eq!(f.sync.unread_total().await, 3);

    // Foreign sender bumps the count, own sender does not
    f.sync
        .update_conversation_with_message(conv_a, stub_message(conv_a, partner_a))
        .await;
    f.sync
        .update_conversation_with_message(conv_a, stub_message(conv_a, f.ana))
        .await;
    assert_invariant(&f.sync).await;
    assert_eq!(f.sync.unread_total().await, 4);

    f.sync.mark_conversation_read(conv_b).await;
    assert_invariant(&f.sync).await;
    assert_eq!(f.sync.unread_total().await, 1);

    f.sync.remove_conversation(conv_a).await;
    assert_invariant(&f.sync).await;
    assert_eq!(f.sync.unread_total().await, 0);
}

#[tokio::test]
async fn add_conversation_is_idempotent_by_id() {
    let f = fixture();
    f.sync.set_identity(Some(f.ana)).await;

    let conv = Uuid::new_v4();
    let partner = Uuid::new_v4();
    f.sync.add_conversation(stub_view(conv, f.ana, partner, 2)).await;
    f.sync.add_conversation(stub_view(conv, f.ana, partner, 7)).await;

    let snapshot = f.sync.snapshot().await;
    assert_eq!(snapshot.conversations.len(), 1);
    assert_eq!(snapshot.unread_total, 2);
}

#[tokio::test]
async fn newest_message_reorders_the_view_list() {
    let f = fixture();
    f.sync.set_identity(Some(f.ana)).await;

    let conv_a = Uuid::new_v4();
    let conv_b = Uuid::new_v4();
    f.sync.add_conversation(stub_view(conv_a, f.ana, Uuid::new_v4(), 0)).await;
    f.sync.add_conversation(stub_view(conv_b, f.ana, Uuid::new_v4(), 0)).await;

    f.sync
        .update_conversation_with_message(conv_a, stub_message(conv_a, f.ana))
        .await;

    let snapshot = f.sync.snapshot().await;
    assert_eq!(snapshot.conversations[0].conversation.id, conv_a);
}

#[tokio::test]
async fn message_event_refetches_a_cached_conversation() {
    let f = fixture();
    let conversation = f.service.get_or_create_conversation(f.ana, f.ben).await.unwrap();
    f.service
        .send_message(conversation.id, f.ana, Some("one".into()), None)
        .await
        .unwrap();

    f.sync.set_identity(Some(f.ben)).await;
    f.sync.fetch_all(true).await.unwrap();
    assert_eq!(f.sync.unread_total().await, 1);

    // A push event for a cached conversation refetches after ~1s
    f.service
        .send_message(conversation.id, f.ana, Some("two".into()), None)
        .await
        .unwrap();

    let mut settled = false;
    for _ in 0..100 {
        if f.sync.unread_total().await == 2 {
            settled = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(settled, "refetch never picked up the pushed message");
}

#[tokio::test]
async fn new_conversation_event_refetches_immediately() {
    let f = fixture();
    f.sync.set_identity(Some(f.ben)).await;
    f.sync.fetch_all(true).await.unwrap();
    assert!(f.sync.snapshot().await.conversations.is_empty());

    let eve = seed_user(f.service.database(), "eve");
    f.service.get_or_create_conversation(eve, f.ben).await.unwrap();

    let mut appeared = false;
    for _ in 0..100 {
        if f.sync.snapshot().await.conversations.len() == 1 {
            appeared = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(appeared, "new conversation never reached the cache");
}

#[tokio::test]
async fn foreign_conversation_event_is_ignored() {
    let f = fixture();
    f.sync.set_identity(Some(f.ben)).await;
    f.sync.fetch_all(true).await.unwrap();
    let baseline = f.backend.reads();

    let eve = seed_user(f.service.database(), "eve");
    f.service.get_or_create_conversation(f.ana, eve).await.unwrap();

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(f.backend.reads(), baseline);
    assert!(f.sync.snapshot().await.conversations.is_empty());
}

#[tokio::test]
async fn forced_fetch_supersedes_a_scheduled_refetch() {
    let f = fixture();
    let conversation = f.service.get_or_create_conversation(f.ana, f.ben).await.unwrap();

    f.sync.set_identity(Some(f.ben)).await;
    f.sync.fetch_all(true).await.unwrap();

    f.service
        .send_message(conversation.id, f.ana, Some("one".into()), None)
        .await
        .unwrap();

    // Let the subscription observe the event and schedule, then fetch before
    // the timer fires: the scheduled refetch must detect it was superseded.
    tokio::time::sleep(Duration::from_millis(200)).await;
    f.sync.fetch_all(true).await.unwrap();
    let after_forced = f.backend.reads();
    assert_eq!(f.sync.unread_total().await, 1);

    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(f.backend.reads(), after_forced);
}

#[tokio::test]
async fn clearing_identity_tears_down_the_subscription() {
    let f = fixture();
    let conversation = f.service.get_or_create_conversation(f.ana, f.ben).await.unwrap();

    f.sync.set_identity(Some(f.ben)).await;
    f.sync.fetch_all(true).await.unwrap();
    f.sync.set_identity(None).await;

    assert!(f.sync.snapshot().await.conversations.is_empty());
    let baseline = f.backend.reads();

    f.service
        .send_message(conversation.id, f.ana, Some("into the void".into()), None)
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(f.backend.reads(), baseline);
}

#[tokio::test]
async fn fetch_errors_surface_as_retryable_state() {
    let f = fixture();
    let conversation = f.service.get_or_create_conversation(f.ana, f.ben).await.unwrap();
    f.service
        .send_message(conversation.id, f.ana, Some("one".into()), None)
        .await
        .unwrap();
    f.sync.set_identity(Some(f.ben)).await;

    f.backend.fail_next.store(true, Ordering::SeqCst);
    assert!(f.sync.fetch_all(true).await.is_err());

    let snapshot = f.sync.snapshot().await;
    assert!(snapshot.error.is_some());
    assert!(!snapshot.loading);
    assert!(snapshot.conversations.is_empty());

    // The next (retrying) fetch clears the error and fills the cache
    f.sync.fetch_all(true).await.unwrap();
    let snapshot = f.sync.snapshot().await;
    assert!(snapshot.error.is_none());
    assert_eq!(snapshot.conversations.len(), 1);
    assert_eq!(snapshot.unread_total, 1);
}

#[tokio::test]
async fn removing_the_active_conversation_clears_the_pointer() {
    let f = fixture();
    f.sync.set_identity(Some(f.ana)).await;

    let conv = Uuid::new_v4();
    f.sync.add_conversation(stub_view(conv, f.ana, Uuid::new_v4(), 1)).await;
    f.sync.set_active_conversation(Some(conv)).await;
    assert_eq!(f.sync.snapshot().await.active_conversation_id, Some(conv));

    f.sync.remove_conversation(conv).await;
    let snapshot = f.sync.snapshot().await;
    assert_eq!(snapshot.active_conversation_id, None);
    assert_eq!(snapshot.unread_total, 0);
}

#[tokio::test]
async fn read_state_round_trip_through_the_cache() {
    let f = fixture();
    let conversation = f.service.get_or_create_conversation(f.ana, f.ben).await.unwrap();
    for text in ["one", "two"] {
        f.service
            .send_message(conversation.id, f.ana, Some(text.into()), None)
            .await
            .unwrap();
    }

    f.sync.set_identity(Some(f.ben)).await;
    f.sync.fetch_all(true).await.unwrap();
    assert_eq!(f.sync.unread_total().await, 2);

    // Optimistic zeroing first, then the store catches up
    f.sync.mark_conversation_read(conversation.id).await;
    assert_eq!(f.sync.unread_total().await, 0);

    f.service.mark_read(conversation.id, f.ben).await.unwrap();
    f.sync.refresh().await.unwrap();
    assert_eq!(f.sync.unread_total().await, 0);
    assert_invariant(&f.sync).await;
}
