use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use tokio::sync::{RwLock, broadcast};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

use alcove_chat::error::ChatError;
use alcove_chat::feed::ChangeFeed;
use alcove_types::events::StoreEvent;
use alcove_types::models::Message;

use crate::backend::SyncBackend;
use crate::scheduler::RefetchScheduler;
use crate::view::ConversationView;

/// Minimum interval between non-forced fetches.
pub const FETCH_THROTTLE: Duration = Duration::from_millis(1000);

/// How long a message event waits before triggering a refetch, so a burst of
/// events collapses into one fetch.
pub const REFETCH_DELAY: Duration = Duration::from_millis(1000);

/// Point-in-time copy of the cache, the UI-facing query surface.
#[derive(Debug, Clone, Default)]
pub struct SyncSnapshot {
    pub conversations: Vec<ConversationView>,
    pub loading: bool,
    pub error: Option<String>,
    pub unread_total: usize,
    pub active_conversation_id: Option<Uuid>,
}

#[derive(Default)]
struct CacheState {
    views: Vec<ConversationView>,
    unread_total: usize,
    active_conversation_id: Option<Uuid>,
    loading: bool,
    error: Option<String>,
}

#[derive(Default)]
struct FetchGate {
    in_flight: bool,
    last_started: Option<Instant>,
}

/// Realtime-updated cache of conversation views for one identity.
///
/// Every cache writer funnels through methods here, and each of them
/// recomputes `unread_total` from the views. The total is derived state and
/// is never adjusted in place, which is what keeps it from drifting under
/// overlapping fetches, optimistic updates, and change-feed refetches.
pub struct ConversationSync<B> {
    shared: Arc<SyncShared<B>>,
}

impl<B> Clone for ConversationSync<B> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

struct SyncShared<B> {
    backend: Arc<B>,
    feed: ChangeFeed,
    identity: StdMutex<Option<Uuid>>,
    state: RwLock<CacheState>,
    gate: StdMutex<FetchGate>,
    scheduler: RefetchScheduler,
    subscription: StdMutex<Option<JoinHandle<()>>>,
}

impl<B: SyncBackend + 'static> ConversationSync<B> {
    pub fn new(backend: Arc<B>, feed: ChangeFeed) -> Self {
        Self {
            shared: Arc::new(SyncShared {
                backend,
                feed,
                identity: StdMutex::new(None),
                state: RwLock::new(CacheState::default()),
                gate: StdMutex::new(FetchGate::default()),
                scheduler: RefetchScheduler::new(),
                subscription: StdMutex::new(None),
            }),
        }
    }

    /// Point the cache at a new identity: tears down the previous change-feed
    /// subscription and pending refetch timers, clears the cached views, and
    /// subscribes afresh. `None` just tears down.
    pub async fn set_identity(&self, user_id: Option<Uuid>) {
        {
            let mut subscription = self
                .shared
                .subscription
                .lock()
                .expect("subscription lock poisoned");
            if let Some(task) = subscription.take() {
                task.abort();
            }
        }
        self.shared.scheduler.cancel_all();
        *self.shared.identity.lock().expect("identity lock poisoned") = user_id;

        {
            let mut state = self.shared.state.write().await;
            state.views.clear();
            state.active_conversation_id = None;
            state.error = None;
            recompute_unread_total(&mut state);
        }

        let Some(user_id) = user_id else { return };

        debug!("subscribing to change feed as {}", user_id);
        let shared = self.shared.clone();
        let rx = self.shared.feed.subscribe();
        let task = tokio::spawn(run_subscription(shared, user_id, rx));
        *self
            .shared
            .subscription
            .lock()
            .expect("subscription lock poisoned") = Some(task);
    }

    /// Re-derive the whole cache from the store. Non-forced calls are
    /// dropped while a fetch is in flight or within the throttle window;
    /// forced calls (initial load, manual refresh) bypass both guards.
    pub async fn fetch_all(&self, force: bool) -> Result<(), ChatError> {
        self.shared.fetch_all(force).await
    }

    /// Manual refresh; always bypasses the guards.
    pub async fn refresh(&self) -> Result<(), ChatError> {
        self.shared.fetch_all(true).await
    }

    pub async fn snapshot(&self) -> SyncSnapshot {
        let state = self.shared.state.read().await;
        SyncSnapshot {
            conversations: state.views.clone(),
            loading: state.loading,
            error: state.error.clone(),
            unread_total: state.unread_total,
            active_conversation_id: state.active_conversation_id,
        }
    }

    pub async fn unread_total(&self) -> usize {
        self.shared.state.read().await.unread_total
    }

    pub async fn set_active_conversation(&self, conversation_id: Option<Uuid>) {
        self.shared.state.write().await.active_conversation_id = conversation_id;
    }

    /// Optimistically insert a conversation view before the store round trip
    /// confirms it. Idempotent by conversation id.
    pub async fn add_conversation(&self, view: ConversationView) {
        let mut state = self.shared.state.write().await;
        if state
            .views
            .iter()
            .any(|v| v.conversation.id == view.conversation.id)
        {
            return;
        }
        state.views.push(view);
        sort_views(&mut state.views);
        recompute_unread_total(&mut state);
    }

    /// Optimistically apply a just-sent or just-pushed message: newest
    /// message, bumped recency, and an unread increment only when the sender
    /// is not the active identity.
    pub async fn update_conversation_with_message(&self, conversation_id: Uuid, message: Message) {
        let identity = *self.shared.identity.lock().expect("identity lock poisoned");
        let mut state = self.shared.state.write().await;
        let Some(view) = state
            .views
            .iter_mut()
            .find(|v| v.conversation.id == conversation_id)
        else {
            return;
        };

        view.conversation.last_message_at = message.created_at;
        view.conversation.updated_at = message.created_at;
        if identity != Some(message.sender_id) {
            view.unread_count += 1;
        }
        view.last_message = Some(message);

        sort_views(&mut state.views);
        recompute_unread_total(&mut state);
    }

    /// Optimistically zero a conversation's unread count.
    pub async fn mark_conversation_read(&self, conversation_id: Uuid) {
        let mut state = self.shared.state.write().await;
        if let Some(view) = state
            .views
            .iter_mut()
            .find(|v| v.conversation.id == conversation_id)
        {
            view.unread_count = 0;
        }
        recompute_unread_total(&mut state);
    }

    /// Drop a deleted conversation from the cache.
    pub async fn remove_conversation(&self, conversation_id: Uuid) {
        let mut state = self.shared.state.write().await;
        state.views.retain(|v| v.conversation.id != conversation_id);
        if state.active_conversation_id == Some(conversation_id) {
            state.active_conversation_id = None;
        }
        recompute_unread_total(&mut state);
    }
}

impl<B: SyncBackend + 'static> SyncShared<B> {
    async fn fetch_all(&self, force: bool) -> Result<(), ChatError> {
        let identity = match *self.identity.lock().expect("identity lock poisoned") {
            Some(id) => id,
            None => return Ok(()),
        };

        {
            let mut gate = self.gate.lock().expect("fetch gate lock poisoned");
            if gate.in_flight && !force {
                debug!("fetch already in flight, skipping");
                return Ok(());
            }
            if !force {
                if let Some(last) = gate.last_started {
                    if last.elapsed() < FETCH_THROTTLE {
                        debug!("fetch throttled");
                        return Ok(());
                    }
                }
            }
            gate.in_flight = true;
            gate.last_started = Some(Instant::now());
        }

        self.state.write().await.loading = true;

        let result = self.load_views(identity).await;

        let mut state = self.state.write().await;
        let outcome = match result {
            Ok(views) => {
                state.views = views;
                state.error = None;
                recompute_unread_total(&mut state);
                Ok(())
            }
            Err(err) => {
                state.error = Some(err.to_string());
                Err(err)
            }
        };
        state.loading = false;
        drop(state);

        self.gate.lock().expect("fetch gate lock poisoned").in_flight = false;
        outcome
    }

    /// The three batched reads, then client-side grouping into views.
    async fn load_views(&self, identity: Uuid) -> Result<Vec<ConversationView>, ChatError> {
        let conversations = self.backend.conversations_for(identity).await?;

        let partner_ids: Vec<Uuid> = conversations
            .iter()
            .filter_map(|c| c.participants.other(identity))
            .collect();
        let profiles: HashMap<Uuid, _> = self
            .backend
            .profiles_by_ids(partner_ids)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

        let conversation_ids: Vec<Uuid> = conversations.iter().map(|c| c.id).collect();
        let messages = self
            .backend
            .messages_for_conversations(conversation_ids)
            .await?;

        // Newest-first from the store, so the first message per group is the
        // latest one.
        let mut grouped: HashMap<Uuid, Vec<Message>> = HashMap::new();
        for message in messages {
            grouped
                .entry(message.conversation_id)
                .or_default()
                .push(message);
        }

        let mut views: Vec<ConversationView> = conversations
            .into_iter()
            .map(|conversation| {
                let messages = grouped.remove(&conversation.id).unwrap_or_default();
                let unread_count = messages
                    .iter()
                    .filter(|m| m.sender_id != identity && m.read_at.is_none())
                    .count();
                let partner = conversation
                    .participants
                    .other(identity)
                    .and_then(|id| profiles.get(&id).cloned());
                let last_message = messages.into_iter().next();
                ConversationView {
                    conversation,
                    partner,
                    last_message,
                    unread_count,
                }
            })
            .collect();

        sort_views(&mut views);
        Ok(views)
    }
}

async fn run_subscription<B: SyncBackend + 'static>(
    shared: Arc<SyncShared<B>>,
    identity: Uuid,
    mut rx: broadcast::Receiver<StoreEvent>,
) {
    loop {
        let event = match rx.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!("change feed receiver lagged by {} events", n);
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };

        handle_event(&shared, identity, event).await;
    }
}

async fn handle_event<B: SyncBackend + 'static>(
    shared: &Arc<SyncShared<B>>,
    identity: Uuid,
    event: StoreEvent,
) {
    match event {
        StoreEvent::MessageCreate {
            conversation_id, ..
        } => {
            let cached = shared
                .state
                .read()
                .await
                .views
                .iter()
                .any(|v| v.conversation.id == conversation_id);
            if !cached {
                return;
            }

            // Delayed refetch, suppressed if any fetch starts after the
            // event was observed; that fetch already saw the new row.
            let observed = Instant::now();
            let task_shared = shared.clone();
            shared.scheduler.schedule(
                &format!("refetch:{conversation_id}"),
                REFETCH_DELAY,
                async move {
                    let superseded = {
                        let gate = task_shared.gate.lock().expect("fetch gate lock poisoned");
                        gate.last_started.is_some_and(|started| started >= observed)
                    };
                    if superseded {
                        debug!("refetch for {} superseded by a newer fetch", conversation_id);
                        return;
                    }
                    if let Err(err) = task_shared.fetch_all(false).await {
                        warn!("scheduled refetch failed: {}", err);
                    }
                },
            );
        }
        StoreEvent::ConversationCreate { participants, .. } => {
            if !participants.contains(identity) {
                return;
            }
            // Forced: the previous fetch cannot have seen this conversation.
            if let Err(err) = shared.fetch_all(true).await {
                warn!("refetch after new conversation failed: {}", err);
            }
        }
    }
}

fn sort_views(views: &mut [ConversationView]) {
    views.sort_by(|a, b| {
        b.conversation
            .last_message_at
            .cmp(&a.conversation.last_message_at)
    });
}

fn recompute_unread_total(state: &mut CacheState) {
    state.unread_total = state.views.iter().map(|v| v.unread_count).sum();
}
