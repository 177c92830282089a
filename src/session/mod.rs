//! Conversation session: single owner of the message timeline.
//!
//! A session owns the [`MessageStore`] for one conversation screen and
//! coordinates everything that writes into it: optimistic sends, history
//! pages and live subscription events. Network work runs on spawned tokio
//! tasks; every completion comes back as a [`SessionEvent`] over an mpsc
//! channel and is applied by the owner through [`ConversationSession::handle_event`],
//! so the store is only ever mutated from one control flow.

mod live;
pub mod observer;
mod pagination;
mod send;
pub mod view;

#[cfg(test)]
pub(crate) mod testing;

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::cache::{MediaCache, MemoryMediaCache};
use crate::config::SessionConfig;
use crate::error::ChatError;
use crate::models::{
    Conversation, DeliveryState, Message, MessageId, Participant, TypingIndicator,
};
use crate::service::{ChatService, FetchDelivery, MessageChange};
use crate::store::{MessageStore, StoreError};

use live::LiveUpdates;
use pagination::Pagination;
use send::SendTracker;

pub use live::TypingIndicatorState;
pub use observer::{ConversationObserver, NoopObserver};
pub use pagination::ScrollAnchor;
pub use send::{PendingSend, SendCallback, SendState};
pub use view::{ComposeAffordance, ConversationView, NoopView, ScrollMetrics};

/// Completions and pushes routed back to the session owner.
#[derive(Debug)]
pub enum SessionEvent {
    ParticipantsFetched(Result<Vec<Participant>, ChatError>),
    UnsentFetched(Vec<Message>),
    MessagesDelivered {
        request_id: u64,
        delivery: FetchDelivery,
    },
    SendCompleted {
        message_id: MessageId,
        result: Result<Option<Message>, ChatError>,
    },
    MessageChanged(MessageChange),
    TypingChanged(TypingIndicator),
    TypingExpired {
        generation: u64,
    },
}

/// Per-message actions offered by the timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageAction {
    Copy,
    Resend,
    Delete,
}

pub struct ConversationSession {
    service: Arc<dyn ChatService>,
    conversation: Option<Conversation>,
    local_user_id: String,
    local_display_name: Option<String>,
    config: SessionConfig,
    observer: Arc<dyn ConversationObserver>,
    view: Arc<dyn ConversationView>,
    media_cache: Arc<dyn MediaCache>,

    store: MessageStore,
    participants: HashMap<String, Participant>,
    sends: SendTracker,
    pagination: Pagination,
    live: LiveUpdates,
    auto_scroll_to_latest: bool,
    closed: bool,

    events_tx: mpsc::UnboundedSender<SessionEvent>,
    events_rx: mpsc::UnboundedReceiver<SessionEvent>,
}

impl ConversationSession {
    pub fn new(
        service: Arc<dyn ChatService>,
        local_user_id: impl Into<String>,
        config: SessionConfig,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            service,
            conversation: None,
            local_user_id: local_user_id.into(),
            local_display_name: None,
            config,
            observer: Arc::new(NoopObserver),
            view: Arc::new(NoopView),
            media_cache: Arc::new(MemoryMediaCache::new()),
            store: MessageStore::new(),
            participants: HashMap::new(),
            sends: SendTracker::default(),
            pagination: Pagination::default(),
            live: LiveUpdates::default(),
            auto_scroll_to_latest: true,
            closed: false,
            events_tx,
            events_rx,
        }
    }

    pub fn with_conversation(mut self, conversation: Conversation) -> Self {
        self.conversation = Some(conversation);
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn ConversationObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_view(mut self, view: Arc<dyn ConversationView>) -> Self {
        self.view = view;
        self
    }

    pub fn with_media_cache(mut self, cache: Arc<dyn MediaCache>) -> Self {
        self.media_cache = cache;
        self
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Screen appeared: load participants and the first page if needed, then
    /// start live subscriptions.
    pub fn open(&mut self) -> Result<(), ChatError> {
        let Some(conversation) = &self.conversation else {
            tracing::error!("Conversation is not set");
            return Err(ChatError::InvalidArgument(
                "Conversation is not set".to_string(),
            ));
        };
        tracing::info!("Opening conversation {}", conversation.id);
        self.closed = false;

        self.update_title();

        if self.participants.is_empty() {
            self.fetch_participants();
        }

        if self.store.is_empty() {
            self.fetch_unsent_messages();
            self.fetch_messages(None);
        }

        self.subscribe();
        Ok(())
    }

    /// Screen went away: stop live updates and retire the running history
    /// fetch. Send results that arrive later still settle the store; every
    /// other late event is ignored.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        tracing::info!("Closing conversation session");
        self.unsubscribe();
        self.live.cancel_timer();
        self.abandon_fetch();
        self.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    // -----------------------------------------------------------------------
    // Event loop
    // -----------------------------------------------------------------------

    /// Wait for the next completion or push.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        self.events_rx.recv().await
    }

    /// Apply one event to the session state.
    pub fn handle_event(&mut self, event: SessionEvent) {
        if self.closed {
            match event {
                SessionEvent::SendCompleted { message_id, result } => {
                    self.handle_send_completed(message_id, result)
                }
                other => tracing::debug!("Session closed, ignoring {:?}", other),
            }
            return;
        }

        match event {
            SessionEvent::ParticipantsFetched(result) => self.handle_participants(result),
            SessionEvent::UnsentFetched(messages) => self.handle_unsent(messages),
            SessionEvent::MessagesDelivered {
                request_id,
                delivery,
            } => self.handle_delivery(request_id, delivery),
            SessionEvent::SendCompleted { message_id, result } => {
                self.handle_send_completed(message_id, result)
            }
            SessionEvent::MessageChanged(change) => self.handle_message_change(change),
            SessionEvent::TypingChanged(indicator) => self.handle_typing(indicator),
            SessionEvent::TypingExpired { generation } => self.handle_typing_expired(generation),
        }
    }

    /// Wait for one event and apply it.
    pub async fn process_next(&mut self) -> bool {
        match self.next_event().await {
            Some(event) => {
                self.handle_event(event);
                true
            }
            None => false,
        }
    }

    /// Apply every event already queued, without waiting. Returns how many
    /// were applied.
    pub fn process_pending(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(event) = self.events_rx.try_recv() {
            self.handle_event(event);
            applied += 1;
        }
        applied
    }

    /// Drain events until spawned work goes quiet.
    ///
    /// Timers that have not fired yet are not waited for.
    pub async fn run_until_idle(&mut self) {
        let mut idle_rounds = 0;
        while idle_rounds < 3 {
            tokio::task::yield_now().await;
            if self.process_pending() == 0 {
                idle_rounds += 1;
            } else {
                idle_rounds = 0;
            }
        }
    }

    pub(crate) fn event_sender(&self) -> mpsc::UnboundedSender<SessionEvent> {
        self.events_tx.clone()
    }

    // -----------------------------------------------------------------------
    // Participants
    // -----------------------------------------------------------------------

    pub fn fetch_participants(&mut self) {
        let Some(conversation) = &self.conversation else {
            tracing::warn!("Cannot fetch participants with nil conversation");
            return;
        };

        let ids = conversation.participant_ids.clone();
        let service = Arc::clone(&self.service);
        let tx = self.event_sender();
        tokio::spawn(async move {
            let result = service.fetch_participants(&ids).await;
            let _ = tx.send(SessionEvent::ParticipantsFetched(result));
        });
    }

    fn handle_participants(&mut self, result: Result<Vec<Participant>, ChatError>) {
        let fetched = match result {
            Ok(list) if list.iter().any(|p| p.id.is_empty()) => Err(ChatError::BadResponse(
                "Fetched participants are in wrong format".to_string(),
            )),
            other => other,
        };

        let participants = match fetched {
            Ok(list) => list,
            Err(e) => {
                tracing::warn!("Failed to fetch participants: {}", e);
                self.observer.failed_fetching_participants(&e);
                return;
            }
        };

        tracing::debug!("Fetched {} participant(s)", participants.len());
        for p in &participants {
            self.participants.insert(p.id.clone(), p.clone());
        }

        if let Some(name) = self
            .participants
            .get(&self.local_user_id)
            .and_then(|p| p.display_name.clone())
        {
            self.local_display_name = Some(name);
        }

        self.update_title();
        self.observer.fetched_participants(&participants);
        self.view.reload();
    }

    /// Conversation title, else the other participants' names.
    pub fn title(&self) -> Option<String> {
        let conversation = self.conversation.as_ref()?;
        if let Some(title) = &conversation.title {
            return Some(title.clone());
        }
        conversation.name_list(self.participants.values(), &self.local_user_id)
    }

    fn update_title(&self) {
        let title = self.title();
        self.view.set_title(title.as_deref());
    }

    pub fn participants(&self) -> &HashMap<String, Participant> {
        &self.participants
    }

    pub fn local_display_name(&self) -> Option<&str> {
        self.local_display_name.as_deref()
    }

    pub fn sender(&self, message: &Message) -> Option<&Participant> {
        let sender = self.participants.get(&message.author_id);
        if sender.is_none() {
            tracing::warn!("Participant ID {} is not fetched", message.author_id);
        }
        sender
    }

    /// Author display name; empty when the author is unresolved.
    pub fn sender_name(&self, message: &Message) -> &str {
        self.sender(message)
            .and_then(|p| p.display_name.as_deref())
            .unwrap_or("")
    }

    // -----------------------------------------------------------------------
    // Unsent messages
    // -----------------------------------------------------------------------

    pub fn fetch_unsent_messages(&mut self) {
        let Some(conversation) = &self.conversation else {
            tracing::warn!("Cannot fetch unsent messages with nil conversation");
            return;
        };

        let conversation_id = conversation.id.clone();
        let service = Arc::clone(&self.service);
        let tx = self.event_sender();
        tokio::spawn(async move {
            let unsent = service.fetch_unsent_messages(&conversation_id).await;
            let _ = tx.send(SessionEvent::UnsentFetched(unsent));
        });
    }

    fn handle_unsent(&mut self, messages: Vec<Message>) {
        tracing::debug!("Restoring {} unsent message(s)", messages.len());
        self.observer.fetched_messages(&messages, true);
        self.store.merge(messages);
        self.view.finish_receiving();
    }

    // -----------------------------------------------------------------------
    // Timeline queries
    // -----------------------------------------------------------------------

    pub fn store(&self) -> &MessageStore {
        &self.store
    }

    pub fn conversation(&self) -> Option<&Conversation> {
        self.conversation.as_ref()
    }

    pub fn local_user_id(&self) -> &str {
        &self.local_user_id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn is_outgoing(&self, message: &Message) -> bool {
        message.author_id == self.local_user_id
    }

    /// Whether the row at `index` should carry a sender label.
    ///
    /// Hidden for our own messages and one-to-one chats; otherwise shown at
    /// the top and whenever the sender changes.
    pub fn should_show_sender_name(&self, index: usize) -> Result<bool, StoreError> {
        let message = self.store.message_at(index)?;
        if self.is_outgoing(message) || self.participants.len() < 3 {
            return Ok(false);
        }
        if index == 0 {
            return Ok(true);
        }
        let previous = self.store.message_at(index - 1)?;
        Ok(self.sender_name(message) != self.sender_name(previous))
    }

    pub fn message_actions(&self, index: usize) -> Result<Vec<MessageAction>, StoreError> {
        let message = self.store.message_at(index)?;
        if message.failed {
            Ok(vec![MessageAction::Resend, MessageAction::Delete])
        } else {
            Ok(vec![MessageAction::Copy])
        }
    }

    /// Delivery state to display under an outgoing message.
    pub fn delivery_status(&self, index: usize) -> Result<Option<DeliveryState>, StoreError> {
        let message = self.store.message_at(index)?;
        if !self.is_outgoing(message) {
            return Ok(None);
        }
        Ok(message.display_delivery_state())
    }

    pub fn auto_scroll_to_latest(&self) -> bool {
        self.auto_scroll_to_latest
    }

    // -----------------------------------------------------------------------
    // Avatars
    // -----------------------------------------------------------------------

    /// Cached avatar bytes for a participant, if any.
    pub fn avatar_data(&self, participant_id: &str) -> Option<Vec<u8>> {
        let source = self.participants.get(participant_id)?.avatar.as_ref()?;
        self.media_cache.get(&source.cache_key())
    }

    /// Store downloaded avatar bytes. Returns `false` when the participant
    /// has no avatar source.
    pub fn store_avatar_data(&self, participant_id: &str, data: Vec<u8>) -> bool {
        let Some(source) = self
            .participants
            .get(participant_id)
            .and_then(|p| p.avatar.as_ref())
        else {
            return false;
        };
        self.media_cache.set(source.cache_key(), data);
        true
    }

    pub fn media_cache(&self) -> &Arc<dyn MediaCache> {
        &self.media_cache
    }
}

impl Drop for ConversationSession {
    fn drop(&mut self) {
        self.close();
    }
}
