//! In-process chat service
//!
//! Keeps history, subscriptions and read markers in memory. Behaviour knobs
//! (offline mode, scripted cached pages, fetch failures, server-side id
//! reassignment) make it usable as a deterministic backend for tests and
//! the CLI demo.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream, StreamExt};

use super::{
    ChatService, FetchDelivery, MessageChange, MessageChangeHandler, SubscriptionHandle,
    TypingIndicatorHandler,
};
use crate::error::ChatError;
use crate::models::{
    DeliveryState, Message, MessageId, Participant, TypingIndicator, TypingState,
};

type SharedChangeHandler = Arc<dyn Fn(MessageChange) + Send + Sync>;
type SharedTypingHandler = Arc<dyn Fn(TypingIndicator) + Send + Sync>;

/// A fetch as seen by the service, recorded for inspection.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    pub conversation_id: String,
    pub limit: usize,
    pub before: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct State {
    history: HashMap<String, Vec<Message>>,
    cached_pages: HashMap<String, VecDeque<Vec<Message>>>,
    unsent: HashMap<String, Vec<Message>>,
    participants: HashMap<String, Participant>,

    offline: bool,
    nil_send_results: bool,
    reassign_ids: bool,
    fetch_failures: VecDeque<ChatError>,
    dropped_authoritative: usize,
    participants_failure: Option<ChatError>,

    message_subs: HashMap<u64, (String, SharedChangeHandler)>,
    typing_subs: HashMap<u64, (String, SharedTypingHandler)>,

    typing_sent: Vec<(String, TypingState)>,
    read_ids: Vec<MessageId>,
    last_read: HashMap<String, MessageId>,
    fetch_requests: Vec<FetchRequest>,
    sent: Vec<(String, Message)>,
}

#[derive(Default)]
pub struct InMemoryChatService {
    state: Mutex<State>,
    next_id: AtomicU64,
}

impl InMemoryChatService {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    // -- Setup --

    /// Seed server-side history.
    pub fn add_history(&self, conversation_id: &str, messages: Vec<Message>) {
        self.state()
            .history
            .entry(conversation_id.to_string())
            .or_default()
            .extend(messages);
    }

    /// Queue a cached page delivered before the next fetch's authoritative one.
    pub fn push_cached_page(&self, conversation_id: &str, messages: Vec<Message>) {
        self.state()
            .cached_pages
            .entry(conversation_id.to_string())
            .or_default()
            .push_back(messages);
    }

    pub fn set_unsent(&self, conversation_id: &str, messages: Vec<Message>) {
        self.state()
            .unsent
            .insert(conversation_id.to_string(), messages);
    }

    pub fn add_participants(&self, participants: Vec<Participant>) {
        let mut state = self.state();
        for p in participants {
            state.participants.insert(p.id.clone(), p);
        }
    }

    /// Every send fails with a network error while offline.
    pub fn set_offline(&self, offline: bool) {
        self.state().offline = offline;
    }

    /// Sends succeed but return no message.
    pub fn set_nil_send_results(&self, enabled: bool) {
        self.state().nil_send_results = enabled;
    }

    /// Confirmed messages get a server-assigned id instead of keeping theirs.
    pub fn set_reassign_ids(&self, enabled: bool) {
        self.state().reassign_ids = enabled;
    }

    /// The next authoritative fetch delivery fails with `error`.
    pub fn fail_next_fetch(&self, error: ChatError) {
        self.state().fetch_failures.push_back(error);
    }

    /// The next fetch stream ends without its authoritative delivery.
    pub fn drop_next_authoritative(&self) {
        self.state().dropped_authoritative += 1;
    }

    pub fn fail_participants(&self, error: Option<ChatError>) {
        self.state().participants_failure = error;
    }

    // -- Live events --

    /// Deliver a change to every subscriber of the conversation.
    pub fn emit_message_change(&self, conversation_id: &str, change: MessageChange) {
        let handlers: Vec<SharedChangeHandler> = self
            .state()
            .message_subs
            .values()
            .filter(|(conv, _)| conv == conversation_id)
            .map(|(_, h)| Arc::clone(h))
            .collect();
        tracing::debug!(
            "Emitting {:?} for {} to {} subscriber(s)",
            change.kind,
            change.message.id,
            handlers.len()
        );
        for handler in handlers {
            handler(change.clone());
        }
    }

    pub fn emit_typing(&self, conversation_id: &str, indicator: TypingIndicator) {
        let handlers: Vec<SharedTypingHandler> = self
            .state()
            .typing_subs
            .values()
            .filter(|(conv, _)| conv == conversation_id)
            .map(|(_, h)| Arc::clone(h))
            .collect();
        for handler in handlers {
            handler(indicator.clone());
        }
    }

    // -- Inspection --

    pub fn typing_states_sent(&self, conversation_id: &str) -> Vec<TypingState> {
        self.state()
            .typing_sent
            .iter()
            .filter(|(conv, _)| conv == conversation_id)
            .map(|(_, s)| *s)
            .collect()
    }

    pub fn read_message_ids(&self) -> Vec<MessageId> {
        self.state().read_ids.clone()
    }

    pub fn last_read(&self, conversation_id: &str) -> Option<MessageId> {
        self.state().last_read.get(conversation_id).cloned()
    }

    pub fn fetch_requests(&self) -> Vec<FetchRequest> {
        self.state().fetch_requests.clone()
    }

    /// Messages the service accepted, as stored server-side.
    pub fn sent_messages(&self, conversation_id: &str) -> Vec<Message> {
        self.state()
            .sent
            .iter()
            .filter(|(conv, _)| conv == conversation_id)
            .map(|(_, m)| m.clone())
            .collect()
    }

    /// (message-change, typing) subscriber counts for a conversation.
    pub fn subscriber_counts(&self, conversation_id: &str) -> (usize, usize) {
        let state = self.state();
        let messages = state
            .message_subs
            .values()
            .filter(|(conv, _)| conv == conversation_id)
            .count();
        let typing = state
            .typing_subs
            .values()
            .filter(|(conv, _)| conv == conversation_id)
            .count();
        (messages, typing)
    }
}

#[async_trait]
impl ChatService for InMemoryChatService {
    async fn send_message(
        &self,
        message: Message,
        conversation_id: &str,
    ) -> Result<Option<Message>, ChatError> {
        let reassign = {
            let state = self.state();
            if state.offline {
                return Err(ChatError::Network(
                    "The Internet connection appears to be offline.".to_string(),
                ));
            }
            if state.nil_send_results {
                return Ok(None);
            }
            state.reassign_ids
        };

        let mut stored = message;
        if reassign {
            stored.id = MessageId(format!("srv-{}", self.next_id()));
        }
        stored.failed = false;
        stored.delivery_state = Some(DeliveryState::Delivered);

        let mut state = self.state();
        state
            .history
            .entry(conversation_id.to_string())
            .or_default()
            .push(stored.clone());
        state
            .sent
            .push((conversation_id.to_string(), stored.clone()));
        Ok(Some(stored))
    }

    fn fetch_messages(
        &self,
        conversation_id: &str,
        limit: usize,
        before: Option<DateTime<Utc>>,
    ) -> BoxStream<'static, FetchDelivery> {
        let mut state = self.state();
        state.fetch_requests.push(FetchRequest {
            conversation_id: conversation_id.to_string(),
            limit,
            before,
        });

        let mut deliveries = Vec::with_capacity(2);
        if let Some(page) = state
            .cached_pages
            .get_mut(conversation_id)
            .and_then(VecDeque::pop_front)
        {
            deliveries.push(FetchDelivery::cached(page));
        }

        if state.dropped_authoritative > 0 {
            state.dropped_authoritative -= 1;
            return stream::iter(deliveries).boxed();
        }

        let result = match state.fetch_failures.pop_front() {
            Some(err) => Err(err),
            None => {
                let mut page: Vec<Message> = state
                    .history
                    .get(conversation_id)
                    .map(|msgs| {
                        msgs.iter()
                            .filter(|m| before.map_or(true, |b| m.created_at < b))
                            .cloned()
                            .collect()
                    })
                    .unwrap_or_default();
                // Newest first, like a real history endpoint.
                page.sort_by(|a, b| b.created_at.cmp(&a.created_at));
                page.truncate(limit);
                Ok(page)
            }
        };
        deliveries.push(FetchDelivery::authoritative(result));

        stream::iter(deliveries).boxed()
    }

    async fn fetch_unsent_messages(&self, conversation_id: &str) -> Vec<Message> {
        self.state()
            .unsent
            .get(conversation_id)
            .cloned()
            .unwrap_or_default()
    }

    fn mark_read(&self, messages: &[Message]) {
        self.state()
            .read_ids
            .extend(messages.iter().map(|m| m.id.clone()));
    }

    fn mark_last_read(&self, message: &Message, conversation_id: &str) {
        self.state()
            .last_read
            .insert(conversation_id.to_string(), message.id.clone());
    }

    fn subscribe_message_changes(
        &self,
        conversation_id: &str,
        handler: MessageChangeHandler,
    ) -> SubscriptionHandle {
        let id = self.next_id();
        self.state()
            .message_subs
            .insert(id, (conversation_id.to_string(), Arc::from(handler)));
        SubscriptionHandle(id)
    }

    fn unsubscribe_message_changes(&self, handle: SubscriptionHandle) {
        self.state().message_subs.remove(&handle.0);
    }

    fn subscribe_typing_indicator(
        &self,
        conversation_id: &str,
        handler: TypingIndicatorHandler,
    ) -> SubscriptionHandle {
        let id = self.next_id();
        self.state()
            .typing_subs
            .insert(id, (conversation_id.to_string(), Arc::from(handler)));
        SubscriptionHandle(id)
    }

    fn unsubscribe_typing_indicator(&self, handle: SubscriptionHandle) {
        self.state().typing_subs.remove(&handle.0);
    }

    fn send_typing_indicator(&self, state: TypingState, conversation_id: &str) {
        self.state()
            .typing_sent
            .push((conversation_id.to_string(), state));
    }

    async fn fetch_participants(&self, ids: &[String]) -> Result<Vec<Participant>, ChatError> {
        let state = self.state();
        if let Some(err) = &state.participants_failure {
            return Err(err.clone());
        }
        Ok(ids
            .iter()
            .filter_map(|id| state.participants.get(id).cloned())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn msg(id: &str, secs: i64) -> Message {
        Message {
            id: id.into(),
            author_id: "bob".to_string(),
            created_at: Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap(),
            body: Some(id.to_string()),
            attachment: None,
            delivery_state: None,
            failed: false,
        }
    }

    #[tokio::test]
    async fn test_fetch_pages_newest_first_before_cursor() {
        let service = InMemoryChatService::new();
        service.add_history("c1", (0..10).map(|i| msg(&format!("m{}", i), i)).collect());

        let cursor = Utc.timestamp_opt(1_700_000_000, 0).unwrap() + Duration::seconds(6);
        let deliveries: Vec<FetchDelivery> =
            service.fetch_messages("c1", 3, Some(cursor)).collect().await;

        assert_eq!(deliveries.len(), 1);
        assert!(!deliveries[0].is_cached);
        let ids: Vec<String> = deliveries[0]
            .result
            .as_ref()
            .unwrap()
            .iter()
            .map(|m| m.id.to_string())
            .collect();
        assert_eq!(ids, vec!["m5", "m4", "m3"]);
    }

    #[tokio::test]
    async fn test_cached_page_comes_first() {
        let service = InMemoryChatService::new();
        service.add_history("c1", vec![msg("a", 1)]);
        service.push_cached_page("c1", vec![msg("stale", 0)]);

        let deliveries: Vec<FetchDelivery> = service.fetch_messages("c1", 10, None).collect().await;
        assert_eq!(deliveries.len(), 2);
        assert!(deliveries[0].is_cached);
        assert!(!deliveries[1].is_cached);

        // The cached page is consumed by one request.
        let again: Vec<FetchDelivery> = service.fetch_messages("c1", 10, None).collect().await;
        assert_eq!(again.len(), 1);
    }

    #[tokio::test]
    async fn test_dropped_authoritative_leaves_only_cached() {
        let service = InMemoryChatService::new();
        service.add_history("c1", vec![msg("a", 1)]);
        service.push_cached_page("c1", vec![msg("a", 1)]);
        service.drop_next_authoritative();

        let deliveries: Vec<FetchDelivery> = service.fetch_messages("c1", 10, None).collect().await;
        assert_eq!(deliveries.len(), 1);
        assert!(deliveries[0].is_cached);

        let again: Vec<FetchDelivery> = service.fetch_messages("c1", 10, None).collect().await;
        assert_eq!(again.len(), 1);
        assert!(!again[0].is_cached);
    }

    #[tokio::test]
    async fn test_offline_send_fails() {
        let service = InMemoryChatService::new();
        service.set_offline(true);
        let err = service.send_message(msg("x", 0), "c1").await.unwrap_err();
        assert!(matches!(err, ChatError::Network(_)));
        assert!(service.sent_messages("c1").is_empty());
    }

    #[tokio::test]
    async fn test_send_reassigns_ids_when_enabled() {
        let service = InMemoryChatService::new();
        service.set_reassign_ids(true);
        let sent = service.send_message(msg("tmp", 0), "c1").await.unwrap().unwrap();
        assert!(sent.id.as_str().starts_with("srv-"));
        assert_eq!(sent.delivery_state, Some(DeliveryState::Delivered));
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let service = InMemoryChatService::new();
        let hits = Arc::new(AtomicU64::new(0));
        let h = hits.clone();
        let handle = service.subscribe_typing_indicator(
            "c1",
            Box::new(move |_| {
                h.fetch_add(1, Ordering::SeqCst);
            }),
        );

        service.emit_typing("c1", TypingIndicator::new(["bob"]));
        service.emit_typing("other", TypingIndicator::new(["bob"]));
        service.unsubscribe_typing_indicator(handle);
        service.emit_typing("c1", TypingIndicator::new(["bob"]));

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(service.subscriber_counts("c1"), (0, 0));
    }
}
