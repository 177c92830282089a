//! Chat service capability consumed by the timeline engine
//!
//! The engine never speaks a wire protocol itself. Everything it needs from
//! the backend goes through [`ChatService`].

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;

use crate::error::ChatError;
use crate::models::{Message, Participant, TypingIndicator, TypingState};

/// One delivery of a history fetch.
///
/// A request yields at most two: an optional cached delivery followed by
/// the authoritative one. Never authoritative-then-cached.
#[derive(Debug, Clone)]
pub struct FetchDelivery {
    pub result: Result<Vec<Message>, ChatError>,
    pub is_cached: bool,
}

impl FetchDelivery {
    pub fn cached(messages: Vec<Message>) -> Self {
        Self {
            result: Ok(messages),
            is_cached: true,
        }
    }

    pub fn authoritative(result: Result<Vec<Message>, ChatError>) -> Self {
        Self {
            result,
            is_cached: false,
        }
    }
}

/// Kind of a live message change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Create,
    Update,
    Delete,
}

/// Live message change pushed by the service.
#[derive(Debug, Clone)]
pub struct MessageChange {
    pub kind: ChangeKind,
    pub message: Message,
}

/// Opaque subscription handle returned by the subscribe calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(pub u64);

pub type MessageChangeHandler = Box<dyn Fn(MessageChange) + Send + Sync>;
pub type TypingIndicatorHandler = Box<dyn Fn(TypingIndicator) + Send + Sync>;

#[async_trait]
pub trait ChatService: Send + Sync {
    /// Submit a message. `Ok(None)` means the service answered without a
    /// message, which the caller treats as a bad response.
    async fn send_message(
        &self,
        message: Message,
        conversation_id: &str,
    ) -> Result<Option<Message>, ChatError>;

    /// Page of history strictly before `before` (newest page when `None`).
    fn fetch_messages(
        &self,
        conversation_id: &str,
        limit: usize,
        before: Option<DateTime<Utc>>,
    ) -> BoxStream<'static, FetchDelivery>;

    /// Locally queued messages that never reached the server.
    async fn fetch_unsent_messages(&self, conversation_id: &str) -> Vec<Message>;

    fn mark_read(&self, messages: &[Message]);

    fn mark_last_read(&self, message: &Message, conversation_id: &str);

    fn subscribe_message_changes(
        &self,
        conversation_id: &str,
        handler: MessageChangeHandler,
    ) -> SubscriptionHandle;

    fn unsubscribe_message_changes(&self, handle: SubscriptionHandle);

    fn subscribe_typing_indicator(
        &self,
        conversation_id: &str,
        handler: TypingIndicatorHandler,
    ) -> SubscriptionHandle;

    fn unsubscribe_typing_indicator(&self, handle: SubscriptionHandle);

    fn send_typing_indicator(&self, state: TypingState, conversation_id: &str);

    async fn fetch_participants(&self, ids: &[String]) -> Result<Vec<Participant>, ChatError>;
}
