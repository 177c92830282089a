//! Observer hooks fired by a conversation session.
//!
//! Every method has a no-op default, so hosts implement only what they care
//! about. A session without an observer uses [`NoopObserver`].

use chrono::{DateTime, Utc};

use crate::error::ChatError;
use crate::models::{Message, Participant};

pub trait ConversationObserver: Send + Sync {
    /// Page size override for history fetches. `None` uses the configured
    /// default.
    fn messages_fetch_limit(&self) -> Option<usize> {
        None
    }

    /// An optimistic message was appended and is about to be submitted.
    fn ready_to_send(&self, _message: &Message) {}

    /// The service confirmed a send. `message` is the server copy.
    fn finished_sending(&self, _message: &Message) {}

    fn failed_to_send(&self, _text: &str, _date: DateTime<Utc>, _error: &ChatError) {}

    fn fetched_participants(&self, _participants: &[Participant]) {}

    fn failed_fetching_participants(&self, _error: &ChatError) {}

    fn started_fetching_messages(&self) {}

    /// Messages reached the timeline, from history (cached or not) or a live
    /// create event.
    fn fetched_messages(&self, _messages: &[Message], _is_cached: bool) {}

    fn failed_fetching_messages(&self, _error: &ChatError) {}
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl ConversationObserver for NoopObserver {}
