//! Recording doubles and fixtures shared by the session tests.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, TimeZone, Utc};

use super::{
    ComposeAffordance, ConversationObserver, ConversationSession, ConversationView, ScrollMetrics,
};
use crate::config::SessionConfig;
use crate::error::ChatError;
use crate::models::{Conversation, Message, MessageId, Participant};
use crate::service::memory::InMemoryChatService;

pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000, 0).unwrap() + Duration::seconds(secs)
}

pub fn msg(id: &str, author: &str, secs: i64) -> Message {
    Message {
        id: id.into(),
        author_id: author.to_string(),
        created_at: at(secs),
        body: Some(format!("text {}", id)),
        attachment: None,
        delivery_state: None,
        failed: false,
    }
}

pub fn ids(session: &ConversationSession) -> Vec<String> {
    session.store().iter().map(|m| m.id.to_string()).collect()
}

#[derive(Debug, Clone, PartialEq)]
pub enum Observed {
    ReadyToSend(MessageId),
    FinishedSending(MessageId),
    FailedToSend { text: String, error: ChatError },
    FetchedParticipants(usize),
    FailedParticipants(ChatError),
    StartedFetching,
    FetchedMessages { count: usize, cached: bool },
    FailedFetching(ChatError),
}

#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<Observed>>,
    fetch_limit: Mutex<Option<usize>>,
}

impl RecordingObserver {
    pub fn events(&self) -> Vec<Observed> {
        self.events.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }

    pub fn set_fetch_limit(&self, limit: Option<usize>) {
        *self.fetch_limit.lock().unwrap() = limit;
    }

    fn push(&self, event: Observed) {
        self.events.lock().unwrap().push(event);
    }
}

impl ConversationObserver for RecordingObserver {
    fn messages_fetch_limit(&self) -> Option<usize> {
        *self.fetch_limit.lock().unwrap()
    }

    fn ready_to_send(&self, message: &Message) {
        self.push(Observed::ReadyToSend(message.id.clone()));
    }

    fn finished_sending(&self, message: &Message) {
        self.push(Observed::FinishedSending(message.id.clone()));
    }

    fn failed_to_send(&self, text: &str, _date: DateTime<Utc>, error: &ChatError) {
        self.push(Observed::FailedToSend {
            text: text.to_string(),
            error: error.clone(),
        });
    }

    fn fetched_participants(&self, participants: &[Participant]) {
        self.push(Observed::FetchedParticipants(participants.len()));
    }

    fn failed_fetching_participants(&self, error: &ChatError) {
        self.push(Observed::FailedParticipants(error.clone()));
    }

    fn started_fetching_messages(&self) {
        self.push(Observed::StartedFetching);
    }

    fn fetched_messages(&self, messages: &[Message], is_cached: bool) {
        self.push(Observed::FetchedMessages {
            count: messages.len(),
            cached: is_cached,
        });
    }

    fn failed_fetching_messages(&self, error: &ChatError) {
        self.push(Observed::FailedFetching(error.clone()));
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ViewCall {
    Reload,
    FinishReceiving,
    ScrollToBottom,
    SendEnabled(bool),
    Affordance(ComposeAffordance),
    StartActivity,
    StopActivity,
    ShowTyping,
    HideTyping,
    Title(Option<String>),
    ScrollOffset(f64),
}

/// View double. Optionally simulates layout: each `finish_receiving` grows
/// the content by `growth_per_receive`.
#[derive(Default)]
pub struct RecordingView {
    calls: Mutex<Vec<ViewCall>>,
    metrics: Mutex<Option<ScrollMetrics>>,
    growth_per_receive: Mutex<f64>,
}

impl RecordingView {
    pub fn calls(&self) -> Vec<ViewCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, call: &ViewCall) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| *c == call).count()
    }

    pub fn set_metrics(&self, metrics: ScrollMetrics) {
        *self.metrics.lock().unwrap() = Some(metrics);
    }

    pub fn set_growth_per_receive(&self, growth: f64) {
        *self.growth_per_receive.lock().unwrap() = growth;
    }

    fn push(&self, call: ViewCall) {
        self.calls.lock().unwrap().push(call);
    }
}

impl ConversationView for RecordingView {
    fn reload(&self) {
        self.push(ViewCall::Reload);
    }

    fn finish_receiving(&self) {
        let growth = *self.growth_per_receive.lock().unwrap();
        if let Some(m) = self.metrics.lock().unwrap().as_mut() {
            m.content_height += growth;
        }
        self.push(ViewCall::FinishReceiving);
    }

    fn scroll_to_bottom(&self) {
        self.push(ViewCall::ScrollToBottom);
    }

    fn set_send_enabled(&self, enabled: bool) {
        self.push(ViewCall::SendEnabled(enabled));
    }

    fn set_compose_affordance(&self, affordance: ComposeAffordance) {
        self.push(ViewCall::Affordance(affordance));
    }

    fn start_activity_indicator(&self) {
        self.push(ViewCall::StartActivity);
    }

    fn stop_activity_indicator(&self) {
        self.push(ViewCall::StopActivity);
    }

    fn show_typing_indicator(&self) {
        self.push(ViewCall::ShowTyping);
    }

    fn hide_typing_indicator(&self) {
        self.push(ViewCall::HideTyping);
    }

    fn set_title(&self, title: Option<&str>) {
        self.push(ViewCall::Title(title.map(String::from)));
    }

    fn scroll_metrics(&self) -> Option<ScrollMetrics> {
        *self.metrics.lock().unwrap()
    }

    fn set_scroll_offset(&self, offset_y: f64) {
        if let Some(m) = self.metrics.lock().unwrap().as_mut() {
            m.offset_y = offset_y;
        }
        self.push(ViewCall::ScrollOffset(offset_y));
    }
}

/// In-memory service with three participants (me, bob, carol) in `c1`.
pub struct Fixture {
    pub service: Arc<InMemoryChatService>,
    pub observer: Arc<RecordingObserver>,
    pub view: Arc<RecordingView>,
    pub config: SessionConfig,
}

impl Fixture {
    pub fn new() -> Self {
        let service = Arc::new(InMemoryChatService::new());
        service.add_participants(vec![
            Participant::new("me", Some("Me")),
            Participant::new("bob", Some("Bob")),
            Participant::new("carol", Some("Carol")),
        ]);
        Self {
            service,
            observer: Arc::new(RecordingObserver::default()),
            view: Arc::new(RecordingView::default()),
            config: SessionConfig::default(),
        }
    }

    pub fn conversation() -> Conversation {
        Conversation::new(
            "c1",
            vec!["me".to_string(), "bob".to_string(), "carol".to_string()],
        )
    }

    pub fn session(&self) -> ConversationSession {
        ConversationSession::new(self.service.clone(), "me", self.config.clone())
            .with_conversation(Self::conversation())
            .with_observer(self.observer.clone())
            .with_view(self.view.clone())
    }

    /// Session with no conversation attached.
    pub fn detached_session(&self) -> ConversationSession {
        ConversationSession::new(self.service.clone(), "me", self.config.clone())
            .with_observer(self.observer.clone())
            .with_view(self.view.clone())
    }
}
